//! # ruta
//!
//! A segment-trie HTTP router with prefix-scoped middleware and an
//! interruptible handler pipeline, served over a small async HTTP/1.1 server.
//!
//! Routes are registered with a method and a pattern made of literal,
//! `:named` and `*wildcard` segments. Middleware attached to a prefix applies
//! to every route under it; a request runs the middleware of every prefix on
//! its matched path, outermost first, followed by the route handler.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ruta::{Context, Router, Routes, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::with_defaults();
//!     router.get("/hello/:name", |ctx: &mut Context| {
//!         let name = ctx.param("name").unwrap_or("world").to_owned();
//!         ctx.string(StatusCode::OK, format!("Hello, {name}!"));
//!     })?;
//!
//!     router.run("127.0.0.1:8080").await?;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

pub use context::{Body, Context, Extensions, Parameters, ResponseWriter};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::{HandlerFunc, Logger, Middleware, Recovery};
pub use router::{Group, RouteError, Router, Routes};
pub use server::{Server, ServerError};
