//! HTTP/1.1 primitives used by the router and its transport adapter.
//!
//! [`Method`] keys the per-node handler tables of the routing tree,
//! [`StatusCode`] is what the response writer captures, and [`Request`] /
//! [`Response`] are the transport-facing values exchanged with
//! [`crate::server::Server`].

pub mod headers;
pub mod method;
pub mod request;
pub mod response;
pub mod status;

pub use headers::Headers;
pub use method::Method;
pub use request::Request;
pub use response::Response;
pub use status::StatusCode;
