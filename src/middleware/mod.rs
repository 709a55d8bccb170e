//! Handler and middleware types, plus the built-in [`Logger`] and [`Recovery`].
//!
//! Route handlers and middleware share one shape: a function of
//! `&mut Context`. What makes something middleware is only where it is
//! registered (on a path prefix) and whether it calls [`Context::next`] to run
//! the downstream chain inside its own body.
//!
//! ## Core types
//!
//! - [`HandlerFunc`]: type-erased, cheaply-cloneable handler.
//! - [`Middleware`]: trait for stateful middleware structs.
//! - [`from_middleware`]: converts a [`Middleware`] into a [`HandlerFunc`].

use std::any::Any;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use crate::StatusCode;
use crate::context::Context;

/// A type-erased, reference-counted handler.
///
/// Every entry of a handler chain, middleware and terminal handler alike,
/// is stored as a `HandlerFunc`. The [`Arc`] makes clones cheap, which the
/// routing tree relies on when it assembles a chain per request.
///
/// ```rust
/// use std::sync::Arc;
/// use ruta::{Context, StatusCode, middleware::HandlerFunc};
///
/// let hello: HandlerFunc = Arc::new(|ctx: &mut Context| {
///     ctx.string(StatusCode::OK, "hello");
/// });
/// ```
pub type HandlerFunc = Arc<dyn Fn(&mut Context) + Send + Sync + 'static>;

/// Stateful middleware.
///
/// Implementors may:
///
/// - **Wrap**: run code before and after `ctx.next()`.
/// - **Short-circuit**: write a response and call `ctx.abort()`.
/// - **Observe**: do their work and return; the chain then continues with the
///   next handler.
///
/// Middleware is shared by every in-flight request, so implementations must be
/// `Send + Sync` and keep per-request state in the [`Context`].
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: &mut Context);
}

/// Converts a [`Middleware`] implementation into a [`HandlerFunc`].
///
/// ```rust
/// use std::sync::Arc;
/// use ruta::middleware::{Logger, from_middleware};
///
/// let handler = from_middleware(Arc::new(Logger));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> HandlerFunc
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: &mut Context| middleware.handle(ctx))
}

/// Access log middleware.
///
/// Runs the rest of the chain, then emits one `tracing::info!` line:
///
/// ```text
/// CLIENT METHOD TARGET STATUS DURATIONms
/// ```
///
/// The status is whatever the response writer captured, so it reflects
/// responses written by any downstream handler, including [`Recovery`].
pub struct Logger;

impl Middleware for Logger {
    fn handle(&self, ctx: &mut Context) {
        let start = Instant::now();
        ctx.next();
        let elapsed = start.elapsed();

        let request = ctx.request();
        let client = request
            .remote_addr()
            .map(client_ip)
            .unwrap_or_else(|| "-".to_owned());
        let target = match request.query_string() {
            Some(query) => format!("{}?{}", request.path(), query),
            None => request.path().to_owned(),
        };
        let status = ctx.writer().status().as_u16();

        info!(
            "{} {} {} {} {}ms",
            client,
            request.method(),
            target,
            status,
            elapsed.as_millis()
        );
    }
}

fn client_ip(addr: SocketAddr) -> String {
    let ip = addr.ip();
    if ip.is_loopback() && ip.is_ipv6() {
        "localhost".to_owned()
    } else {
        ip.to_string()
    }
}

/// Panic containment middleware.
///
/// Runs the rest of the chain under [`std::panic::catch_unwind`]. A panic
/// discards whatever the handlers had written, produces a `500` whose body is
/// the panic message, and aborts the chain.
///
/// Register it early (globally) so it wraps everything that may panic.
pub struct Recovery;

impl Middleware for Recovery {
    fn handle(&self, ctx: &mut Context) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| ctx.next()));
        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            error!(
                method = %ctx.request().method(),
                path = %ctx.request().path(),
                panic = %message,
                "handler panicked"
            );
            ctx.writer_mut().clear();
            ctx.string(StatusCode::INTERNAL_SERVER_ERROR, message);
            ctx.abort();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
