//! Per-request context: the execution pipeline handed to every handler.
//!
//! A [`Context`] carries the ordered handler list built from the routing
//! tree's output together with a cursor and an abort latch. The router calls
//! [`Context::next`] once; from there each handler decides whether to run the
//! rest of the chain *inside* its own body (by calling `next` itself) or to
//! stop it (by calling [`Context::abort`]).
//!
//! ```text
//! next()                      cursor  handlers
//! ├─ logger (pre)               0     [logger, auth, handler]
//! │  └─ next()
//! │     ├─ auth                 1
//! │     └─ handler              2
//! └─ logger (post)
//! ```
//!
//! Contexts are pooled by the router. Everything request-specific is cleared
//! by [`Context::reset`] before a context is reused.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use serde::Serialize;
use tracing::error;

use crate::http::{Request, Response, StatusCode};
use crate::middleware::HandlerFunc;

mod pool;
mod writer;

pub(crate) use pool::ContextPool;
pub use writer::ResponseWriter;

/// Convenience alias for ad-hoc JSON objects passed to [`Context::json`].
pub type Body = serde_json::Map<String, serde_json::Value>;

/// Type-erased request extensions map, used to pass per-request state from
/// middleware to downstream handlers without either knowing the other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create a new empty extensions map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value of the same type
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Path parameters bound by the matched route.
///
/// # Examples
///
/// ```
/// use ruta::context::Parameters;
///
/// let mut params = Parameters::new();
/// params.insert("id", "42");
/// assert_eq!(params.get("id"), Some("42"));
/// assert_eq!(params.get("missing"), None);
/// ```
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    map: HashMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `value`, replacing a previous binding
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over `(name, value)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Per-request execution state: request, path parameters, response writer,
/// extensions, and the handler chain with its cursor and abort latch.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ruta::{Context, Request, StatusCode};
/// use ruta::context::Parameters;
/// use ruta::middleware::HandlerFunc;
///
/// let auth: HandlerFunc = Arc::new(|ctx: &mut Context| {
///     ctx.string(StatusCode::UNAUTHORIZED, "no token");
///     ctx.abort();
/// });
/// let handler: HandlerFunc = Arc::new(|ctx: &mut Context| {
///     ctx.string(StatusCode::OK, "secret");
/// });
///
/// let mut ctx = Context::default();
/// ctx.reset(Request::default(), vec![auth, handler], Parameters::new());
/// ctx.next();
///
/// assert!(ctx.is_aborted());
/// assert_eq!(ctx.writer().status(), StatusCode::UNAUTHORIZED);
/// ```
#[derive(Default)]
pub struct Context {
    request: Request,
    params: Parameters,
    writer: ResponseWriter,
    extensions: Extensions,
    handlers: Vec<HandlerFunc>,
    // Position of the next handler to invoke.
    cursor: usize,
    aborted: bool,
}

impl Context {
    /// Create a context for `request` with an empty handler chain.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    /// Reinitialise every field for a new request.
    ///
    /// The cursor returns to the start of `handlers`, the abort latch is
    /// released, and the writer and extensions are emptied.
    pub fn reset(&mut self, request: Request, handlers: Vec<HandlerFunc>, params: Parameters) {
        self.request = request;
        self.params = params;
        self.handlers = handlers;
        self.cursor = 0;
        self.aborted = false;
        self.writer.clear();
        self.extensions.clear();
    }

    // Drop request-specific data while keeping allocations for reuse.
    pub(crate) fn recycle(&mut self) {
        self.request = Request::default();
        self.params.clear();
        self.handlers.clear();
        self.cursor = 0;
        self.aborted = false;
        self.writer.clear();
        self.extensions.clear();
    }

    /// Run the remaining handlers in order until the chain is exhausted or
    /// [`abort`](Self::abort) is called.
    ///
    /// Calling `next` from inside a handler runs everything downstream before
    /// returning, which is how middleware wraps later stages. Once a nested
    /// call returns, the enclosing loops find the cursor already past the end
    /// and do nothing more.
    pub fn next(&mut self) {
        while !self.aborted {
            let Some(handler) = self.handlers.get(self.cursor).cloned() else {
                break;
            };
            self.cursor += 1;
            handler(self);
        }
    }

    /// Stop the chain: no further handler is invoked by any pending
    /// [`next`](Self::next) call. Code after `next()` in handlers already on
    /// the stack still runs.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// `true` once every handler in the chain has been entered.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.handlers.len()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Shorthand for `self.params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn writer(&self) -> &ResponseWriter {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut ResponseWriter {
        &mut self.writer
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Deserialize the request body as JSON.
    pub fn body_json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }

    /// Write `body` serialized as JSON with the given status.
    ///
    /// A value that fails to serialize produces a `500` instead.
    pub fn json<T>(&mut self, status: StatusCode, body: &T)
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_vec(body) {
            Ok(data) => {
                self.writer
                    .set_header("Content-Type", "application/json; charset=utf-8");
                self.writer.write_header(status);
                self.writer.write(&data);
            }
            Err(e) => {
                error!(error = %e, path = %self.request.path(), "failed to serialize JSON body");
                self.string(StatusCode::INTERNAL_SERVER_ERROR, "failed to serialize response");
            }
        }
    }

    /// Write `text` as a plain-text body with the given status.
    pub fn string(&mut self, status: StatusCode, text: impl AsRef<str>) {
        self.writer
            .set_header("Content-Type", "text/plain; charset=utf-8");
        self.writer.write_header(status);
        self.writer.write_str(text.as_ref());
    }

    /// Turn the buffered writer into the transport response.
    pub(crate) fn take_response(&mut self, keep_alive: bool) -> Response {
        self.writer.take_response(keep_alive)
    }
}
