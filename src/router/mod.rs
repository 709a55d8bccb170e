//! Request routing: map methods and path patterns to handler chains.
//!
//! Routes live in a segment [`Tree`]. Three segment kinds are supported:
//!
//! | Segment     | Example pattern        | Example match           | Captured params        |
//! |-------------|------------------------|-------------------------|------------------------|
//! | literal     | `/users/me`            | `/users/me`             | *(none)*               |
//! | named       | `/users/:id`           | `/users/42`             | `id → "42"`            |
//! | wildcard    | `/files/*path`         | `/files/a/b.txt`        | `path → "a/b.txt"`     |
//!
//! A bare `*` binds under the key `"path"`. Literal children win over named
//! and wildcard children at the same depth, and the search backtracks when a
//! preferred branch dead-ends.
//!
//! Middleware is registered on path prefixes and applies to every request
//! whose match passes through that prefix, outer prefixes first.
//!
//! Registration errors ([`RouteError`]) are returned to the caller; a routing
//! table that fails to build should stop the application from starting.

use std::sync::Arc;

use tracing::debug;

use crate::context::{Context, ContextPool};
use crate::http::{Method, Request, Response, StatusCode};
use crate::middleware::{HandlerFunc, Logger, Recovery, from_middleware};

mod group;
mod path;
mod tree;

pub use group::Group;
pub use path::{DEFAULT_WILDCARD_KEY, clean_path, split_segments};
pub use tree::{Resolved, RouteError, Tree};

/// Body of the built-in not-found response.
pub const NOT_FOUND_BODY: &str = "404 page not found";

/// Registration surface shared by [`Router`] and [`Group`].
///
/// Implementors provide [`route`](Self::route) and
/// [`use_middleware`](Self::use_middleware); the per-method helpers are built
/// on top of them.
pub trait Routes {
    /// Bind `handler` to `method` at `path`.
    ///
    /// # Errors
    ///
    /// See [`RouteError`].
    fn route(&mut self, method: Method, path: &str, handler: HandlerFunc) -> Result<(), RouteError>;

    /// Attach `middlewares`, in order, to this registration scope's prefix.
    fn use_middleware(&mut self, middlewares: Vec<HandlerFunc>) -> Result<(), RouteError>;

    fn get<H>(&mut self, path: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
        Self: Sized,
    {
        self.route(Method::Get, path, Arc::new(handler))
    }

    fn head<H>(&mut self, path: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
        Self: Sized,
    {
        self.route(Method::Head, path, Arc::new(handler))
    }

    fn post<H>(&mut self, path: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
        Self: Sized,
    {
        self.route(Method::Post, path, Arc::new(handler))
    }

    fn put<H>(&mut self, path: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
        Self: Sized,
    {
        self.route(Method::Put, path, Arc::new(handler))
    }

    fn patch<H>(&mut self, path: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
        Self: Sized,
    {
        self.route(Method::Patch, path, Arc::new(handler))
    }

    fn delete<H>(&mut self, path: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
        Self: Sized,
    {
        self.route(Method::Delete, path, Arc::new(handler))
    }

    fn connect<H>(&mut self, path: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
        Self: Sized,
    {
        self.route(Method::Connect, path, Arc::new(handler))
    }

    fn options<H>(&mut self, path: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
        Self: Sized,
    {
        self.route(Method::Options, path, Arc::new(handler))
    }

    fn trace<H>(&mut self, path: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
        Self: Sized,
    {
        self.route(Method::Trace, path, Arc::new(handler))
    }

    /// Bind one handler to every standard method at `path`.
    ///
    /// Stops at the first method that fails to register.
    fn any<H>(&mut self, path: &str, handler: H) -> Result<(), RouteError>
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
        Self: Sized,
    {
        let handler: HandlerFunc = Arc::new(handler);
        for method in Method::STANDARD {
            self.route(method, path, Arc::clone(&handler))?;
        }
        Ok(())
    }
}

/// The routing engine: a route tree, a not-found handler and a pool of
/// request contexts.
///
/// Build it with `&mut` access during startup, then share it (typically as
/// `Arc<Router>`) with the transport; [`handle`](Self::handle) only needs `&self`.
///
/// # Examples
///
/// ```rust
/// use ruta::{Context, Method, Request, Router, Routes, StatusCode};
///
/// let mut router = Router::new();
/// router
///     .get("/users/:id", |ctx: &mut Context| {
///         let id = ctx.param("id").unwrap_or_default().to_owned();
///         ctx.string(StatusCode::OK, id);
///     })
///     .unwrap();
///
/// let response = router.handle(Request::new(Method::Get, "/users/42"));
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.body(), b"42");
///
/// let missing = router.handle(Request::new(Method::Get, "/nope"));
/// assert_eq!(missing.status(), StatusCode::NOT_FOUND);
/// ```
pub struct Router {
    tree: Tree,
    not_found: HandlerFunc,
    pool: ContextPool,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// An empty router with the built-in not-found handler and pooling on.
    pub fn new() -> Self {
        Self {
            tree: Tree::new(),
            not_found: Arc::new(default_not_found),
            pool: ContextPool::new(true),
        }
    }

    /// A router with [`Logger`] and [`Recovery`] installed globally.
    pub fn with_defaults() -> Self {
        let mut router = Self::new();
        router.tree.use_global(vec![
            from_middleware(Arc::new(Logger)),
            from_middleware(Arc::new(Recovery)),
        ]);
        router
    }

    /// Enable or disable context reuse between requests.
    #[must_use]
    pub fn pooling(mut self, enabled: bool) -> Self {
        self.pool.set_enabled(enabled);
        self
    }

    /// Replace the handler used when no route matches.
    pub fn not_found<H>(&mut self, handler: H)
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.not_found = Arc::new(handler);
    }

    /// A registration view whose patterns are prefixed with `prefix`.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] when `prefix` does not start with `/`.
    pub fn group(&mut self, prefix: &str) -> Result<Group<'_>, RouteError> {
        Group::new(self, "/", prefix)
    }

    /// Look up `path` for `method` without running anything.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolved {
        self.tree.resolve(method, &clean_path(path))
    }

    /// Every registered pattern, including middleware-only prefixes.
    pub fn patterns(&self) -> Vec<String> {
        self.tree.patterns()
    }

    /// Route `request` through its handler chain and return the response.
    ///
    /// The path is cleaned before lookup. When nothing matches, the
    /// not-found handler takes the place of the route handler at the end of
    /// the chain. A panic escaping the chain propagates to the caller unless
    /// [`Recovery`] is installed.
    pub fn handle(&self, request: Request) -> Response {
        let path = clean_path(request.path());
        let Resolved {
            middlewares: mut handlers,
            handler,
            params,
        } = self.tree.resolve(request.method(), &path);
        handlers.push(handler.unwrap_or_else(|| Arc::clone(&self.not_found)));

        let keep_alive = request.is_keep_alive();
        let mut ctx = self.pool.acquire();
        ctx.reset(request, handlers, params);
        ctx.next();

        let response = ctx.take_response(keep_alive);
        self.pool.release(ctx);
        response
    }

    pub(crate) fn register_route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: HandlerFunc,
    ) -> Result<(), RouteError> {
        self.tree.register(method.clone(), pattern, handler)?;
        debug!(%method, pattern, "route registered");
        Ok(())
    }

    pub(crate) fn register_middleware(
        &mut self,
        prefix: &str,
        middlewares: Vec<HandlerFunc>,
    ) -> Result<(), RouteError> {
        let count = middlewares.len();
        self.tree.register_middleware(prefix, middlewares)?;
        debug!(prefix, count, "middleware registered");
        Ok(())
    }
}

impl Routes for Router {
    fn route(&mut self, method: Method, path: &str, handler: HandlerFunc) -> Result<(), RouteError> {
        Group::new(self, "/", "/")?.route(method, path, handler)
    }

    fn use_middleware(&mut self, middlewares: Vec<HandlerFunc>) -> Result<(), RouteError> {
        debug!(count = middlewares.len(), "global middleware registered");
        self.tree.use_global(middlewares);
        Ok(())
    }
}

fn default_not_found(ctx: &mut Context) {
    ctx.string(StatusCode::NOT_FOUND, NOT_FOUND_BODY);
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn tag(log: &Log, name: &'static str) -> HandlerFunc {
        let log = Arc::clone(log);
        Arc::new(move |_ctx: &mut Context| log.lock().unwrap().push(name))
    }

    fn text(body: &'static str) -> impl Fn(&mut Context) + Send + Sync + 'static {
        move |ctx: &mut Context| ctx.string(StatusCode::OK, body)
    }

    fn get(router: &Router, target: &str) -> Response {
        router.handle(Request::new(Method::Get, target))
    }

    #[test]
    fn routes_by_method_and_path() {
        let mut router = Router::new();
        router.get("/ping", text("pong")).unwrap();
        router.post("/ping", text("posted")).unwrap();

        assert_eq!(get(&router, "/ping").body(), b"pong");
        let posted = router.handle(Request::new(Method::Post, "/ping"));
        assert_eq!(posted.body(), b"posted");
    }

    #[test]
    fn unknown_path_uses_not_found_handler() {
        let router = Router::new();
        let response = get(&router, "/missing");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body(), NOT_FOUND_BODY.as_bytes());
    }

    #[test]
    fn method_mismatch_uses_not_found_handler() {
        let mut router = Router::new();
        router.get("/only-get", text("ok")).unwrap();
        let response = router.handle(Request::new(Method::Put, "/only-get"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn custom_not_found_handler() {
        let mut router = Router::new();
        router.not_found(|ctx: &mut Context| {
            let mut body = crate::context::Body::new();
            body.insert("error".to_owned(), "no such route".into());
            ctx.json(StatusCode::NOT_FOUND, &body);
        });
        let response = get(&router, "/nowhere");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body(), br#"{"error":"no such route"}"#);
    }

    #[test]
    fn global_middleware_runs_for_not_found() {
        let log = Log::default();
        let mut router = Router::new();
        router.use_middleware(vec![tag(&log, "global")]).unwrap();
        router.get("/known", text("ok")).unwrap();

        let response = get(&router, "/unknown");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(*log.lock().unwrap(), vec!["global"]);
    }

    #[test]
    fn scoped_middleware_order() {
        let log = Log::default();
        let mut router = Router::new();
        router
            .group("/api")
            .unwrap()
            .use_middleware(vec![tag(&log, "m1")])
            .unwrap();
        router
            .group("/api/v1")
            .unwrap()
            .use_middleware(vec![tag(&log, "m2")])
            .unwrap();
        router
            .route(Method::Get, "/api/v1/ping", tag(&log, "handler"))
            .unwrap();

        get(&router, "/api/v1/ping");
        assert_eq!(*log.lock().unwrap(), vec!["m1", "m2", "handler"]);
    }

    #[test]
    fn path_is_cleaned_before_lookup() {
        let mut router = Router::new();
        router.get("/b/c", text("cleaned")).unwrap();
        assert_eq!(get(&router, "/a/../b//c/").body(), b"cleaned");
        assert_eq!(get(&router, "/./b/./c").body(), b"cleaned");
    }

    #[test]
    fn registration_cleans_patterns() {
        let mut router = Router::new();
        router.get("/users/", text("list")).unwrap();
        assert_eq!(router.patterns(), vec!["/users"]);
        assert!(router.resolve(&Method::Get, "/users/").handler.is_some());
    }

    #[test]
    fn pattern_must_start_with_slash() {
        let mut router = Router::new();
        let err = router.get("users", text("x")).unwrap_err();
        assert_eq!(
            err,
            RouteError::InvalidPattern {
                pattern: "users".to_owned()
            }
        );
    }

    #[test]
    fn registration_errors_surface() {
        let mut router = Router::new();
        router.get("/users/:id", text("a")).unwrap();
        assert!(matches!(
            router.get("/users/:id", text("b")),
            Err(RouteError::Duplicate { .. })
        ));
        assert!(matches!(
            router.get("/users/:name", text("c")),
            Err(RouteError::Conflict { .. })
        ));
        assert_eq!(get(&router, "/users/1").body(), b"a");
    }

    #[test]
    fn any_binds_every_standard_method() {
        let mut router = Router::new();
        router.any("/health", text("up")).unwrap();
        for method in Method::STANDARD {
            let response = router.handle(Request::new(method, "/health"));
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert!(router.get("/health", text("again")).is_err());
    }

    #[test]
    fn with_defaults_recovers_from_panics() {
        let mut router = Router::with_defaults();
        router
            .get("/boom", |_ctx: &mut Context| panic!("exploded"))
            .unwrap();
        let response = get(&router, "/boom");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), b"exploded");
    }

    #[test]
    fn wildcard_params_reach_the_handler() {
        let mut router = Router::new();
        router
            .get("/files/*path", |ctx: &mut Context| {
                let path = ctx.param("path").unwrap_or_default().to_owned();
                ctx.string(StatusCode::OK, path);
            })
            .unwrap();
        assert_eq!(get(&router, "/files/a/b/c").body(), b"a/b/c");
    }

    #[test]
    fn pooled_contexts_do_not_leak_state() {
        let mut router = Router::new();
        router
            .get("/set/:value", |ctx: &mut Context| {
                let value = ctx.param("value").unwrap_or_default().to_owned();
                ctx.extensions_mut().insert(value);
                ctx.writer_mut().set_header("X-Seen", "yes");
                ctx.string(StatusCode::CREATED, "set");
            })
            .unwrap();
        router
            .get("/check", |ctx: &mut Context| {
                let leaked = ctx.extensions().get::<String>().is_some()
                    || ctx.writer().is_written()
                    || !ctx.params().is_empty();
                ctx.string(StatusCode::OK, if leaked { "leaked" } else { "clean" });
            })
            .unwrap();

        assert_eq!(get(&router, "/set/abc").status(), StatusCode::CREATED);
        assert_eq!(router.pool.idle_len(), 1);
        let response = get(&router, "/check");
        assert_eq!(response.body(), b"clean");
        assert!(!response.header_list().contains("x-seen"));
    }

    #[test]
    fn pooling_can_be_disabled() {
        let mut router = Router::new().pooling(false);
        router.get("/", text("root")).unwrap();
        assert_eq!(get(&router, "/").body(), b"root");
        assert_eq!(router.pool.idle_len(), 0);
    }

    #[test]
    fn router_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Router>();

        let mut router = Router::new();
        router
            .get("/n/:n", |ctx: &mut Context| {
                let n = ctx.param("n").unwrap_or_default().to_owned();
                ctx.string(StatusCode::OK, n);
            })
            .unwrap();
        let router = Arc::new(router);

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let router = Arc::clone(&router);
                std::thread::spawn(move || {
                    let response = router.handle(Request::new(Method::Get, &format!("/n/{i}")));
                    String::from_utf8(response.body().to_vec()).unwrap()
                })
            })
            .collect();

        for (i, worker) in workers.into_iter().enumerate() {
            assert_eq!(worker.join().unwrap(), i.to_string());
        }
    }
}
