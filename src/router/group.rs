use super::path::join_paths;
use super::{RouteError, Router, Routes};
use crate::http::Method;
use crate::middleware::HandlerFunc;

/// A registration view that prefixes every pattern with a fixed path.
///
/// Groups are pure path composition: they own nothing and leave no trace in
/// the routing tree beyond the routes and middleware registered through them.
///
/// # Examples
///
/// ```rust
/// use ruta::{Context, Method, Request, Router, Routes, StatusCode};
///
/// let mut router = Router::new();
/// {
///     let mut api = router.group("/api").unwrap();
///     let mut v1 = api.group("/v1").unwrap();
///     v1.get("/ping", |ctx: &mut Context| ctx.string(StatusCode::OK, "pong"))
///         .unwrap();
/// }
///
/// let response = router.handle(Request::new(Method::Get, "/api/v1/ping"));
/// assert_eq!(response.body(), b"pong");
/// ```
pub struct Group<'r> {
    prefix: String,
    router: &'r mut Router,
}

impl<'r> Group<'r> {
    pub(crate) fn new(router: &'r mut Router, base: &str, prefix: &str) -> Result<Self, RouteError> {
        require_leading_slash(prefix)?;
        Ok(Self {
            prefix: join_paths(base, prefix),
            router,
        })
    }

    /// The cleaned prefix applied to this group's registrations.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// A nested group under this group's prefix.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] when `prefix` does not start with `/`.
    pub fn group(&mut self, prefix: &str) -> Result<Group<'_>, RouteError> {
        Group::new(self.router, &self.prefix, prefix)
    }
}

impl Routes for Group<'_> {
    fn route(&mut self, method: Method, path: &str, handler: HandlerFunc) -> Result<(), RouteError> {
        require_leading_slash(path)?;
        let pattern = join_paths(&self.prefix, path);
        self.router.register_route(method, &pattern, handler)
    }

    fn use_middleware(&mut self, middlewares: Vec<HandlerFunc>) -> Result<(), RouteError> {
        self.router.register_middleware(&self.prefix, middlewares)
    }
}

fn require_leading_slash(path: &str) -> Result<(), RouteError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(RouteError::InvalidPattern {
            pattern: path.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::Context;
    use crate::http::{Request, StatusCode};

    fn echo_pattern(pattern: &'static str) -> HandlerFunc {
        Arc::new(move |ctx: &mut Context| ctx.string(StatusCode::OK, pattern))
    }

    #[test]
    fn nested_prefixes_compose() {
        let mut router = Router::new();
        {
            let mut api = router.group("/api").unwrap();
            assert_eq!(api.prefix(), "/api");
            let mut v2 = api.group("/v2/").unwrap();
            assert_eq!(v2.prefix(), "/api/v2");
            v2.route(Method::Get, "/items/:id", echo_pattern("item"))
                .unwrap();
        }
        assert_eq!(router.patterns(), vec!["/api/v2/items/:id"]);
    }

    #[test]
    fn group_rejects_relative_paths() {
        let mut router = Router::new();
        assert!(matches!(
            router.group("api"),
            Err(RouteError::InvalidPattern { .. })
        ));

        let mut api = router.group("/api").unwrap();
        let err = api
            .route(Method::Get, "items", echo_pattern("x"))
            .unwrap_err();
        assert_eq!(
            err,
            RouteError::InvalidPattern {
                pattern: "items".to_owned()
            }
        );
    }

    #[test]
    fn group_middleware_scopes_to_prefix() {
        let mut router = Router::new();
        {
            let mut admin = router.group("/admin").unwrap();
            let guard: HandlerFunc = Arc::new(|ctx: &mut Context| {
                ctx.string(StatusCode::UNAUTHORIZED, "denied");
                ctx.abort();
            });
            admin.use_middleware(vec![guard]).unwrap();
            admin.route(Method::Get, "/stats", echo_pattern("stats")).unwrap();
        }
        router
            .route(Method::Get, "/public", echo_pattern("public"))
            .unwrap();

        let admin = router.handle(Request::new(Method::Get, "/admin/stats"));
        assert_eq!(admin.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(admin.body(), b"denied");

        let public = router.handle(Request::new(Method::Get, "/public"));
        assert_eq!(public.body(), b"public");
    }

    #[test]
    fn group_root_route_maps_to_prefix() {
        let mut router = Router::new();
        router
            .group("/docs")
            .unwrap()
            .route(Method::Get, "/", echo_pattern("index"))
            .unwrap();
        let response = router.handle(Request::new(Method::Get, "/docs"));
        assert_eq!(response.body(), b"index");
    }
}
