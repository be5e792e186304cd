//! Registration API: routes, named middleware and global hooks.
//!
//! Everything is registered on an [`App`] before serving starts. The app is
//! then frozen into a [`Pipeline`] that every request reads from.

use std::any::Any;
use std::sync::Arc;

use http::Method;
use tracing::debug;

use crate::context::RequestContext;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::hook::{Hook, HookRegistry};
use crate::middleware::{ControlSignal, MiddlewareRef, MiddlewareRegistry};
use crate::pipeline::Pipeline;
use crate::router::{Extra, Route, RouteConstraints, RouteStore, Router, RouterConfig};

/// Per-route options.
///
/// ```rust,ignore
/// RouteOptions::new()
///     .middleware("auth")
///     .middleware(MiddlewareRef::inline(rate_limit))
///     .host("api.example.com")
///     .extra(Permission::Admin)
///     .override_existing(true);
/// ```
#[derive(Clone, Default)]
pub struct RouteOptions {
    middleware: Vec<MiddlewareRef>,
    override_existing: bool,
    constraints: RouteConstraints,
    extra: Option<Extra>,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware to the route's chain.
    pub fn middleware(mut self, middleware: impl Into<MiddlewareRef>) -> Self {
        self.middleware.push(middleware.into());
        self
    }

    /// Replace a route already registered for the same method, path and host
    /// instead of failing.
    pub fn override_existing(mut self, yes: bool) -> Self {
        self.override_existing = yes;
        self
    }

    /// Restricts the route to one host. Passed through to the [`Router`].
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.constraints.host = Some(host.into());
        self
    }

    pub fn constraints(mut self, constraints: RouteConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Arbitrary metadata handed to the handler through
    /// [`RequestContext::store`].
    pub fn extra<T: Any + Send + Sync>(mut self, extra: T) -> Self {
        self.extra = Some(Arc::new(extra));
        self
    }
}

/// The application: route table plus pipeline configuration.
#[derive(Default)]
pub struct App {
    router: Router,
    middleware: MiddlewareRegistry,
    hooks: HookRegistry,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self { router: Router::new(config), ..Self::default() }
    }

    /// Registers a named middleware. Registering a name twice replaces the
    /// first one.
    pub fn register_middleware<M>(&mut self, name: impl Into<String>, middleware: M) -> &mut Self
    where
        M: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, Result<ControlSignal, Error>>
            + Send
            + Sync
            + 'static,
    {
        self.middleware.register(name, Arc::new(middleware));
        self
    }

    /// Adds a hook run before the middleware of every matched route.
    pub fn before<H>(&mut self, hook: H) -> &mut Self
    where
        H: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>>
            + Send
            + Sync
            + 'static,
    {
        self.register_hook(Hook::Before(Arc::new(hook)))
    }

    /// Adds a hook run after the handler of every matched route.
    pub fn after<H>(&mut self, hook: H) -> &mut Self
    where
        H: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>>
            + Send
            + Sync
            + 'static,
    {
        self.register_hook(Hook::After(Arc::new(hook)))
    }

    /// Adds a hook run with the error whenever a request fails.
    pub fn on_error<H>(&mut self, hook: H) -> &mut Self
    where
        H: for<'a> Fn(&'a mut RequestContext, &'a Error) -> BoxFuture<'a, Result<(), Error>>
            + Send
            + Sync
            + 'static,
    {
        self.register_hook(Hook::Error(Arc::new(hook)))
    }

    pub fn register_hook(&mut self, hook: Hook) -> &mut Self {
        self.hooks.add(hook);
        self
    }

    /// Registers a route with default options.
    pub fn on<H>(&mut self, method: Method, path: &str, handler: H) -> Result<&mut Self, Error>
    where
        H: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>>
            + Send
            + Sync
            + 'static,
    {
        self.route(method, path, RouteOptions::default(), handler)
    }

    /// Registers a route.
    ///
    /// Fails with [`Error::Route`] if the method, path and host are already
    /// taken and `options` does not ask to override.
    pub fn route<H>(
        &mut self,
        method: Method,
        path: &str,
        options: RouteOptions,
        handler: H,
    ) -> Result<&mut Self, Error>
    where
        H: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>>
            + Send
            + Sync
            + 'static,
    {
        let RouteOptions { middleware, override_existing, constraints, extra } = options;

        if override_existing && self.router.remove_constrained(&method, path, &constraints) {
            debug!(%method, path, "route overridden");
        }

        let route = Route { handler: Arc::new(handler), store: RouteStore { middleware, extra } };
        self.router.insert(method, path, &constraints, route)?;
        Ok(self)
    }

    /// Removes every route registered for `method` and `path`. A no-op when
    /// there is none.
    pub fn unregister(&mut self, method: &Method, path: &str) -> &mut Self {
        self.router.remove(method, path);
        self
    }

    pub fn router(&self) -> &Router { &self.router }
    pub fn middleware(&self) -> &MiddlewareRegistry { &self.middleware }
    pub fn hooks(&self) -> &HookRegistry { &self.hooks }

    /// Freezes the configuration.
    pub fn into_pipeline(self) -> Pipeline {
        Pipeline::new(self.router, self.middleware, self.hooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::Phase;

    fn ok(_: &mut RequestContext) -> BoxFuture<'_, Result<(), Error>> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn override_replaces_existing_route() {
        let mut app = App::new();
        app.route(Method::GET, "/x", RouteOptions::new().extra("first"), ok).unwrap();
        app.route(
            Method::GET,
            "/x",
            RouteOptions::new().extra("second").override_existing(true),
            ok,
        )
        .unwrap();

        assert_eq!(app.router().len(), 1);
        let matched = app.router().find(&Method::GET, "/x", None).unwrap();
        let extra = matched.route.store.extra.as_ref().unwrap();
        assert_eq!(extra.downcast_ref::<&str>(), Some(&"second"));
    }

    #[test]
    fn duplicate_without_override_fails() {
        let mut app = App::new();
        app.on(Method::GET, "/x", ok).unwrap();
        assert!(matches!(app.on(Method::GET, "/x", ok), Err(Error::Route { .. })));
    }

    #[test]
    fn override_on_fresh_path_just_registers() {
        let mut app = App::new();
        app.route(Method::GET, "/x", RouteOptions::new().override_existing(true), ok).unwrap();
        assert_eq!(app.router().len(), 1);
    }

    #[test]
    fn route_keeps_middleware_in_order() {
        let mut app = App::new();
        app.route(Method::GET, "/x", RouteOptions::new().middleware("a").middleware("b"), ok)
            .unwrap();

        let matched = app.router().find(&Method::GET, "/x", None).unwrap();
        let names: Vec<_> = matched
            .route
            .store
            .middleware
            .iter()
            .map(|m| match m {
                MiddlewareRef::Named(name) => name.as_str(),
                MiddlewareRef::Inline(_) => "inline",
            })
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn unregister_is_a_noop_when_missing() {
        let mut app = App::new();
        app.on(Method::GET, "/x", ok).unwrap();
        app.unregister(&Method::GET, "/missing").unregister(&Method::GET, "/x");
        assert!(app.router().is_empty());
    }

    #[test]
    fn hooks_and_middleware_are_recorded() {
        let mut app = App::new();
        app.before(ok)
            .after(ok)
            .after(ok)
            .on_error(|_, _| Box::pin(async { Ok(()) }))
            .register_middleware("auth", |_| Box::pin(async { Ok(ControlSignal::Continue) }));

        assert_eq!(app.hooks().len(Phase::Before), 1);
        assert_eq!(app.hooks().len(Phase::After), 2);
        assert_eq!(app.hooks().len(Phase::Error), 1);
        assert!(app.middleware().contains("auth"));
    }
}
