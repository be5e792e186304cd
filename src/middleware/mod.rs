//! Per-route middleware.
//!
//! Middleware runs after the global before hooks and ahead of the route
//! handler, in the order the route lists it. Each step answers with a
//! [`ControlSignal`]: `Continue` hands over to the next step, `Halt` ends the
//! dispatch quietly. A middleware that halts is expected to have written the
//! response itself (an auth rejection, a cached hit).
//!
//! Routes reference middleware either inline or by a name registered once on
//! the [`App`](crate::App):
//!
//! ```rust,ignore
//! app.register_middleware("auth", |ctx| Box::pin(async move {
//!     if ctx.header("authorization").is_some() {
//!         return Ok(ControlSignal::Continue);
//!     }
//!     ctx.response_mut().set_status(StatusCode::UNAUTHORIZED).end();
//!     Ok(ControlSignal::Halt)
//! }));
//!
//! app.route(Method::GET, "/me", RouteOptions::new().middleware("auth"), me)?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::Error;
use crate::handler::BoxFuture;

/// What a middleware tells the pipeline to do next.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlSignal {
    Continue,
    Halt,
}

/// A per-route pipeline step.
pub trait Middleware: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext)
        -> BoxFuture<'a, Result<ControlSignal, Error>>;
}

impl<F> Middleware for F
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, Result<ControlSignal, Error>>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut RequestContext)
        -> BoxFuture<'a, Result<ControlSignal, Error>>
    {
        (self)(ctx)
    }
}

pub type BoxedMiddleware = Arc<dyn Middleware>;

/// A route's reference to one middleware.
#[derive(Clone)]
pub enum MiddlewareRef {
    /// Looked up in the [`MiddlewareRegistry`] at dispatch time.
    Named(String),
    Inline(BoxedMiddleware),
}

impl MiddlewareRef {
    pub fn inline<M>(middleware: M) -> Self
    where
        M: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, Result<ControlSignal, Error>>
            + Send
            + Sync
            + 'static,
    {
        Self::Inline(Arc::new(middleware))
    }
}

impl fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Inline(_)   => f.write_str("Inline"),
        }
    }
}

impl From<&str> for MiddlewareRef {
    fn from(name: &str) -> Self { Self::Named(name.to_owned()) }
}

impl From<String> for MiddlewareRef {
    fn from(name: String) -> Self { Self::Named(name) }
}

impl From<BoxedMiddleware> for MiddlewareRef {
    fn from(middleware: BoxedMiddleware) -> Self { Self::Inline(middleware) }
}

/// Named middleware, filled in before the server starts.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    entries: HashMap<String, BoxedMiddleware>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `middleware` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, middleware: BoxedMiddleware) {
        self.entries.insert(name.into(), middleware);
    }

    /// Returns the inline middleware as is, or looks the name up.
    pub fn resolve(&self, reference: &MiddlewareRef) -> Result<BoxedMiddleware, Error> {
        match reference {
            MiddlewareRef::Inline(middleware) => Ok(Arc::clone(middleware)),
            MiddlewareRef::Named(name) => self
                .entries
                .get(name)
                .cloned()
                .ok_or_else(|| Error::MiddlewareNotFound(name.clone())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}
