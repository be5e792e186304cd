//! Global hooks, run for every matched route.
//!
//! Three ordered lists. `before` hooks run ahead of the route's middleware,
//! `after` hooks once the handler returned, and `error` hooks whenever any of
//! those raised. Each list runs in registration order; duplicates are fine.

use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler};

/// The lifecycle phase a hook is bound to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Before,
    After,
    Error,
}

/// A hook run with the error that aborted the request.
pub trait ErrorHook: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext, err: &'a Error)
        -> BoxFuture<'a, Result<(), Error>>;
}

impl<F> ErrorHook for F
where
    F: for<'a> Fn(&'a mut RequestContext, &'a Error) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut RequestContext, err: &'a Error)
        -> BoxFuture<'a, Result<(), Error>>
    {
        (self)(ctx, err)
    }
}

pub type BoxedErrorHook = Arc<dyn ErrorHook>;

/// A hook together with the phase it runs in.
#[derive(Clone)]
pub enum Hook {
    Before(BoxedHandler),
    After(BoxedHandler),
    Error(BoxedErrorHook),
}

impl Hook {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Before(_) => Phase::Before,
            Self::After(_) => Phase::After,
            Self::Error(_) => Phase::Error,
        }
    }
}

#[derive(Clone, Default)]
pub struct HookRegistry {
    before: Vec<BoxedHandler>,
    after: Vec<BoxedHandler>,
    error: Vec<BoxedErrorHook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `hook` to the list of its phase.
    pub fn add(&mut self, hook: Hook) {
        match hook {
            Hook::Before(hook) => self.before.push(hook),
            Hook::After(hook) => self.after.push(hook),
            Hook::Error(hook) => self.error.push(hook),
        }
    }

    pub fn before(&self) -> &[BoxedHandler] { &self.before }
    pub fn after(&self) -> &[BoxedHandler] { &self.after }
    pub fn error(&self) -> &[BoxedErrorHook] { &self.error }

    pub fn len(&self, phase: Phase) -> usize {
        match phase {
            Phase::Before => self.before.len(),
            Phase::After => self.after.len(),
            Phase::Error => self.error.len(),
        }
    }
}
