//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! A route table holds handlers of *different* closure types, and every one
//! of them borrows the same [`RequestContext`] mutably for the length of its
//! future. That rules out a plain `Fn(Ctx) -> impl Future`: the future has to
//! carry the borrow's lifetime. So a handler is any function of the shape
//!
//! ```text
//! for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>>
//! ```
//!
//! which in practice is written as a closure returning `Box::pin(async move { … })`:
//!
//! ```rust,ignore
//! app.on(Method::GET, "/users/:id", |ctx| Box::pin(async move {
//!     let id = ctx.param("id").unwrap_or_default().to_owned();
//!     ctx.response_mut().send(id, true).await;
//!     Ok(())
//! }))?;
//! ```
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! |ctx| Box::pin(async move { … })        ← user writes this
//!        ↓ app.on(method, path, f)
//! Arc::new(f) as BoxedHandler             ← Handler blanket impl
//!        ↓  stored in the route table
//! handler.call(&mut ctx)  at request time ← one vtable dispatch
//! ```
//!
//! Before and after hooks share this signature; middleware and error hooks
//! have their own traits built the same way.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::Error;

/// A heap-allocated, type-erased future borrowing from the request.
///
/// `Send` lets tokio move an in-flight request across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A route handler or a before/after hook.
///
/// Implemented for every function with the right signature; see the module
/// docs for the shape.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>> {
        (self)(ctx)
    }
}

/// A handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;
