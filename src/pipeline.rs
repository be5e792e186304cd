//! Per-request dispatch.
//!
//! ```text
//! resolve ──miss──▶ 404, end                                  (NotFound)
//!    │
//!    ▼
//! before hooks ─▶ middleware ─▶ handler ─▶ after hooks ─▶ end (Done)
//!    │                │  └─Halt──────────────────────────▶ end (Done)
//!    └──── any error or panic ──▶ error hooks ─▶ 500, end     (Failed)
//! ```
//!
//! Steps of one request run strictly one after another. Requests run
//! concurrently with each other, each with its own [`RequestContext`]; the
//! configuration itself is immutable once the pipeline is built.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use http::StatusCode;
use http_body_util::BodyExt;
use tracing::{Instrument, debug, error, info_span};

use crate::body::{RequestBody, ResponseBody};
use crate::context::{RequestContext, Target};
use crate::error::Error;
use crate::hook::HookRegistry;
use crate::middleware::{ControlSignal, MiddlewareRegistry};
use crate::response::Response;
use crate::router::{Route, Router};
use crate::transport::{self, ResponseHandle};

/// How a request left the pipeline. Every request ends in exactly one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// No route matched; answered with `404`.
    NotFound,
    /// The handler ran, or a middleware halted the chain.
    Done,
    /// A step failed and the error hooks ran.
    Failed,
}

/// The frozen configuration every request is dispatched against.
///
/// Built by [`App::into_pipeline`](crate::App::into_pipeline).
pub struct Pipeline {
    router: Router,
    middleware: MiddlewareRegistry,
    hooks: HookRegistry,
}

impl Pipeline {
    pub(crate) fn new(router: Router, middleware: MiddlewareRegistry, hooks: HookRegistry) -> Self {
        Self { router, middleware, hooks }
    }

    pub fn router(&self) -> &Router { &self.router }

    /// Runs `request` to completion and returns the whole answer.
    ///
    /// The body is buffered in memory. Servers go through
    /// [`handle`](Self::handle), which streams it instead.
    pub async fn dispatch(&self, request: http::Request<RequestBody>) -> (Outcome, http::Response<Bytes>) {
        let (handle, pending) = transport::channel();
        let read = async {
            let (parts, body) = pending.into_http().await.into_parts();
            let collected = body.collect().await.unwrap_or_else(|never| match never {});
            let bytes = collected.to_bytes();
            http::Response::from_parts(parts, bytes)
        };
        tokio::join!(self.exchange(request, handle), read)
    }

    /// Runs `request`, writing the answer into `handle` as it is produced.
    /// Someone must be reading the other end of `handle`.
    async fn exchange(&self, request: http::Request<RequestBody>, handle: ResponseHandle) -> Outcome {
        let target = Target::parse(&request);
        let mut response = Response::new(handle);

        let Some(matched) = self.router.find(request.method(), &target.path, target.host.as_deref())
        else {
            debug!(path = %target.path, "no route matched");
            response.set_status(StatusCode::NOT_FOUND).end();
            return Outcome::NotFound;
        };

        let route = matched.route;
        let store = route.store.extra.clone();
        let mut ctx = RequestContext::new(request, target, matched.params, store, response);

        let outcome = match AssertUnwindSafe(self.run(&mut ctx, &route)).catch_unwind().await {
            Ok(Ok(ControlSignal::Continue)) => Outcome::Done,
            Ok(Ok(ControlSignal::Halt)) => {
                debug!("halted by middleware");
                Outcome::Done
            }
            Ok(Err(err)) => {
                self.fail(&mut ctx, err).await;
                Outcome::Failed
            }
            Err(panic) => {
                self.fail(&mut ctx, Error::Panic(panic_message(panic))).await;
                Outcome::Failed
            }
        };

        if !ctx.response().is_finalized() {
            ctx.response_mut().end();
        }
        outcome
    }

    /// Transport entry point: dispatches `request` on its own task and
    /// returns as soon as the response head is available. The body keeps
    /// streaming from that task.
    pub async fn handle(self: Arc<Self>, request: http::Request<RequestBody>) -> http::Response<ResponseBody> {
        let span = info_span!("request", method = %request.method(), path = %request.uri().path());
        let (handle, pending) = transport::channel();

        tokio::spawn(
            async move {
                let outcome = self.exchange(request, handle).await;
                debug!(?outcome, "request finished");
            }
            .instrument(span),
        );

        pending.into_http().await
    }

    async fn run(&self, ctx: &mut RequestContext, route: &Route) -> Result<ControlSignal, Error> {
        for hook in self.hooks.before() {
            hook.call(ctx).await?;
        }

        for reference in &route.store.middleware {
            let middleware = self.middleware.resolve(reference)?;
            if middleware.call(ctx).await? == ControlSignal::Halt {
                return Ok(ControlSignal::Halt);
            }
        }

        route.handler.call(ctx).await?;

        for hook in self.hooks.after() {
            hook.call(ctx).await?;
        }
        Ok(ControlSignal::Continue)
    }

    /// Runs the error hooks in order, then answers `500` unless one of them
    /// already finalized the response. A failing error hook stops the rest.
    async fn fail(&self, ctx: &mut RequestContext, err: Error) {
        error!(error = %err, "request failed");

        for hook in self.hooks.error() {
            match AssertUnwindSafe(hook.call(ctx, &err)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(hook_err)) => {
                    error!(error = %hook_err, "error hook failed");
                    break;
                }
                Err(panic) => {
                    error!(panic = %panic_message(panic), "error hook panicked");
                    break;
                }
            }
        }

        if !ctx.response().is_finalized() {
            ctx.response_mut().set_status(StatusCode::INTERNAL_SERVER_ERROR).end();
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => (*message).to_owned(),
            Err(_) => "unknown panic".to_owned(),
        },
    }
}
