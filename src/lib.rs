//! # waypost
//!
//! A minimal HTTP dispatch layer. A request comes in, a route is resolved,
//! and a fixed pipeline runs around the route's handler:
//!
//! 1. global **before** hooks, in registration order
//! 2. the route's **middleware**, inline or registered by name; any step may
//!    answer [`ControlSignal::Halt`] to end the request there
//! 3. the **handler**
//! 4. global **after** hooks
//!
//! If any of these fails (or panics), the **error** hooks run with the error
//! and the request is answered `500` unless a hook already responded. A
//! request that matches no route gets an empty `404`.
//!
//! Handlers write through a fluent [`Response`] that flushes status and
//! headers exactly once, right before the first body byte, and sends text,
//! binary, JSON or streamed payloads.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use waypost::{App, ControlSignal, Method, RouteOptions, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), waypost::Error> {
//!     let mut app = App::new();
//!
//!     app.register_middleware("auth", |ctx| Box::pin(async move {
//!         if ctx.header("authorization").is_some() {
//!             return Ok(ControlSignal::Continue);
//!         }
//!         ctx.response_mut().set_status(StatusCode::UNAUTHORIZED).end();
//!         Ok(ControlSignal::Halt)
//!     }));
//!
//!     app.route(Method::GET, "/users/:id", RouteOptions::new().middleware("auth"), |ctx| {
//!         Box::pin(async move {
//!             let id = ctx.param("id").unwrap_or("unknown").to_owned();
//!             ctx.response_mut().json(&serde_json::json!({ "id": id })).await?;
//!             Ok(())
//!         })
//!     })?;
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//! ```

mod app;
mod context;
mod error;
mod handler;
mod hook;
mod pipeline;
mod response;
mod router;
mod server;

pub mod body;
pub mod middleware;
pub mod transport;

pub use app::{App, RouteOptions};
pub use context::RequestContext;
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, BoxedHandler, Handler};
pub use hook::{BoxedErrorHook, ErrorHook, Hook, HookRegistry, Phase};
pub use http::{Method, StatusCode};
pub use middleware::{ControlSignal, Middleware, MiddlewareRef, MiddlewareRegistry};
pub use pipeline::{Outcome, Pipeline};
pub use response::{ContentType, Payload, Response};
pub use router::{Extra, Matched, Route, RouteConstraints, RouteStore, Router, RouterConfig};
pub use server::Server;
