//! Minimal waypost example: hooks, named middleware, JSON and text routes.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/users/42
//!   curl -i -H 'authorization: Bearer x' http://localhost:3000/users/42
//!   curl -i -X POST http://localhost:3000/users -d '{"name":"alice"}'
//!   curl -i http://localhost:3000/boom

use std::time::Instant;

use waypost::{App, ControlSignal, Error, Method, RouteOptions, Server, StatusCode};

struct Started(Instant);

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let mut app = App::new();

    app.before(|ctx| {
        Box::pin(async move {
            ctx.set_session(Started(Instant::now()));
            Ok(())
        })
    })
    .after(|ctx| {
        Box::pin(async move {
            if let Some(Started(at)) = ctx.session::<Started>() {
                tracing::info!(path = ctx.path(), elapsed = ?at.elapsed(), "handled");
            }
            Ok(())
        })
    })
    .on_error(|ctx, err| {
        Box::pin(async move {
            let body = serde_json::json!({ "error": err.to_string() });
            ctx.response_mut()
                .set_status(StatusCode::INTERNAL_SERVER_ERROR)
                .send(body, true)
                .await;
            Ok(())
        })
    });

    app.register_middleware("auth", |ctx| {
        Box::pin(async move {
            if ctx.header("authorization").is_some() {
                return Ok(ControlSignal::Continue);
            }
            ctx.response_mut()
                .set_status(StatusCode::UNAUTHORIZED)
                .set_header("www-authenticate", "Bearer")
                .end();
            Ok(ControlSignal::Halt)
        })
    });

    app.route(Method::GET, "/users/:id", RouteOptions::new().middleware("auth"), get_user)?
        .on(Method::POST, "/users", create_user)?
        .on(Method::GET, "/boom", |_| Box::pin(async { Err(Error::handler("exploded")) }))?;

    Server::bind("0.0.0.0:3000").serve(app).await
}

// GET /users/:id
fn get_user(ctx: &mut waypost::RequestContext) -> waypost::BoxFuture<'_, Result<(), Error>> {
    Box::pin(async move {
        let id = ctx.param("id").unwrap_or("unknown").to_owned();
        ctx.response_mut().json(&serde_json::json!({ "id": id, "name": "alice" })).await?;
        Ok(())
    })
}

// POST /users
fn create_user(ctx: &mut waypost::RequestContext) -> waypost::BoxFuture<'_, Result<(), Error>> {
    Box::pin(async move {
        let body = ctx.body_bytes().await?;
        if body.is_empty() {
            ctx.response_mut().set_status(StatusCode::BAD_REQUEST).end();
            return Ok(());
        }
        ctx.response_mut()
            .set_status(StatusCode::CREATED)
            .set_header("location", "/users/99")
            .send(body, true)
            .await;
        Ok(())
    })
}
