//! Small JSON API served by `ruta`.
//!
//! ```text
//! RUST_LOG=debug cargo run --example hello_world
//! curl localhost:8080/hello/ada
//! curl -H 'Authorization: demo' localhost:8080/api/v1/users/7
//! curl -H 'Authorization: demo' -X POST -d '{"name":"grace"}' localhost:8080/api/v1/users
//! curl localhost:8080/static/css/site.css
//! ```

use std::sync::Arc;

use ruta::{Context, HandlerFunc, Router, Routes, StatusCode};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

fn require_token(ctx: &mut Context) {
    if ctx.request().headers().get("authorization").is_none() {
        ctx.string(StatusCode::UNAUTHORIZED, "missing token");
        ctx.abort();
    }
}

fn show_user(ctx: &mut Context) {
    match ctx.param("id").and_then(|id| id.parse().ok()) {
        Some(id) => ctx.json(
            StatusCode::OK,
            &User {
                id,
                name: format!("user-{id}"),
            },
        ),
        None => ctx.string(StatusCode::BAD_REQUEST, "id must be a number"),
    }
}

fn create_user(ctx: &mut Context) {
    match ctx.body_json::<NewUser>() {
        Ok(new_user) => ctx.json(
            StatusCode::CREATED,
            &User {
                id: 1,
                name: new_user.name,
            },
        ),
        Err(e) => ctx.string(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut router = Router::with_defaults();

    router.get("/hello/:name", |ctx: &mut Context| {
        let name = ctx.param("name").unwrap_or("world").to_owned();
        ctx.string(StatusCode::OK, format!("Hello, {name}!"));
    })?;

    router.get("/static/*", |ctx: &mut Context| {
        let file = ctx.param("path").unwrap_or_default().to_owned();
        ctx.string(StatusCode::OK, format!("would serve {file}"));
    })?;

    {
        let mut api = router.group("/api")?;
        let mut v1 = api.group("/v1")?;
        let auth: HandlerFunc = Arc::new(require_token);
        v1.use_middleware(vec![auth])?;
        v1.get("/users/:id", show_user)?;
        v1.post("/users", create_user)?;
    }

    for pattern in router.patterns() {
        tracing::debug!(%pattern, "pattern");
    }

    router.run("127.0.0.1:8080").await?;
    Ok(())
}
