//! A small service showing routes, groups, middleware, plugins and uploads.
//!
//! ```sh
//! RUST_LOG=info cargo run --example hello_world
//! curl http://127.0.0.1:8080/hello/ada
//! curl http://127.0.0.1:8080/api/v1/users/7
//! curl http://127.0.0.1:8080/api/status
//! curl -F title=notes -F file=@Cargo.toml http://127.0.0.1:8080/upload
//! ```

use std::time::Duration;

use serde::Serialize;
use switchyard::middleware::{Next, from_fn};
use switchyard::plugin::builtin::{CorsPlugin, RequestLogPlugin, StatusPlugin};
use switchyard::{Context, Server, ServerConfig, StatusCode};
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Serialize)]
struct UploadSummary {
    fields: Vec<String>,
    files: Vec<(String, usize)>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::new()
        .with_bind_address("127.0.0.1:8080")
        .with_read_timeout(Duration::from_secs(10))
        .with_setting("greeting", "Hello");
    let mut server = Server::new(config)?;

    server.add_plugin(RequestLogPlugin)?;
    server.add_plugin(CorsPlugin::default())?;
    server.add_plugin(StatusPlugin::new())?;

    let greeting = server.config().setting("greeting").unwrap_or("Hi").to_owned();
    server.wrap(from_fn(move |mut ctx: Context, next: Next| {
        let greeting = greeting.clone();
        async move {
            ctx.set("greeting", greeting);
            next.run(ctx).await
        }
    }));

    let router = server.router();
    router.get("/", |mut ctx: Context| async move {
        ctx.html("<h1>switchyard</h1><p>Try <a href=\"/hello/world\">/hello/world</a>.</p>");
        ctx
    })?;

    router.get("/hello/:name", |mut ctx: Context| async move {
        let greeting = ctx
            .get::<String>("greeting")
            .map(String::as_str)
            .unwrap_or("Hello")
            .to_owned();
        let name = ctx.param("name").unwrap_or("world").to_owned();
        ctx.text(format!("{greeting}, {name}!"));
        ctx
    })?;

    router.get("/old-home", |mut ctx: Context| async move {
        ctx.redirect("/", StatusCode::MovedPermanently);
        ctx
    })?;

    router.post("/upload", |mut ctx: Context| async move {
        match ctx.multipart() {
            Ok(form) => {
                let summary = UploadSummary {
                    fields: form.fields().map(|p| p.name().to_owned()).collect(),
                    files: form
                        .files()
                        .map(|p| (p.filename().unwrap_or_default().to_owned(), p.data().len()))
                        .collect(),
                };
                if ctx.json(&summary).is_err() {
                    ctx.status(StatusCode::InternalServerError);
                }
            }
            Err(e) => {
                ctx.status(StatusCode::BadRequest).text(e.to_string());
            }
        }
        ctx
    })?;

    let mut v1 = server.router().group("/api").group("/v1");
    v1.get("/users/:id", |mut ctx: Context| async move {
        match ctx.param("id").and_then(|id| id.parse::<u64>().ok()) {
            Some(id) => {
                let user = User {
                    id,
                    name: format!("user-{id}"),
                };
                if ctx.json(&user).is_err() {
                    ctx.status(StatusCode::InternalServerError);
                }
            }
            None => {
                ctx.status(StatusCode::BadRequest).text("id must be a number");
            }
        }
        ctx
    })?;
    v1.get("/files/*", |mut ctx: Context| async move {
        let rest = ctx.param("wildcard").unwrap_or_default().to_owned();
        ctx.text(format!("would serve {rest}"));
        ctx
    })?;
    server.router().merge(v1);

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
        }
    });

    server.start().await?;
    Ok(())
}
