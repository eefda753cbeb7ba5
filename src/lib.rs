//! # switchyard
//!
//! An embeddable async HTTP/1.x dispatch engine: a regex-compiled path router,
//! an ordered middleware pipeline, and a prioritized plugin system on top of a
//! bounded Tokio accept loop.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use switchyard::{Context, Server, ServerConfig, StatusCode};
//! use switchyard::middleware::{Next, from_fn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::default().with_bind_address("127.0.0.1:8080"))?;
//!
//!     server.wrap(from_fn(|mut ctx: Context, next: Next| async move {
//!         ctx.set("request_id", 7_u64);
//!         next.run(ctx).await
//!     }));
//!
//!     server.router().get("/users/:id", |mut ctx: Context| async move {
//!         let id = ctx.param("id").unwrap_or_default().to_owned();
//!         ctx.status(StatusCode::Ok).text(format!("user {id}"));
//!         ctx
//!     })?;
//!
//!     server.start().await?;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod http;
pub mod middleware;
pub mod plugin;
pub mod router;
pub mod security;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use context::{Context, StateError};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::{Middleware, Next};
pub use plugin::{HookError, Plugin, PluginError};
pub use router::{RouteError, Router};
pub use server::{
    BuildError, ConfigError, Server, ServerBuilder, ServerConfig, ServerError, ServerHandle,
};
