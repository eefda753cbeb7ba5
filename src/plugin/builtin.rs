//! Plugins shipped with the crate.
//!
//! - [`RequestLogPlugin`] wraps every request in [`LoggerMiddleware`] (priority 0).
//! - [`CorsPlugin`] installs a [`CorsMiddleware`] (priority 100).
//! - [`StatusPlugin`] serves the dispatcher counters as JSON at `GET /api/status`.

use std::sync::Arc;

use serde::Serialize;

use super::{HookError, Plugin};
use crate::{
    Context, StatusCode,
    middleware::{LoggerMiddleware, MiddlewareStack, from_middleware},
    router::{RouteError, Router},
    security::CorsMiddleware,
    server::ServerHandle,
};

/// Logs method, path, status, and latency of every request.
#[derive(Debug, Default)]
pub struct RequestLogPlugin;

impl Plugin for RequestLogPlugin {
    fn name(&self) -> &str {
        "request-log"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Logs every request with its status and duration"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn register_middleware(&self, stack: &mut MiddlewareStack) {
        stack.push(from_middleware(Arc::new(LoggerMiddleware)));
    }
}

/// Installs a CORS policy in front of every route.
#[derive(Debug, Default)]
pub struct CorsPlugin {
    policy: CorsMiddleware,
}

impl CorsPlugin {
    pub fn new(policy: CorsMiddleware) -> Self {
        Self { policy }
    }
}

impl Plugin for CorsPlugin {
    fn name(&self) -> &str {
        "cors"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Cross-origin resource sharing headers and preflight handling"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn register_middleware(&self, stack: &mut MiddlewareStack) {
        stack.push(from_middleware(Arc::new(self.policy.clone())));
    }
}

#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    status: &'static str,
    version: &'static str,
    bind_address: &'a str,
    local_addr: Option<String>,
    workers: usize,
    active_connections: usize,
    total_requests: u64,
}

/// Serves a JSON snapshot of the dispatcher at `GET /api/status`.
///
/// ```json
/// {"status":"running","version":"0.1.0","bind_address":"0.0.0.0:8080",
///  "local_addr":"0.0.0.0:8080","workers":8,"active_connections":1,"total_requests":42}
/// ```
#[derive(Debug)]
pub struct StatusPlugin {
    path: String,
    server: Option<ServerHandle>,
}

impl Default for StatusPlugin {
    fn default() -> Self {
        Self::at("/api/status")
    }
}

impl StatusPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the report at `path` instead of `/api/status`.
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            server: None,
        }
    }
}

impl Plugin for StatusPlugin {
    fn name(&self) -> &str {
        "status"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Reports connection and request counters"
    }

    fn initialize(&mut self, server: &ServerHandle) -> Result<(), HookError> {
        self.server = Some(server.clone());
        Ok(())
    }

    fn shutdown(&mut self) {
        self.server = None;
    }

    fn register_routes(&self, router: &mut Router) -> Result<(), RouteError> {
        let Some(server) = self.server.clone() else {
            return Ok(());
        };
        router.get(&self.path, move |mut ctx: Context| {
            let server = server.clone();
            async move {
                let config = server.config();
                let report = StatusReport {
                    status: if server.is_running() { "running" } else { "stopped" },
                    version: env!("CARGO_PKG_VERSION"),
                    bind_address: &config.bind_address,
                    local_addr: server.local_addr().map(|addr| addr.to_string()),
                    workers: config.workers,
                    active_connections: server.active_connections(),
                    total_requests: server.total_requests(),
                };
                if let Err(e) = ctx.json(&report).map(|_| ()) {
                    tracing::error!(error = %e, "failed to encode status report");
                    ctx.status(StatusCode::InternalServerError)
                        .text(StatusCode::InternalServerError.canonical_reason());
                }
                ctx
            }
        })
    }
}
