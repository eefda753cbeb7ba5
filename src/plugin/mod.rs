//! Plugin system — packaged routes, middleware, and lifecycle hooks.
//!
//! A [`Plugin`] contributes routes and middleware when it is added to a
//! [`Server`](crate::Server), and is told when the server starts and stops.
//! Plugins are kept in a [`PluginRegistry`] sorted by [`Plugin::priority`];
//! lifecycle hooks run lowest priority first. Routes and middleware are
//! registered at the moment a plugin is added, after anything already there.
//!
//! ## Priority bands
//!
//! | Range     | Intended use                         |
//! |-----------|--------------------------------------|
//! | 0–100     | infrastructure (logging, tracing)    |
//! | 100–300   | security (CORS, auth)                |
//! | 300–500   | business logic                       |
//! | 500–700   | optional features                    |
//! | 700–1000  | presentation                         |
//!
//! # Examples
//!
//! ```rust
//! use switchyard::{Context, Plugin, Router};
//! use switchyard::router::RouteError;
//!
//! struct Health;
//!
//! impl Plugin for Health {
//!     fn name(&self) -> &str { "health" }
//!     fn version(&self) -> &str { "1.0.0" }
//!
//!     fn register_routes(&self, router: &mut Router) -> Result<(), RouteError> {
//!         router.get("/healthz", |mut ctx: Context| async move {
//!             ctx.text("ok");
//!             ctx
//!         })
//!     }
//! }
//! ```

pub mod builtin;
pub mod registry;

use thiserror::Error;

use crate::{
    middleware::MiddlewareStack,
    router::{RouteError, Router},
    server::ServerHandle,
};

pub use registry::PluginRegistry;

/// Priority given to plugins that do not override [`Plugin::priority`].
pub const DEFAULT_PRIORITY: i32 = 500;

/// Failure reported by a plugin lifecycle hook.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Reasons a plugin can be refused by [`PluginRegistry::add`].
///
/// In every case the registry and the server are left as they were.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin {name:?} is disabled")]
    Disabled { name: String },

    #[error("a plugin named {name:?} is already loaded")]
    Duplicate { name: String },

    #[error("plugin {name:?} requires plugins that are not loaded: {missing:?}")]
    MissingDependencies { name: String, missing: Vec<String> },

    #[error("plugin {name:?} failed its dependency check")]
    DependencyCheck { name: String },

    #[error("plugin {name:?} failed to initialize: {source}")]
    Initialize {
        name: String,
        #[source]
        source: HookError,
    },

    #[error("plugin {name:?} failed to register routes: {source}")]
    Routes {
        name: String,
        #[source]
        source: RouteError,
    },
}

/// A bundle of routes, middleware, and lifecycle hooks.
///
/// Only [`name`](Self::name) and [`version`](Self::version) are required;
/// everything else has a no-op default.
///
/// Hooks run in this order over a plugin's life:
///
/// 1. [`initialize`](Self::initialize) when it is added;
/// 2. [`register_routes`](Self::register_routes) and
///    [`register_middleware`](Self::register_middleware) right after;
/// 3. [`on_server_start`](Self::on_server_start) before the listener binds;
/// 4. [`on_server_stop`](Self::on_server_stop) once in-flight requests drained;
/// 5. [`shutdown`](Self::shutdown) last, or when the plugin is removed.
pub trait Plugin: Send + Sync {
    /// Unique name; a second plugin with the same name is refused.
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn description(&self) -> &str {
        "No description provided"
    }

    fn author(&self) -> &str {
        "Unknown"
    }

    /// Lower values start and stop first.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// A disabled plugin is refused when added.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Names of plugins that must already be loaded.
    fn requires(&self) -> &[&'static str] {
        &[]
    }

    /// Returns `true` when every name in [`requires`](Self::requires) is in `loaded`.
    fn check_dependencies(&self, loaded: &[&str]) -> bool {
        self.requires().iter().all(|dep| loaded.contains(dep))
    }

    fn initialize(&mut self, _server: &ServerHandle) -> Result<(), HookError> {
        Ok(())
    }

    fn shutdown(&mut self) {}

    /// Called before the server binds. An error aborts startup.
    fn on_server_start(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    fn on_server_stop(&mut self) {}

    fn register_routes(&self, _router: &mut Router) -> Result<(), RouteError> {
        Ok(())
    }

    fn register_middleware(&self, _stack: &mut MiddlewareStack) {}
}
