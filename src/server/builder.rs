//! Fluent construction of a [`Server`].

use thiserror::Error;

use super::{ConfigError, Server, ServerConfig};
use crate::http::Method;
use crate::middleware::{MiddlewareHandler, MiddlewareStack};
use crate::plugin::{Plugin, PluginError};
use crate::router::{IntoHandler, RouteError, Router};

/// Errors surfaced by [`ServerBuilder::build`].
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Collects configuration, plugins, middleware and routes, then builds a
/// [`Server`] in one step.
///
/// Plugins are added first, then middleware, then routes, so plugin
/// middleware wraps anything registered here. The first invalid route
/// pattern is remembered and reported by [`build`](Self::build).
///
/// ```rust,no_run
/// use switchyard::{Context, Server};
/// use switchyard::plugin::builtin::RequestLogPlugin;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut server = Server::builder()
///         .bind("127.0.0.1:8080")
///         .workers(4)
///         .plugin(RequestLogPlugin)
///         .get("/", |mut ctx: Context| async move {
///             ctx.html("<h1>Home</h1>");
///             ctx
///         })
///         .build()?;
///     server.start().await?;
///     Ok(())
/// }
/// ```
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    plugins: Vec<Box<dyn Plugin>>,
    middleware: MiddlewareStack,
    router: Router,
    route_error: Option<RouteError>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, address: impl Into<String>) -> Self {
        self.config.bind_address = address.into();
        self
    }

    /// Maximum number of connections served at once.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn middleware(mut self, middleware: MiddlewareHandler) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn route(mut self, method: Method, path: &str, handler: impl IntoHandler) -> Self {
        if let Err(e) = self.router.route(method, path, handler) {
            self.route_error.get_or_insert(e);
        }
        self
    }

    pub fn get(self, path: &str, handler: impl IntoHandler) -> Self {
        self.route(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl IntoHandler) -> Self {
        self.route(Method::Post, path, handler)
    }

    /// Validates the configuration and registers everything collected.
    ///
    /// # Errors
    ///
    /// - [`BuildError::Route`] for the first route pattern that failed to compile.
    /// - [`BuildError::Config`] when the configuration is invalid.
    /// - [`BuildError::Plugin`] when a plugin is refused.
    pub fn build(self) -> Result<Server, BuildError> {
        if let Some(e) = self.route_error {
            return Err(e.into());
        }

        let mut server = Server::new(self.config)?;
        for plugin in self.plugins {
            let handle = server.handle();
            server
                .plugins
                .add(plugin, &handle, &mut server.router, &mut server.middleware)?;
        }
        server.middleware.extend(self.middleware);
        server.router.merge(self.router);
        Ok(server)
    }
}

impl Server {
    /// Starts a [`ServerBuilder`] with the default configuration.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }
}
