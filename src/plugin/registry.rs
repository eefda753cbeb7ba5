//! Loaded plugins, kept in priority order.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info, warn};

use super::{Plugin, PluginError};
use crate::{
    middleware::MiddlewareStack,
    router::Router,
    server::{ServerError, ServerHandle},
};

/// Owns every loaded [`Plugin`], sorted ascending by priority.
///
/// Plugins with equal priority keep the order they were added in.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `plugin`, merging its routes into `router` and its middleware into `stack`.
    ///
    /// # Errors
    ///
    /// - [`PluginError::Disabled`] when [`Plugin::is_enabled`] is `false`.
    /// - [`PluginError::Duplicate`] when a plugin with the same name is loaded.
    /// - [`PluginError::MissingDependencies`] when a required plugin is absent.
    /// - [`PluginError::DependencyCheck`] when [`Plugin::check_dependencies`]
    ///   refuses without naming a missing plugin.
    /// - [`PluginError::Initialize`] when [`Plugin::initialize`] fails.
    /// - [`PluginError::Routes`] when [`Plugin::register_routes`] fails; the
    ///   plugin is shut down before returning.
    ///
    /// Nothing is registered on any error path.
    pub fn add(
        &mut self,
        mut plugin: Box<dyn Plugin>,
        server: &ServerHandle,
        router: &mut Router,
        stack: &mut MiddlewareStack,
    ) -> Result<(), PluginError> {
        let name = plugin.name().to_owned();

        if !plugin.is_enabled() {
            return Err(PluginError::Disabled { name });
        }
        if self.get(&name).is_some() {
            return Err(PluginError::Duplicate { name });
        }

        let loaded = self.names();
        if !plugin.check_dependencies(&loaded) {
            let missing: Vec<String> = plugin
                .requires()
                .iter()
                .filter(|dep| !loaded.contains(*dep))
                .map(|dep| dep.to_string())
                .collect();
            if missing.is_empty() {
                return Err(PluginError::DependencyCheck { name });
            }
            return Err(PluginError::MissingDependencies { name, missing });
        }

        plugin
            .initialize(server)
            .map_err(|source| PluginError::Initialize {
                name: name.clone(),
                source,
            })?;

        let mut routes = Router::new();
        if let Err(source) = plugin.register_routes(&mut routes) {
            shutdown_quietly(plugin.as_mut());
            return Err(PluginError::Routes { name, source });
        }
        let mut middleware = MiddlewareStack::new();
        plugin.register_middleware(&mut middleware);

        info!(
            plugin = %name,
            version = plugin.version(),
            priority = plugin.priority(),
            routes = routes.len(),
            middleware = middleware.len(),
            "plugin loaded"
        );

        router.merge(routes);
        stack.extend(middleware);
        self.plugins.push(plugin);
        self.plugins.sort_by_key(|p| p.priority());
        Ok(())
    }

    /// Unloads a plugin, calling its [`Plugin::shutdown`] hook.
    ///
    /// A panic in the hook is logged, not propagated. Routes and middleware it contributed stay registered.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Plugin>> {
        let position = self.plugins.iter().position(|p| p.name() == name)?;
        let mut plugin = self.plugins.remove(position);
        shutdown_quietly(plugin.as_mut());
        info!(plugin = %name, "plugin removed");
        Some(plugin)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// Loaded plugin names in priority order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Calls [`Plugin::on_server_start`] in priority order.
    ///
    /// The first failure stops the walk; plugins already started receive
    /// [`Plugin::on_server_stop`] before the error is returned.
    pub(crate) fn start_all(&mut self) -> Result<(), ServerError> {
        for index in 0..self.plugins.len() {
            let plugin = &mut self.plugins[index];
            debug!(plugin = plugin.name(), "starting plugin");
            if let Err(source) = plugin.on_server_start() {
                let name = plugin.name().to_owned();
                error!(plugin = %name, error = %source, "plugin failed to start");
                for started in self.plugins[..index].iter_mut().rev() {
                    stop_quietly(started.as_mut());
                }
                return Err(ServerError::PluginStart { name, source });
            }
        }
        Ok(())
    }

    /// Calls [`Plugin::on_server_stop`] on every plugin in priority order.
    pub(crate) fn notify_stop(&mut self) {
        for plugin in self.plugins.iter_mut() {
            stop_quietly(plugin.as_mut());
        }
    }

    /// Calls [`Plugin::on_server_stop`] on every plugin, then
    /// [`Plugin::shutdown`] on every plugin, both in priority order.
    ///
    /// A panicking hook is logged and the remaining plugins still run.
    pub(crate) fn stop_all(&mut self) {
        self.notify_stop();
        for plugin in self.plugins.iter_mut() {
            shutdown_quietly(plugin.as_mut());
        }
    }
}

fn shutdown_quietly(plugin: &mut dyn Plugin) {
    let name = plugin.name().to_owned();
    if panic::catch_unwind(AssertUnwindSafe(|| plugin.shutdown())).is_err() {
        warn!(plugin = %name, "plugin panicked during shutdown");
    }
}

fn stop_quietly(plugin: &mut dyn Plugin) {
    let name = plugin.name().to_owned();
    if panic::catch_unwind(AssertUnwindSafe(|| plugin.on_server_stop())).is_err() {
        warn!(plugin = %name, "plugin panicked in on_server_stop");
    }
}
