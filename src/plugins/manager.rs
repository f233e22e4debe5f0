//! Plugin Manager
//!
//! Registry of plugins keyed by name, with hook dispatch, middleware chains
//! and lifecycle events broadcast to subscribers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

use super::middleware::{run_chain, MiddlewareEntry};
use super::{Hook, Middleware, Plugin, PluginMetadata};
use crate::error::{Error, Result};

const EVENT_CAPACITY: usize = 64;

// == Events ==
/// Lifecycle notifications, carrying the plugin name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    Loaded(String),
    Unloaded(String),
    Enabled(String),
    Disabled(String),
}

/// Public view of a registered plugin.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PluginInfo {
    #[serde(flatten)]
    pub metadata: PluginMetadata,
    pub enabled: bool,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PluginStats {
    pub total_plugins: usize,
    pub enabled_plugins: usize,
    /// Hook names with at least one handler
    pub total_hooks: usize,
    /// Event names with at least one middleware
    pub total_middlewares: usize,
    pub load_order: Vec<String>,
}

// == Registry ==
struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    metadata: PluginMetadata,
    enabled: bool,
    loaded_at: DateTime<Utc>,
}

impl LoadedPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            metadata: self.metadata.clone(),
            enabled: self.enabled,
            loaded_at: self.loaded_at,
        }
    }
}

#[derive(Clone)]
struct HookEntry {
    plugin: String,
    handler: Hook,
}

#[derive(Default)]
struct Registry {
    plugins: HashMap<String, LoadedPlugin>,
    order: Vec<String>,
    hooks: HashMap<String, Vec<HookEntry>>,
    middlewares: HashMap<String, Vec<MiddlewareEntry>>,
}

impl Registry {
    fn is_enabled(&self, plugin: &str) -> bool {
        self.plugins.get(plugin).is_some_and(|p| p.enabled)
    }

    fn insert(
        &mut self,
        name: &str,
        plugin: Arc<dyn Plugin>,
        metadata: PluginMetadata,
        hooks: Vec<(String, Hook)>,
        middlewares: Vec<(String, Arc<dyn Middleware>)>,
    ) {
        for (hook, handler) in hooks {
            self.hooks.entry(hook).or_default().push(HookEntry {
                plugin: name.to_string(),
                handler,
            });
        }
        for (event, middleware) in middlewares {
            self.middlewares.entry(event).or_default().push(MiddlewareEntry {
                plugin: name.to_string(),
                middleware,
            });
        }

        self.order.push(name.to_string());
        self.plugins.insert(
            name.to_string(),
            LoadedPlugin {
                plugin,
                metadata,
                enabled: true,
                loaded_at: Utc::now(),
            },
        );
    }

    fn remove(&mut self, name: &str) {
        self.plugins.remove(name);
        self.order.retain(|n| n != name);

        for handlers in self.hooks.values_mut() {
            handlers.retain(|h| h.plugin != name);
        }
        self.hooks.retain(|_, handlers| !handlers.is_empty());

        for chain in self.middlewares.values_mut() {
            chain.retain(|m| m.plugin != name);
        }
        self.middlewares.retain(|_, chain| !chain.is_empty());
    }
}

// == Plugin Manager ==
pub struct PluginManager {
    registry: RwLock<Registry>,
    events: broadcast::Sender<PluginEvent>,
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry: RwLock::new(Registry::default()),
            events,
        }
    }

    /// Receives lifecycle events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: PluginEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // == Registration ==
    /// Validates, initializes and registers a plugin with its hooks and middlewares.
    ///
    /// Dependencies must already be registered.
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let metadata = plugin.metadata();
        metadata.validate()?;
        let name = metadata.name.clone();

        {
            let registry = self.registry.read().await;
            if registry.plugins.contains_key(&name) {
                return Err(Error::DuplicatePlugin(name));
            }
            if let Some(missing) = metadata
                .dependencies
                .iter()
                .find(|dep| !registry.plugins.contains_key(dep.as_str()))
            {
                return Err(Error::MissingDependency {
                    plugin: name,
                    dependency: missing.clone(),
                });
            }
        }

        plugin.init().await.map_err(|source| Error::Plugin {
            plugin: name.clone(),
            source,
        })?;

        let hooks = plugin.hooks();
        let middlewares = plugin.middlewares();

        let raced = {
            let mut registry = self.registry.write().await;
            let raced = registry.plugins.contains_key(&name);
            if !raced {
                registry.insert(&name, plugin.clone(), metadata.clone(), hooks, middlewares);
            }
            raced
        };

        // Another registration of the same name won while `init` ran
        if raced {
            if let Err(err) = plugin.destroy().await {
                error!(plugin = %name, error = %err, "Error destroying duplicate plugin");
            }
            return Err(Error::DuplicatePlugin(name));
        }

        info!(plugin = %name, version = %metadata.version, "Loaded plugin");
        self.emit(PluginEvent::Loaded(name));
        Ok(())
    }

    /// Runs the plugin's `destroy` and removes it with its hooks and middlewares.
    ///
    /// Returns false if the plugin is unknown or its `destroy` failed, in
    /// which case it stays registered.
    pub async fn unload(&self, name: &str) -> bool {
        let Some(plugin) = self.plugin(name).await else {
            return false;
        };

        if let Err(err) = plugin.destroy().await {
            error!(plugin = name, error = %err, "Error unloading plugin");
            return false;
        }

        self.registry.write().await.remove(name);

        info!(plugin = name, "Unloaded plugin");
        self.emit(PluginEvent::Unloaded(name.to_string()));
        true
    }

    // == Enable / Disable ==
    pub async fn enable(&self, name: &str) -> Result<()> {
        self.set_enabled(name, true).await
    }

    /// Disabled plugins stay registered but their hooks and middlewares are skipped.
    pub async fn disable(&self, name: &str) -> Result<()> {
        self.set_enabled(name, false).await
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let plugin = self
            .plugin(name)
            .await
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;

        let outcome = if enabled {
            plugin.enable().await
        } else {
            plugin.disable().await
        };
        outcome.map_err(|source| Error::Plugin {
            plugin: name.to_string(),
            source,
        })?;

        if let Some(loaded) = self.registry.write().await.plugins.get_mut(name) {
            loaded.enabled = enabled;
        }

        if enabled {
            info!(plugin = name, "Enabled plugin");
            self.emit(PluginEvent::Enabled(name.to_string()));
        } else {
            info!(plugin = name, "Disabled plugin");
            self.emit(PluginEvent::Disabled(name.to_string()));
        }
        Ok(())
    }

    // == Dispatch ==
    /// Threads `args` through every enabled handler of `hook`, in registration order.
    ///
    /// Handler errors are logged and the arguments pass on unchanged.
    pub async fn execute_hook(&self, hook: &str, args: Vec<Value>) -> Vec<Value> {
        let handlers: Vec<HookEntry> = {
            let registry = self.registry.read().await;
            registry
                .hooks
                .get(hook)
                .map(|handlers| {
                    handlers
                        .iter()
                        .filter(|h| registry.is_enabled(&h.plugin))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut args = args;
        for entry in handlers {
            match (entry.handler)(args.clone()).await {
                Ok(Some(Value::Array(items))) => args = items,
                Ok(Some(value)) => args = vec![value],
                Ok(None) => {}
                Err(err) => {
                    error!(hook, plugin = %entry.plugin, error = %err, "Error in hook");
                }
            }
        }

        args
    }

    /// Runs the enabled middlewares registered for `event` around `endpoint`.
    pub async fn execute_middlewares<F, Fut>(
        &self,
        event: &str,
        ctx: &Value,
        endpoint: F,
    ) -> anyhow::Result<Value>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<Value>> + Send,
    {
        let chain: Vec<MiddlewareEntry> = {
            let registry = self.registry.read().await;
            registry
                .middlewares
                .get(event)
                .map(|chain| {
                    chain
                        .iter()
                        .filter(|m| registry.is_enabled(&m.plugin))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        let endpoint = || endpoint().boxed();
        run_chain(event, &chain, ctx, &endpoint).await
    }

    // == Introspection ==
    pub async fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.registry
            .read()
            .await
            .plugins
            .get(name)
            .map(|p| Arc::clone(&p.plugin))
    }

    pub async fn plugin_info(&self, name: &str) -> Option<PluginInfo> {
        self.registry.read().await.plugins.get(name).map(LoadedPlugin::info)
    }

    /// Every plugin, in load order.
    pub async fn all_plugins(&self) -> Vec<PluginInfo> {
        let registry = self.registry.read().await;
        registry
            .order
            .iter()
            .filter_map(|name| registry.plugins.get(name).map(LoadedPlugin::info))
            .collect()
    }

    pub async fn stats(&self) -> PluginStats {
        let registry = self.registry.read().await;
        PluginStats {
            total_plugins: registry.plugins.len(),
            enabled_plugins: registry.plugins.values().filter(|p| p.enabled).count(),
            total_hooks: registry.hooks.len(),
            total_middlewares: registry.middlewares.len(),
            load_order: registry.order.clone(),
        }
    }

    // == Destroy ==
    /// Unloads every plugin in reverse load order, then clears the registry.
    pub async fn destroy(&self) {
        let order: Vec<String> = self.registry.read().await.order.clone();

        for name in order.iter().rev() {
            if !self.unload(name).await {
                warn!(plugin = %name, "Plugin did not unload cleanly");
            }
        }

        let mut registry = self.registry.write().await;
        registry.plugins.clear();
        registry.order.clear();
        registry.hooks.clear();
        registry.middlewares.clear();
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager").finish_non_exhaustive()
    }
}
