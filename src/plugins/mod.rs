//! Plugins Module
//!
//! Plugins are registered as values implementing [`Plugin`]. They contribute
//! named hooks, which transform argument lists in registration order, and
//! middlewares, which wrap event handling through an explicit [`Next`].

mod manager;
mod middleware;
mod plugin;

pub use manager::{PluginEvent, PluginInfo, PluginManager, PluginStats};
pub use middleware::{Endpoint, Middleware, Next};
pub use plugin::{hook, Hook, Plugin, PluginMetadata};
