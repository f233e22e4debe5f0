//! Plugin capability trait and metadata.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;

use super::Middleware;
use crate::error::{Error, Result};

/// Hook handler: receives the current argument list and may replace it.
///
/// `Ok(None)` keeps the arguments; `Ok(Some(array))` replaces them with the
/// array's items; any other value becomes a single argument.
pub type Hook =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Option<Value>>> + Send + Sync>;

/// Wraps an async closure as a [`Hook`].
pub fn hook<F, Fut>(handler: F) -> Hook
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
{
    Arc::new(move |args| handler(args).boxed())
}

// == Plugin Metadata ==
/// Descriptive fields every plugin provides.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: Option<String>,
    /// Plugins that must be registered first
    pub dependencies: Vec<String>,
}

impl PluginMetadata {
    pub fn new(name: &str, version: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            description: description.to_string(),
            author: None,
            dependencies: Vec::new(),
        }
    }

    pub fn author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    pub fn depends_on(mut self, plugin: &str) -> Self {
        self.dependencies.push(plugin.to_string());
        self
    }

    /// Rejects metadata with an empty name, version or description.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("version", &self.version),
            ("description", &self.description),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::InvalidPlugin(format!(
                    "missing required field: {field}"
                )));
            }
        }

        Ok(())
    }
}

// == Plugin Trait ==
/// Capability interface implemented by every plugin.
///
/// Lifecycle methods default to no-ops. Hooks and middlewares are collected
/// once, when the plugin is registered.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> PluginMetadata;

    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn enable(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn disable(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Named hook handlers, run in registration order.
    fn hooks(&self) -> Vec<(String, Hook)> {
        Vec::new()
    }

    /// Middlewares keyed by event name.
    fn middlewares(&self) -> Vec<(String, Arc<dyn Middleware>)> {
        Vec::new()
    }
}
