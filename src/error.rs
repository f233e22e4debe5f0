//! Error types for the bot runtime
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

use crate::ratelimit::RateLimitInfo;

// == Error Enum ==
/// Unified error type for the bot runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// Identifier exhausted its quota for the current window
    #[error("Rate limit exceeded for {key}: retry in {}ms", .info.time_to_reset.as_millis())]
    RateLimitExceeded { key: String, info: RateLimitInfo },

    /// No limiter registered under this name
    #[error("Rate limiter '{0}' not found")]
    LimiterNotFound(String),

    /// Plugin metadata failed validation
    #[error("Invalid plugin: {0}")]
    InvalidPlugin(String),

    /// A plugin with the same name is already registered
    #[error("Plugin already loaded: {0}")]
    DuplicatePlugin(String),

    /// Plugin depends on a plugin that is not registered
    #[error("Plugin {plugin} depends on {dependency}, which is not loaded")]
    MissingDependency { plugin: String, dependency: String },

    /// No plugin registered under this name
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// Failure raised by plugin code
    #[error("Plugin {plugin} failed: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },

    /// Metrics source could not produce a sample
    #[error("Metrics collection failed: {0}")]
    Metrics(String),
}

impl Error {
    /// Returns true for errors the caller is expected to recover from.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimitExceeded { .. })
    }
}

// == Result Type Alias ==
/// Convenience Result type for the bot runtime.
pub type Result<T> = std::result::Result<T, Error>;
