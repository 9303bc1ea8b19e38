//! Error types for cache operations
//!
//! This module defines the errors the cache adapter reports. Missing keys
//! and write conflicts never show up here; they are answered with `None`
//! or `false` by the adapter.

use config::ConfigError;
use kv_store::StoreFault;
use thiserror::Error;

/// Cache system errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No resource with id '{0}'")]
    ResourceNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreFault),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CacheError {
    /// Map a connect failure, treating an unusable store as a configuration problem
    pub(crate) fn from_connect(fault: StoreFault) -> Self {
        match fault {
            StoreFault::Unsupported(reason) => CacheError::Configuration(reason),
            fault => CacheError::Store(fault),
        }
    }
}
