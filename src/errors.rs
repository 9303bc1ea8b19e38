//! Error types for the bucketcache crate
//!
//! This module contains all error types that can be returned by CacheHub operations.

use cache_system::CacheError;
use config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BucketCacheError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Cache not found: {0}")]
    CacheNotFound(String),

    #[error("Cache already registered: {0}")]
    CacheAlreadyRegistered(String),
}
