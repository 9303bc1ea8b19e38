//! Cache system on top of a bucket store
//!
//! This crate provides the `BucketCache` adapter with namespacing, ttl
//! resolution and per-item batch reconciliation, plus the shared
//! `ResourceManager` that owns store connections.

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod adapter;
pub mod batch;
pub mod capabilities;
pub mod errors;
pub mod manager;
pub mod prelude;
pub mod translator;

pub use adapter::{BucketCache, CasToken};
pub use capabilities::Capabilities;
pub use errors::CacheError;
pub use manager::ResourceManager;
pub use translator::KeyTranslator;

// Re-export centralized config
pub use config::{CacheOptions, ResourceConfig};
