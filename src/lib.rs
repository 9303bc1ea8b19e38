//! # bucketcache
//!
//! A cache adapter that puts a generic cache contract (get / set / add /
//! replace / remove / check-and-set / touch / increment / flush, with
//! namespacing and ttls) on top of a key-value bucket store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bucketcache::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resources = Arc::new(ResourceManager::new());
//!     resources.set_servers("default", "localhost:6379").await?;
//!
//!     let cache = BucketCache::new(CacheOptions::new("app").with_ttl(300), resources)?;
//!
//!     cache.set_item("greeting", "hello", None).await?;
//!     let greeting: Option<String> = cache.get_item("greeting").await?;
//!     println!("{:?}", greeting);
//!
//!     let visits = cache.increment_item("visits", 1).await?;
//!     println!("visits: {}", visits);
//!
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod core;
pub mod errors;
pub mod prelude;

// Re-export the main public types for convenience
pub use core::{CacheHub, DEFAULT_CACHE};
pub use errors::BucketCacheError;

// Re-export centralized config
pub use config::{AppConfig, CacheOptions, ResourceConfig};

// Re-export internal crates
pub use cache_system;
pub use kv_store;

// Re-export external dependencies used in public API
pub use async_trait;
