//! Convenience re-exports for common bucketcache usage
//!
//! # Example
//!
//! ```rust
//! use bucketcache::prelude::*;
//!
//! // Now you have access to the hub, the cache adapter and the stores
//! ```

// Core components
pub use crate::core::{CacheHub, DEFAULT_CACHE};
pub use crate::errors::BucketCacheError;

// Re-export centralized config
pub use config::{AppConfig, CacheOptions, ResourceConfig, ServerAddress};

// Re-export cache system
pub use cache_system::prelude::*;

// Store collaborator
pub use kv_store::{KvStore, MemoryConnector, MemoryStore, RedisConnector, StoreConnector, StoreFault};
