//! Convenience re-exports for common kv-store usage

pub use crate::errors::StoreFault;
pub use crate::expiry::{Clock, Expiry, RELATIVE_EXPIRY_LIMIT};
pub use crate::memory::{MemoryConnector, MemoryStore};
pub use crate::redis_store::{RedisConnector, RedisStore};
pub use crate::store::{BatchEntry, BatchResult, Cas, Document, KvStore, StoreConnector};

// Common external dependencies
pub use async_trait::async_trait;
pub use redis;
