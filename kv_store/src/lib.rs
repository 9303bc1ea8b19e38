//! Key-value store collaborator for the cache adapter
//!
//! This crate defines the bucket operations the adapter relies on
//! (`KvStore`), the faults they report, the bucket expiry convention,
//! and two implementations: a Redis-backed store and an in-memory one.

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

pub mod errors;
pub mod expiry;
pub mod memory;
pub mod prelude;
pub mod redis_store;
pub mod store;

pub use errors::StoreFault;
pub use expiry::{system_clock, Clock, Expiry, RELATIVE_EXPIRY_LIMIT};
pub use memory::{MemoryConnector, MemoryStore};
pub use redis_store::{RedisConnector, RedisStore};
pub use store::{BatchEntry, BatchResult, Cas, Document, KvStore, StoreConnector};
