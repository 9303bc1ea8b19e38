//! Convenience re-exports for common cache-system usage

// Core cache system components
pub use crate::adapter::{BucketCache, CasToken};
pub use crate::capabilities::Capabilities;
pub use crate::errors::CacheError;
pub use crate::manager::ResourceManager;

// Re-export centralized config
pub use config::{CacheOptions, ResourceConfig};

// Common external dependencies
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;
