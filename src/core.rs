//! Core BucketCache hub
//!
//! This module contains the CacheHub, which owns one shared resource
//! manager and any number of named cache adapters built on top of it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::BucketCacheError;
use cache_system::{BucketCache, ResourceManager};
use config::{AppConfig, CacheOptions, ConfigError};
use kv_store::{RedisConnector, StoreConnector};

/// Name of the cache built from the `[cache]` section of a config file
pub const DEFAULT_CACHE: &str = "default";

/// Named caches sharing one set of store connections
pub struct CacheHub {
    resources: Arc<ResourceManager>,
    caches: HashMap<String, BucketCache>,
}

impl CacheHub {
    /// Create an empty hub over `resources`
    pub fn new(resources: Arc<ResourceManager>) -> Self {
        Self {
            resources,
            caches: HashMap::new(),
        }
    }

    /// Build resources and the default cache from configuration, connecting through Redis
    pub fn from_config(config: &AppConfig) -> Result<Self, BucketCacheError> {
        Self::from_config_with_connector(config, Arc::new(RedisConnector))
    }

    pub fn from_config_with_connector(
        config: &AppConfig,
        connector: Arc<dyn StoreConnector>,
    ) -> Result<Self, BucketCacheError> {
        config.validate()?;
        if !config.resources.contains_key(&config.cache.resource_id) {
            return Err(ConfigError::Invalid(format!(
                "Default cache uses unknown resource '{}'",
                config.cache.resource_id
            ))
            .into());
        }
        let resources = ResourceManager::from_config(config, connector)?;

        let mut hub = Self::new(Arc::new(resources));
        hub.register_cache(DEFAULT_CACHE.to_string(), config.cache.clone())?;
        Ok(hub)
    }

    /// Load configuration the usual way (see [`AppConfig::load`]) and build from it
    pub fn load() -> Result<Self, BucketCacheError> {
        let config = AppConfig::load()?;
        Self::from_config(&config)
    }

    /// Shared resource manager
    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    /// Register a cache adapter with a given name
    pub fn register_cache(
        &mut self,
        name: String,
        options: CacheOptions,
    ) -> Result<(), BucketCacheError> {
        if self.caches.contains_key(&name) {
            return Err(BucketCacheError::CacheAlreadyRegistered(name));
        }

        let cache = BucketCache::new(options, self.resources.clone())?;
        debug_log!("Registered cache '{}' ({:?})", name, cache.options());
        self.caches.insert(name, cache);
        Ok(())
    }

    /// Get a registered cache by name
    pub fn get_cache(&self, name: &str) -> Result<&BucketCache, BucketCacheError> {
        self.caches
            .get(name)
            .ok_or_else(|| BucketCacheError::CacheNotFound(name.to_string()))
    }

    /// Get a mutable reference to a registered cache, e.g. to change its options
    pub fn get_cache_mut(&mut self, name: &str) -> Result<&mut BucketCache, BucketCacheError> {
        self.caches
            .get_mut(name)
            .ok_or_else(|| BucketCacheError::CacheNotFound(name.to_string()))
    }

    /// List all registered cache names
    pub fn list_caches(&self) -> Vec<&String> {
        self.caches.keys().collect()
    }

    /// Remove a cache by name
    pub fn unregister_cache(&mut self, name: &str) -> Result<(), BucketCacheError> {
        self.caches
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BucketCacheError::CacheNotFound(name.to_string()))
    }

    /// Ping the store behind every registered cache
    pub async fn health_check(&self) -> Result<(), BucketCacheError> {
        for (name, cache) in &self.caches {
            cache.ping().await.map_err(|e| {
                tracing::warn!("Health check of cache '{}' failed: {}", name, e);
                e
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CacheHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHub")
            .field("resources", &self.resources)
            .field("caches", &self.list_caches())
            .finish()
    }
}
