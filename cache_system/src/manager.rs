//! Resource manager implementation
//!
//! This module provides the ResourceManager, the registry of named
//! connection resources shared by cache adapters. Resources connect
//! lazily on first use; changing a resource's settings drops its
//! connection and bumps a generation counter so adapters rebind.

use crate::errors::CacheError;
use config::{dedup_servers, AppConfig, ResourceConfig, ServerAddress};
use kv_store::{KvStore, RedisConnector, StoreConnector};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Resource {
    config: Option<ResourceConfig>,
    store: Option<Arc<dyn KvStore>>,
}

/// Registry of named store connections
pub struct ResourceManager {
    resources: RwLock<HashMap<String, Resource>>,
    generation: AtomicU64,
    connector: Arc<dyn StoreConnector>,
}

impl Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resources = match self.resources.try_read() {
            Ok(resources) => resources
                .iter()
                .map(|(id, r)| {
                    let status = if r.store.is_some() {
                        "connected"
                    } else {
                        "no_connection"
                    };
                    (id.clone(), status)
                })
                .collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };

        f.debug_struct("ResourceManager")
            .field("resources", &resources)
            .field("generation", &self.generation())
            .finish()
    }
}

impl ResourceManager {
    /// Create an empty manager connecting through Redis
    pub fn new() -> Self {
        Self::with_connector(Arc::new(RedisConnector))
    }

    pub fn with_connector(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            connector,
        }
    }

    /// Create a manager holding every resource of `config`
    pub fn from_config(
        config: &AppConfig,
        connector: Arc<dyn StoreConnector>,
    ) -> Result<Self, CacheError> {
        let mut resources = HashMap::with_capacity(config.resources.len());
        for (id, resource) in &config.resources {
            resource.validate()?;
            resources.insert(
                id.clone(),
                Resource {
                    config: Some(resource.clone()),
                    store: None,
                },
            );
        }

        Ok(Self {
            resources: RwLock::new(resources),
            generation: AtomicU64::new(0),
            connector,
        })
    }

    /// Counter bumped by every change to any resource
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub async fn has_resource(&self, id: &str) -> bool {
        self.resources.read().await.contains_key(id)
    }

    /// Register connection settings, replacing any previous resource
    pub async fn set_resource(&self, id: &str, config: ResourceConfig) -> Result<(), CacheError> {
        config.validate()?;
        let mut resources = self.resources.write().await;
        resources.insert(
            id.to_string(),
            Resource {
                config: Some(config),
                store: None,
            },
        );
        self.bump();
        Ok(())
    }

    /// Register an already connected store
    pub async fn set_store(&self, id: &str, store: Arc<dyn KvStore>) {
        let mut resources = self.resources.write().await;
        resources.insert(
            id.to_string(),
            Resource {
                config: None,
                store: Some(store),
            },
        );
        self.bump();
    }

    pub async fn remove_resource(&self, id: &str) -> bool {
        let removed = self.resources.write().await.remove(id).is_some();
        if removed {
            self.bump();
        }
        removed
    }

    /// Get the store of a resource, connecting it on first use
    pub async fn get_resource(&self, id: &str) -> Result<Arc<dyn KvStore>, CacheError> {
        {
            let resources = self.resources.read().await;
            let resource = resources
                .get(id)
                .ok_or_else(|| CacheError::ResourceNotFound(id.to_string()))?;
            if let Some(store) = &resource.store {
                return Ok(store.clone());
            }
        }

        let mut resources = self.resources.write().await;
        let resource = resources
            .get_mut(id)
            .ok_or_else(|| CacheError::ResourceNotFound(id.to_string()))?;

        // Another caller may have connected while we waited for the lock
        if let Some(store) = &resource.store {
            return Ok(store.clone());
        }

        let config = resource.config.clone().ok_or_else(|| {
            CacheError::Configuration(format!("Resource '{}' has no connection settings", id))
        })?;
        let store = self
            .connector
            .connect(&config)
            .await
            .map_err(CacheError::from_connect)?;
        tracing::debug!("Connected resource '{}' ({})", id, store.name());

        resource.store = Some(store.clone());
        Ok(store)
    }

    /// Connection settings of a resource, `None` for registered stores
    pub async fn resource_config(&self, id: &str) -> Result<Option<ResourceConfig>, CacheError> {
        let resources = self.resources.read().await;
        resources
            .get(id)
            .map(|r| r.config.clone())
            .ok_or_else(|| CacheError::ResourceNotFound(id.to_string()))
    }

    /// Apply `change` to a resource's settings, creating the resource when missing
    async fn update<F>(&self, id: &str, change: F) -> Result<(), CacheError>
    where
        F: FnOnce(&mut ResourceConfig),
    {
        let mut resources = self.resources.write().await;
        let mut config = resources
            .get(id)
            .and_then(|r| r.config.clone())
            .unwrap_or_default();
        change(&mut config);
        config.validate()?;

        let resource = resources.entry(id.to_string()).or_default();
        resource.config = Some(config);
        resource.store = None;
        self.bump();
        Ok(())
    }

    /// Replace the server list, given as a comma separated string
    pub async fn set_servers(&self, id: &str, servers: &str) -> Result<(), CacheError> {
        let servers = ServerAddress::parse_list(servers)?;
        self.update(id, |config| config.servers = servers).await
    }

    /// Append servers not already present
    pub async fn add_servers(&self, id: &str, servers: &str) -> Result<(), CacheError> {
        let added = ServerAddress::parse_list(servers)?;
        self.update(id, |config| {
            let mut servers = std::mem::take(&mut config.servers);
            servers.extend(added);
            config.servers = dedup_servers(servers);
        })
        .await
    }

    pub async fn set_username(&self, id: &str, username: &str) -> Result<(), CacheError> {
        self.update(id, |config| config.username = username.to_string())
            .await
    }

    pub async fn set_password(&self, id: &str, password: &str) -> Result<(), CacheError> {
        self.update(id, |config| config.password = password.to_string())
            .await
    }

    pub async fn set_bucket(&self, id: &str, bucket: &str) -> Result<(), CacheError> {
        self.update(id, |config| config.bucket = bucket.to_string())
            .await
    }

    pub async fn servers(&self, id: &str) -> Result<Vec<ServerAddress>, CacheError> {
        Ok(self.settings(id).await?.servers)
    }

    pub async fn username(&self, id: &str) -> Result<String, CacheError> {
        Ok(self.settings(id).await?.username)
    }

    pub async fn bucket(&self, id: &str) -> Result<String, CacheError> {
        Ok(self.settings(id).await?.bucket)
    }

    async fn settings(&self, id: &str) -> Result<ResourceConfig, CacheError> {
        self.resource_config(id).await?.ok_or_else(|| {
            CacheError::Configuration(format!("Resource '{}' has no connection settings", id))
        })
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}
