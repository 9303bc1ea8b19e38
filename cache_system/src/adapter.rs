//! Bucket cache adapter
//!
//! `BucketCache` puts the generic cache contract (get, set, add, replace,
//! remove, check-and-set, touch, increment, flush) on top of a bucket store.
//! Missing keys and lost races are answered with `None` / `false`; only
//! faults that say something about the store itself become errors.

use crate::capabilities::Capabilities;
use crate::errors::CacheError;
use crate::manager::ResourceManager;
use crate::translator::{resolve_expiry, KeyTranslator};
use config::CacheOptions;
use kv_store::{system_clock, Cas, Clock, KvStore, StoreFault};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Token for optimistic writes with [`BucketCache::check_and_set_item`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasToken {
    /// Store version observed by a read
    Version(Cas),
    /// Serialized value the caller expects to find
    Snapshot(Vec<u8>),
}

impl CasToken {
    /// Token expecting the stored value to equal `value`
    pub fn snapshot<T: Serialize + ?Sized>(value: &T) -> Result<Self, CacheError> {
        Ok(CasToken::Snapshot(encode(value)?))
    }
}

impl From<Cas> for CasToken {
    fn from(cas: Cas) -> Self {
        CasToken::Version(cas)
    }
}

/// Store handle together with the resource generation it was taken at
struct Binding {
    generation: u64,
    store: Arc<dyn KvStore>,
}

/// Cache adapter over a bucket store
pub struct BucketCache {
    options: CacheOptions,
    translator: KeyTranslator,
    resources: Arc<ResourceManager>,
    binding: RwLock<Option<Binding>>,
    clock: Clock,
}

impl Debug for BucketCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bound = match self.binding.try_read() {
            Ok(binding) => binding.is_some(),
            Err(_) => false,
        };

        f.debug_struct("BucketCache")
            .field("options", &self.options)
            .field("bound", &bound)
            .finish()
    }
}

pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CacheError> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Not-found and conflict faults, which writes report as `false`
pub(crate) fn is_conflict(fault: &StoreFault) -> bool {
    matches!(
        fault,
        StoreFault::NotFound | StoreFault::AlreadyExists | StoreFault::CasMismatch
    )
}

impl BucketCache {
    /// Create an adapter using `options` against the shared `resources`
    pub fn new(options: CacheOptions, resources: Arc<ResourceManager>) -> Result<Self, CacheError> {
        let translator = KeyTranslator::new(&options.namespace, &options.namespace_separator)?;
        options.validate()?;

        Ok(Self {
            options,
            translator,
            resources,
            binding: RwLock::new(None),
            clock: system_clock(),
        })
    }

    /// Use `clock` as the current time for ttl resolution
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// A new adapter with other options, sharing resources and clock
    pub fn with_options(&self, options: CacheOptions) -> Result<Self, CacheError> {
        Ok(Self::new(options, self.resources.clone())?.with_clock(self.clock.clone()))
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_options(&self.options)
    }

    /// Replace all options; the store handle is rebuilt on next use
    pub fn set_options(&mut self, options: CacheOptions) -> Result<(), CacheError> {
        let translator = KeyTranslator::new(&options.namespace, &options.namespace_separator)?;
        options.validate()?;

        self.options = options;
        self.translator = translator;
        *self.binding.get_mut() = None;
        Ok(())
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) -> Result<(), CacheError> {
        let mut options = self.options.clone();
        options.namespace = namespace.into();
        self.set_options(options)
    }

    pub fn set_namespace_separator(&mut self, separator: impl Into<String>) -> Result<(), CacheError> {
        let mut options = self.options.clone();
        options.namespace_separator = separator.into();
        self.set_options(options)
    }

    pub fn set_resource_id(&mut self, resource_id: impl Into<String>) -> Result<(), CacheError> {
        let mut options = self.options.clone();
        options.resource_id = resource_id.into();
        self.set_options(options)
    }

    /// Default ttl for writes; does not touch the store handle
    pub fn set_ttl(&mut self, ttl: u64) {
        self.options.ttl = ttl;
    }

    /// Drop the cached store handle; the next operation binds again
    pub async fn rebuild(&self) {
        *self.binding.write().await = None;
    }

    /// Whether a store handle is currently cached
    pub async fn is_bound(&self) -> bool {
        self.binding.read().await.is_some()
    }

    /// Store handle for the configured resource, rebound after resource changes
    pub(crate) async fn store(&self) -> Result<Arc<dyn KvStore>, CacheError> {
        let generation = self.resources.generation();
        {
            let binding = self.binding.read().await;
            if let Some(binding) = binding.as_ref() {
                if binding.generation == generation {
                    return Ok(binding.store.clone());
                }
            }
        }

        let store = self.resources.get_resource(&self.options.resource_id).await?;
        debug_log!(
            "Binding cache '{}' to resource '{}' at generation {}",
            self.options.namespace,
            self.options.resource_id,
            generation
        );

        let mut binding = self.binding.write().await;
        *binding = Some(Binding {
            generation,
            store: store.clone(),
        });
        Ok(store)
    }

    pub(crate) fn translator(&self) -> &KeyTranslator {
        &self.translator
    }

    /// Store expiry for a per-call ttl, falling back to the configured one
    pub(crate) fn expiry(&self, ttl: Option<u64>) -> u64 {
        resolve_expiry(ttl.unwrap_or(self.options.ttl), (self.clock)())
    }

    pub async fn get_item<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        Ok(self.get_item_with_cas(key).await?.map(|(value, _)| value))
    }

    /// Read a value together with a token for [`Self::check_and_set_item`]
    pub async fn get_item_with_cas<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<(T, CasToken)>, CacheError> {
        let store_key = self.translator.to_store_key(key)?;
        let store = self.store().await?;

        match store.get(&store_key).await {
            Ok(document) => {
                trace_log!("Cache hit for '{}'", store_key);
                let value = decode(&document.value)?;
                Ok(Some((value, CasToken::Version(document.cas))))
            }
            Err(StoreFault::NotFound) => {
                trace_log!("Cache miss for '{}'", store_key);
                Ok(None)
            }
            Err(fault) => Err(fault.into()),
        }
    }

    pub async fn has_item(&self, key: &str) -> Result<bool, CacheError> {
        let store_key = self.translator.to_store_key(key)?;
        let store = self.store().await?;

        match store.exists(&store_key).await {
            Ok(found) => Ok(found),
            Err(StoreFault::NotFound) => Ok(false),
            Err(fault) => Err(fault.into()),
        }
    }

    /// Write a value whether or not the key exists
    pub async fn set_item<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
    ) -> Result<bool, CacheError> {
        let store_key = self.translator.to_store_key(key)?;
        let bytes = encode(value)?;
        let store = self.store().await?;

        match store.upsert(&store_key, &bytes, self.expiry(ttl)).await {
            Ok(_) => Ok(true),
            Err(StoreFault::NotFound) => Ok(false),
            Err(fault) => Err(fault.into()),
        }
    }

    /// Write a value only if the key is absent
    pub async fn add_item<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
    ) -> Result<bool, CacheError> {
        let store_key = self.translator.to_store_key(key)?;
        let bytes = encode(value)?;
        let store = self.store().await?;

        match store.insert(&store_key, &bytes, self.expiry(ttl)).await {
            Ok(_) => Ok(true),
            Err(StoreFault::AlreadyExists) => Ok(false),
            Err(fault) => Err(fault.into()),
        }
    }

    /// Overwrite an existing key; every store fault reads as `false`
    pub async fn replace_item<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
    ) -> Result<bool, CacheError> {
        let store_key = self.translator.to_store_key(key)?;
        let bytes = encode(value)?;
        let store = self.store().await?;

        match store.replace(&store_key, &bytes, self.expiry(ttl), None).await {
            Ok(_) => Ok(true),
            Err(StoreFault::NotFound) => Ok(false),
            Err(fault) => {
                tracing::warn!("Replace of '{}' failed: {}", store_key, fault);
                Ok(false)
            }
        }
    }

    /// Delete a key; every store fault reads as `false`
    pub async fn remove_item(&self, key: &str) -> Result<bool, CacheError> {
        let store_key = self.translator.to_store_key(key)?;
        let store = self.store().await?;

        match store.remove(&store_key).await {
            Ok(()) => Ok(true),
            Err(StoreFault::NotFound) => Ok(false),
            Err(fault) => {
                tracing::warn!("Remove of '{}' failed: {}", store_key, fault);
                Ok(false)
            }
        }
    }

    /// Write only if the stored value still matches `token`
    pub async fn check_and_set_item<T: Serialize + ?Sized>(
        &self,
        token: &CasToken,
        key: &str,
        value: &T,
        ttl: Option<u64>,
    ) -> Result<bool, CacheError> {
        let store_key = self.translator.to_store_key(key)?;
        let bytes = encode(value)?;
        let store = self.store().await?;

        let cas = match token {
            CasToken::Version(cas) => *cas,
            CasToken::Snapshot(expected) => match store.get(&store_key).await {
                Ok(document) if document.value == *expected => document.cas,
                Ok(_) => return Ok(false),
                Err(fault) if is_conflict(&fault) => return Ok(false),
                Err(fault) => return Err(fault.into()),
            },
        };

        match store
            .replace(&store_key, &bytes, self.expiry(ttl), Some(cas))
            .await
        {
            Ok(_) => Ok(true),
            Err(fault) if is_conflict(&fault) => {
                debug_log!("Check-and-set of '{}' lost: {}", store_key, fault);
                Ok(false)
            }
            Err(fault) => Err(fault.into()),
        }
    }

    /// Reset the expiry of an existing key
    pub async fn touch_item(&self, key: &str, ttl: Option<u64>) -> Result<bool, CacheError> {
        let store_key = self.translator.to_store_key(key)?;
        let store = self.store().await?;

        match store.touch(&store_key, self.expiry(ttl)).await {
            Ok(()) => Ok(true),
            Err(fault) if is_conflict(&fault) => Ok(false),
            Err(fault) => Err(fault.into()),
        }
    }

    /// Add `delta` to a counter, starting absent counters at 0
    pub async fn increment_item(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.increment_item_with_initial(key, delta, 0).await
    }

    /// Add `delta` to a counter, seeding an absent counter with `initial`
    pub async fn increment_item_with_initial(
        &self,
        key: &str,
        delta: i64,
        initial: i64,
    ) -> Result<i64, CacheError> {
        let store_key = self.translator.to_store_key(key)?;
        let store = self.store().await?;
        self.counter(store.as_ref(), &store_key, delta, initial).await
    }

    pub async fn decrement_item(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.increment_item(key, negate(delta)?).await
    }

    pub(crate) async fn counter(
        &self,
        store: &dyn KvStore,
        store_key: &str,
        delta: i64,
        initial: i64,
    ) -> Result<i64, CacheError> {
        let expiry = self.expiry(None);

        match store.counter(store_key, delta, None, expiry).await {
            Ok(value) => return Ok(value),
            Err(StoreFault::NotFound) => {}
            Err(fault) => return Err(fault.into()),
        }

        // Seed the counter; a concurrent seed is as good as ours
        match store.insert(store_key, &encode(&initial)?, expiry).await {
            Ok(_) | Err(StoreFault::AlreadyExists) => {}
            Err(fault) => return Err(fault.into()),
        }

        Ok(store.counter(store_key, delta, None, expiry).await?)
    }

    /// Remove every key in the bucket, not only this namespace
    pub async fn flush(&self) -> Result<bool, CacheError> {
        let store = self.store().await?;
        store.flush_all().await?;
        tracing::debug!("Flushed resource '{}'", self.options.resource_id);
        Ok(true)
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let store = self.store().await?;
        Ok(store.ping().await?)
    }
}

pub(crate) fn negate(delta: i64) -> Result<i64, CacheError> {
    delta
        .checked_neg()
        .ok_or_else(|| CacheError::InvalidArgument(format!("Cannot decrement by {}", delta)))
}
