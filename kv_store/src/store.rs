//! The store collaborator interface
//!
//! `KvStore` is the minimal set of bucket operations the cache adapter
//! needs. Multi-key methods fall back to one request per key unless the
//! implementation overrides them; a transport fault on any of those
//! requests fails the whole batch.

use crate::errors::StoreFault;
use async_trait::async_trait;
use config::ResourceConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// Version marker of a stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cas(pub u64);

/// A stored value together with its current version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub value: Vec<u8>,
    pub cas: Cas,
}

/// Outcome for one key of a multi-key request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEntry<T> {
    Found(T),
    Absent,
    Errored(StoreFault),
}

impl<T> BatchEntry<T> {
    /// Classify a single-key result
    pub fn from_result(result: Result<T, StoreFault>) -> Self {
        match result {
            Ok(value) => BatchEntry::Found(value),
            Err(StoreFault::NotFound) => BatchEntry::Absent,
            Err(fault) => BatchEntry::Errored(fault),
        }
    }

    /// Classify a single-key result inside a looped multi-key request
    ///
    /// A transport fault means the store cannot be reached, so it fails
    /// the whole request instead of the one key.
    pub fn from_looped(result: Result<T, StoreFault>) -> Result<Self, StoreFault> {
        match result {
            Err(fault @ StoreFault::Transport(_)) => Err(fault),
            result => Ok(Self::from_result(result)),
        }
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, BatchEntry::Errored(_))
    }
}

/// Per-key outcomes keyed by store key
pub type BatchResult<T> = HashMap<String, BatchEntry<T>>;

/// Bucket operations against a key-value store
///
/// Expiry arguments follow the bucket convention described in
/// [`crate::expiry`].
#[async_trait]
pub trait KvStore: Send + Sync {
    /// A name for logs
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Document, StoreFault>;

    async fn get_multi(&self, keys: &[String]) -> Result<BatchResult<Document>, StoreFault> {
        let mut results = HashMap::with_capacity(keys.len());
        for key in keys {
            results.insert(key.clone(), BatchEntry::from_looped(self.get(key).await)?);
        }
        Ok(results)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreFault> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(StoreFault::NotFound) => Ok(false),
            Err(fault) => Err(fault),
        }
    }

    /// Write unconditionally
    async fn upsert(&self, key: &str, value: &[u8], expiry: u64) -> Result<Cas, StoreFault>;

    async fn upsert_multi(
        &self,
        items: &[(String, Vec<u8>)],
        expiry: u64,
    ) -> Result<BatchResult<Cas>, StoreFault> {
        let mut results = HashMap::with_capacity(items.len());
        for (key, value) in items {
            let result = self.upsert(key, value, expiry).await;
            results.insert(key.clone(), BatchEntry::from_looped(result)?);
        }
        Ok(results)
    }

    /// Write only if the key is absent
    async fn insert(&self, key: &str, value: &[u8], expiry: u64) -> Result<Cas, StoreFault>;

    async fn insert_multi(
        &self,
        items: &[(String, Vec<u8>)],
        expiry: u64,
    ) -> Result<BatchResult<Cas>, StoreFault> {
        let mut results = HashMap::with_capacity(items.len());
        for (key, value) in items {
            let result = self.insert(key, value, expiry).await;
            results.insert(key.clone(), BatchEntry::from_looped(result)?);
        }
        Ok(results)
    }

    /// Write only if the key exists and, when `cas` is given, still has
    /// that version
    async fn replace(
        &self,
        key: &str,
        value: &[u8],
        expiry: u64,
        cas: Option<Cas>,
    ) -> Result<Cas, StoreFault>;

    async fn remove(&self, key: &str) -> Result<(), StoreFault>;

    async fn remove_multi(&self, keys: &[String]) -> Result<BatchResult<()>, StoreFault> {
        let mut results = HashMap::with_capacity(keys.len());
        for key in keys {
            results.insert(key.clone(), BatchEntry::from_looped(self.remove(key).await)?);
        }
        Ok(results)
    }

    /// Reset the expiry of an existing key
    async fn touch(&self, key: &str, expiry: u64) -> Result<(), StoreFault>;

    /// Add `delta` to a decimal counter and return the new value
    ///
    /// A missing key is created from `initial` (returned as is, with
    /// `expiry` applied) or reported as `NotFound` when `initial` is `None`.
    async fn counter(
        &self,
        key: &str,
        delta: i64,
        initial: Option<i64>,
        expiry: u64,
    ) -> Result<i64, StoreFault>;

    /// Remove every key in the bucket
    async fn flush_all(&self) -> Result<(), StoreFault>;

    async fn ping(&self) -> Result<(), StoreFault> {
        Ok(())
    }
}

/// Builds a connected store from resource settings
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, config: &ResourceConfig) -> Result<Arc<dyn KvStore>, StoreFault>;
}
