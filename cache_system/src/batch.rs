//! Multi-key operations
//!
//! Reads omit every key the store could not deliver, whatever the reason.
//! Writes report the logical keys that failed; a key the store answered
//! with "absent" is not a failure, a key it did not answer for at all is.
//! Operations that loop over single-key requests stop at the first
//! transport fault and return it; other per-key faults only cost that key.

use crate::adapter::{decode, encode, negate, BucketCache};
use crate::errors::CacheError;
use crate::translator::KeyTranslator;
use kv_store::{BatchEntry, BatchResult, Document, StoreFault};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Drop repeated keys, keeping the first occurrence
fn unique(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

/// Logical keys of the write requests that did not succeed, sorted
pub(crate) fn failed_keys<T>(
    translator: &KeyTranslator,
    store_keys: &[String],
    mut results: BatchResult<T>,
) -> Vec<String> {
    let mut failed = Vec::new();

    for store_key in store_keys {
        match results.remove(store_key) {
            Some(BatchEntry::Found(_)) | Some(BatchEntry::Absent) => {}
            Some(BatchEntry::Errored(fault)) => {
                tracing::warn!("Batch write of '{}' failed: {}", store_key, fault);
                failed.push(translator.to_logical_key(store_key).to_string());
            }
            None => {
                tracing::warn!("Batch write of '{}' got no answer", store_key);
                failed.push(translator.to_logical_key(store_key).to_string());
            }
        }
    }

    failed.sort();
    failed
}

impl BucketCache {
    async fn fetch_many<K: AsRef<str>>(
        &self,
        keys: &[K],
    ) -> Result<Vec<(String, Document)>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let store_keys = unique(self.translator().to_store_keys(keys)?);
        let store = self.store().await?;

        let mut results = match store.get_multi(&store_keys).await {
            Ok(results) => results,
            Err(fault) => {
                tracing::warn!("Batch read of {} keys failed: {}", store_keys.len(), fault);
                return Ok(Vec::new());
            }
        };

        let mut found = Vec::with_capacity(store_keys.len());
        for store_key in &store_keys {
            match results.remove(store_key) {
                Some(BatchEntry::Found(document)) => {
                    let key = self.translator().to_logical_key(store_key).to_string();
                    found.push((key, document));
                }
                Some(BatchEntry::Errored(fault)) => {
                    tracing::warn!("Batch read of '{}' failed: {}", store_key, fault);
                }
                Some(BatchEntry::Absent) | None => {}
            }
        }
        Ok(found)
    }

    /// Values of the keys that could be read
    pub async fn get_items<T, K>(&self, keys: &[K]) -> Result<HashMap<String, T>, CacheError>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        let mut values = HashMap::new();
        for (key, document) in self.fetch_many(keys).await? {
            match decode(&document.value) {
                Ok(value) => {
                    values.insert(key, value);
                }
                Err(e) => tracing::warn!("Skipping undecodable value of '{}': {}", key, e),
            }
        }
        Ok(values)
    }

    /// Keys that exist, in request order
    pub async fn has_items<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<String>, CacheError> {
        Ok(self
            .fetch_many(keys)
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    fn encode_items<K, V, I>(&self, items: I) -> Result<Vec<(String, Vec<u8>)>, CacheError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        items
            .into_iter()
            .map(|(key, value)| {
                Ok((
                    self.translator().to_store_key(key.as_ref())?,
                    encode(&value)?,
                ))
            })
            .collect()
    }

    /// Write every item; returns the keys that failed
    pub async fn set_items<K, V, I>(&self, items: I, ttl: Option<u64>) -> Result<Vec<String>, CacheError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        let items = self.encode_items(items)?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let store = self.store().await?;
        let results = store.upsert_multi(&items, self.expiry(ttl)).await?;
        let store_keys = unique(items.into_iter().map(|(k, _)| k).collect());
        Ok(failed_keys(self.translator(), &store_keys, results))
    }

    /// Write every item whose key is absent; returns the keys that were not written
    pub async fn add_items<K, V, I>(&self, items: I, ttl: Option<u64>) -> Result<Vec<String>, CacheError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        let items = self.encode_items(items)?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let store = self.store().await?;
        let results = store.insert_multi(&items, self.expiry(ttl)).await?;
        let store_keys = unique(items.into_iter().map(|(k, _)| k).collect());
        Ok(failed_keys(self.translator(), &store_keys, results))
    }

    /// Delete every key; returns the keys that failed
    pub async fn remove_items<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<String>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let store_keys = unique(self.translator().to_store_keys(keys)?);
        let store = self.store().await?;
        let results = store.remove_multi(&store_keys).await?;
        Ok(failed_keys(self.translator(), &store_keys, results))
    }

    /// Replace every item; returns the keys that were not replaced
    pub async fn replace_items<K, V, I>(
        &self,
        items: I,
        ttl: Option<u64>,
    ) -> Result<Vec<String>, CacheError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        let items: Vec<(K, V)> = items.into_iter().collect();
        for (key, _) in &items {
            self.translator().to_store_key(key.as_ref())?;
        }

        let mut failed = Vec::new();
        for (key, value) in &items {
            if !self.replace_item(key.as_ref(), value, ttl).await? {
                failed.push(key.as_ref().to_string());
            }
        }
        failed.sort();
        failed.dedup();
        Ok(failed)
    }

    /// Reset the expiry of every key; returns the keys that were not touched
    pub async fn touch_items<K: AsRef<str>>(
        &self,
        keys: &[K],
        ttl: Option<u64>,
    ) -> Result<Vec<String>, CacheError> {
        self.translator().to_store_keys(keys)?;

        let mut failed = Vec::new();
        for key in keys {
            let touched = match self.touch_item(key.as_ref(), ttl).await {
                Ok(touched) => touched,
                Err(e @ CacheError::Store(StoreFault::Transport(_))) => return Err(e),
                Err(CacheError::Store(fault)) => {
                    tracing::warn!("Touch of '{}' failed: {}", key.as_ref(), fault);
                    false
                }
                Err(e) => return Err(e),
            };
            if !touched {
                failed.push(key.as_ref().to_string());
            }
        }
        failed.sort();
        failed.dedup();
        Ok(failed)
    }

    /// Add `delta` to every counter
    ///
    /// Keys whose update failed are left out of the result, except that a
    /// transport fault is returned as an error.
    pub async fn increment_items<K: AsRef<str>>(
        &self,
        keys: &[K],
        delta: i64,
    ) -> Result<HashMap<String, i64>, CacheError> {
        let store_keys = self.translator().to_store_keys(keys)?;
        if store_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let store = self.store().await?;
        let mut values = HashMap::with_capacity(store_keys.len());
        for (key, store_key) in keys.iter().zip(&store_keys) {
            match self.counter(store.as_ref(), store_key, delta, 0).await {
                Ok(value) => {
                    values.insert(key.as_ref().to_string(), value);
                }
                Err(e @ CacheError::Store(StoreFault::Transport(_))) => return Err(e),
                Err(e) => tracing::warn!("Increment of '{}' failed: {}", store_key, e),
            }
        }
        Ok(values)
    }

    pub async fn decrement_items<K: AsRef<str>>(
        &self,
        keys: &[K],
        delta: i64,
    ) -> Result<HashMap<String, i64>, CacheError> {
        self.increment_items(keys, negate(delta)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_keys() {
        let translator = KeyTranslator::new("app", ":").unwrap();
        let store_keys: Vec<String> = ["app:c", "app:a", "app:b", "app:d"]
            .iter()
            .map(|k| k.to_string())
            .collect();

        let mut results: BatchResult<()> = HashMap::new();
        results.insert("app:a".to_string(), BatchEntry::Found(()));
        results.insert("app:b".to_string(), BatchEntry::Absent);
        results.insert(
            "app:c".to_string(),
            BatchEntry::Errored(StoreFault::Transport("reset".to_string())),
        );

        assert_eq!(
            failed_keys(&translator, &store_keys, results),
            vec!["c".to_string(), "d".to_string()]
        );
    }

    #[test]
    fn test_unique_keeps_first() {
        let keys = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(unique(keys), vec!["b".to_string(), "a".to_string()]);
    }
}
