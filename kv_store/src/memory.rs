//! In-process store
//!
//! Keeps documents in a map guarded by a tokio `RwLock`. Expired entries
//! are treated as absent and dropped on the next write to the same key.

use crate::errors::StoreFault;
use crate::expiry::{system_clock, Clock, Expiry};
use crate::store::{Cas, Document, KvStore, StoreConnector};
use async_trait::async_trait;
use config::ResourceConfig;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    cas: Cas,
    expires_at: Option<u64>,
}

impl Entry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    next_cas: AtomicU64,
    clock: Clock,
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entry_count = self.entries.try_read().map(|e| e.len()).ok();
        f.debug_struct("MemoryStore")
            .field("entries", &entry_count)
            .field("next_cas", &self.next_cas.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create a store that reads the time from `clock`
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_cas: AtomicU64::new(1),
            clock,
        }
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = (self.clock)();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn bump_cas(&self) -> Cas {
        Cas(self.next_cas.fetch_add(1, Ordering::Relaxed))
    }

    fn deadline(&self, expiry: u64, now: u64) -> Option<u64> {
        Expiry::from_store_value(expiry).deadline(now)
    }

    fn store(
        &self,
        entries: &mut HashMap<String, Entry>,
        key: &str,
        value: &[u8],
        expires_at: Option<u64>,
    ) -> Cas {
        let cas = self.bump_cas();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                cas,
                expires_at,
            },
        );
        cas
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn live<'a>(entries: &'a HashMap<String, Entry>, key: &str, now: u64) -> Option<&'a Entry> {
    entries.get(key).filter(|e| e.is_live(now))
}

fn parse_counter(value: &[u8]) -> Result<i64, StoreFault> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| StoreFault::Server("Stored value is not a counter".to_string()))
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Document, StoreFault> {
        let now = (self.clock)();
        let entries = self.entries.read().await;
        live(&entries, key, now)
            .map(|e| Document {
                value: e.value.clone(),
                cas: e.cas,
            })
            .ok_or(StoreFault::NotFound)
    }

    async fn upsert(&self, key: &str, value: &[u8], expiry: u64) -> Result<Cas, StoreFault> {
        let now = (self.clock)();
        let mut entries = self.entries.write().await;
        Ok(self.store(&mut entries, key, value, self.deadline(expiry, now)))
    }

    async fn insert(&self, key: &str, value: &[u8], expiry: u64) -> Result<Cas, StoreFault> {
        let now = (self.clock)();
        let mut entries = self.entries.write().await;
        if live(&entries, key, now).is_some() {
            return Err(StoreFault::AlreadyExists);
        }
        Ok(self.store(&mut entries, key, value, self.deadline(expiry, now)))
    }

    async fn replace(
        &self,
        key: &str,
        value: &[u8],
        expiry: u64,
        cas: Option<Cas>,
    ) -> Result<Cas, StoreFault> {
        let now = (self.clock)();
        let mut entries = self.entries.write().await;
        let current = live(&entries, key, now).ok_or(StoreFault::NotFound)?;
        if cas.is_some_and(|expected| expected != current.cas) {
            return Err(StoreFault::CasMismatch);
        }
        Ok(self.store(&mut entries, key, value, self.deadline(expiry, now)))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreFault> {
        let now = (self.clock)();
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(entry) if entry.is_live(now) => Ok(()),
            _ => Err(StoreFault::NotFound),
        }
    }

    async fn touch(&self, key: &str, expiry: u64) -> Result<(), StoreFault> {
        let now = (self.clock)();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = self.deadline(expiry, now);
                Ok(())
            }
            _ => Err(StoreFault::NotFound),
        }
    }

    async fn counter(
        &self,
        key: &str,
        delta: i64,
        initial: Option<i64>,
        expiry: u64,
    ) -> Result<i64, StoreFault> {
        let now = (self.clock)();
        let mut entries = self.entries.write().await;

        let Some(current) = live(&entries, key, now) else {
            let initial = initial.ok_or(StoreFault::NotFound)?;
            trace_log!("Creating counter '{}' at {}", key, initial);
            self.store(
                &mut entries,
                key,
                initial.to_string().as_bytes(),
                self.deadline(expiry, now),
            );
            return Ok(initial);
        };

        let value = parse_counter(&current.value)?
            .checked_add(delta)
            .ok_or_else(|| StoreFault::Server("Counter overflow".to_string()))?;
        let expires_at = current.expires_at;
        self.store(&mut entries, key, value.to_string().as_bytes(), expires_at);
        Ok(value)
    }

    async fn flush_all(&self) -> Result<(), StoreFault> {
        let mut entries = self.entries.write().await;
        debug_log!("Flushing {} in-process entries", entries.len());
        entries.clear();
        Ok(())
    }
}

/// Hands out one fresh `MemoryStore` per connect call
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryConnector;

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, _config: &ResourceConfig) -> Result<Arc<dyn KvStore>, StoreFault> {
        Ok(Arc::new(MemoryStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BatchEntry;

    fn manual_clock(start: u64) -> (Arc<AtomicU64>, Clock) {
        let now = Arc::new(AtomicU64::new(start));
        let handle = now.clone();
        (now, Arc::new(move || handle.load(Ordering::SeqCst)))
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = MemoryStore::new();
        let first = store.upsert("k", b"1", 0).await.unwrap();
        let second = store.upsert("k", b"2", 0).await.unwrap();
        assert!(second > first);

        let doc = store.get("k").await.unwrap();
        assert_eq!(doc.value, b"2");
        assert_eq!(doc.cas, second);
        assert_eq!(store.get("missing").await, Err(StoreFault::NotFound));
    }

    #[tokio::test]
    async fn test_insert_conflict() {
        let store = MemoryStore::new();
        store.insert("k", b"1", 0).await.unwrap();
        assert_eq!(
            store.insert("k", b"2", 0).await,
            Err(StoreFault::AlreadyExists)
        );
        assert_eq!(store.get("k").await.unwrap().value, b"1");
    }

    #[tokio::test]
    async fn test_replace_checks_cas() {
        let store = MemoryStore::new();
        assert_eq!(
            store.replace("k", b"1", 0, None).await,
            Err(StoreFault::NotFound)
        );

        let cas = store.upsert("k", b"1", 0).await.unwrap();
        let next = store.replace("k", b"2", 0, Some(cas)).await.unwrap();
        assert_eq!(
            store.replace("k", b"3", 0, Some(cas)).await,
            Err(StoreFault::CasMismatch)
        );
        store.replace("k", b"4", 0, Some(next)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().value, b"4");
    }

    #[tokio::test]
    async fn test_counter() {
        let store = MemoryStore::new();
        assert_eq!(store.counter("c", 1, None, 0).await, Err(StoreFault::NotFound));
        assert_eq!(store.counter("c", 1, Some(5), 0).await, Ok(5));
        assert_eq!(store.counter("c", 2, Some(5), 0).await, Ok(7));
        assert_eq!(store.counter("c", -10, None, 0).await, Ok(-3));

        store.upsert("text", b"\"abc\"", 0).await.unwrap();
        assert!(matches!(
            store.counter("text", 1, None, 0).await,
            Err(StoreFault::Server(_))
        ));
    }

    #[tokio::test]
    async fn test_relative_and_absolute_expiry() {
        let (now, clock) = manual_clock(1_000);
        let store = MemoryStore::with_clock(clock);

        store.upsert("relative", b"1", 10).await.unwrap();
        store.upsert("absolute", b"1", 5_000_000).await.unwrap();
        store.upsert("forever", b"1", 0).await.unwrap();

        now.store(1_009, Ordering::SeqCst);
        assert!(store.get("relative").await.is_ok());

        now.store(1_010, Ordering::SeqCst);
        assert_eq!(store.get("relative").await, Err(StoreFault::NotFound));
        assert!(store.get("absolute").await.is_ok());

        now.store(5_000_000, Ordering::SeqCst);
        assert_eq!(store.get("absolute").await, Err(StoreFault::NotFound));
        assert!(store.get("forever").await.is_ok());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_key_can_be_inserted() {
        let (now, clock) = manual_clock(100);
        let store = MemoryStore::with_clock(clock);
        store.insert("k", b"1", 1).await.unwrap();

        now.store(101, Ordering::SeqCst);
        store.insert("k", b"2", 0).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().value, b"2");
    }

    #[tokio::test]
    async fn test_touch() {
        let (now, clock) = manual_clock(100);
        let store = MemoryStore::with_clock(clock);
        store.upsert("k", b"1", 1).await.unwrap();
        store.touch("k", 50).await.unwrap();

        now.store(120, Ordering::SeqCst);
        assert!(store.get("k").await.is_ok());
        assert_eq!(store.touch("missing", 1).await, Err(StoreFault::NotFound));
    }

    #[tokio::test]
    async fn test_default_multi_methods() {
        let store = MemoryStore::new();
        store.upsert("a", b"1", 0).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string()];
        let found = store.get_multi(&keys).await.unwrap();
        assert!(matches!(found["a"], BatchEntry::Found(_)));
        assert_eq!(found["b"], BatchEntry::Absent);

        let removed = store.remove_multi(&keys).await.unwrap();
        assert_eq!(removed["a"], BatchEntry::Found(()));
        assert_eq!(removed["b"], BatchEntry::Absent);

        let items = vec![("a".to_string(), b"1".to_vec()), ("b".to_string(), b"2".to_vec())];
        store.insert("b", b"0", 0).await.unwrap();
        let inserted = store.insert_multi(&items, 0).await.unwrap();
        assert!(matches!(inserted["a"], BatchEntry::Found(_)));
        assert_eq!(inserted["b"], BatchEntry::Errored(StoreFault::AlreadyExists));
    }

    #[tokio::test]
    async fn test_flush_all() {
        let store = MemoryStore::new();
        store.upsert("a", b"1", 0).await.unwrap();
        store.upsert("b", b"1", 0).await.unwrap();
        store.flush_all().await.unwrap();
        assert!(store.is_empty().await);
        assert!(!store.exists("a").await.unwrap());
    }
}
