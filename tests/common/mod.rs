//! Shared helpers for the integration tests

#![allow(dead_code)]

use bucketcache::prelude::*;
use kv_store::prelude::{BatchEntry, BatchResult, Cas, Clock, Document};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const START: u64 = 1_700_000_000;

/// Clock the test can move by hand
pub fn manual_clock(start: u64) -> (Arc<AtomicU64>, Clock) {
    let now = Arc::new(AtomicU64::new(start));
    let handle = now.clone();
    (now, Arc::new(move || handle.load(Ordering::SeqCst)))
}

/// Memory store that fails chosen operations and records expiries
pub struct FaultyStore {
    inner: MemoryStore,
    faults: Mutex<HashMap<(&'static str, String), StoreFault>>,
    batch_fault: Mutex<Option<StoreFault>>,
    unanswered: Mutex<HashSet<String>>,
    expiries: Mutex<Vec<(String, u64)>>,
}

impl FaultyStore {
    pub fn new(clock: Clock) -> Self {
        Self {
            inner: MemoryStore::with_clock(clock),
            faults: Mutex::new(HashMap::new()),
            batch_fault: Mutex::new(None),
            unanswered: Mutex::new(HashSet::new()),
            expiries: Mutex::new(Vec::new()),
        }
    }

    /// Make `op` on `key` fail with `fault`
    pub fn fail(&self, op: &'static str, key: &str, fault: StoreFault) {
        self.faults
            .lock()
            .unwrap()
            .insert((op, key.to_string()), fault);
    }

    /// Make every multi-key request fail as a whole
    pub fn fail_batches(&self, fault: StoreFault) {
        *self.batch_fault.lock().unwrap() = Some(fault);
    }

    /// Leave `key` out of multi-key answers
    pub fn leave_unanswered(&self, key: &str) {
        self.unanswered.lock().unwrap().insert(key.to_string());
    }

    pub fn heal(&self) {
        self.faults.lock().unwrap().clear();
        *self.batch_fault.lock().unwrap() = None;
        self.unanswered.lock().unwrap().clear();
    }

    /// Expiry values the store received, with their store keys
    pub fn expiries(&self) -> Vec<(String, u64)> {
        self.expiries.lock().unwrap().clone()
    }

    fn check(&self, op: &'static str, key: &str) -> Result<(), StoreFault> {
        match self.faults.lock().unwrap().get(&(op, key.to_string())) {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    fn check_batch(&self) -> Result<(), StoreFault> {
        match self.batch_fault.lock().unwrap().as_ref() {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    fn record(&self, key: &str, expiry: u64) {
        self.expiries
            .lock()
            .unwrap()
            .push((key.to_string(), expiry));
    }

    fn answer<T>(&self, results: &mut BatchResult<T>) {
        for key in self.unanswered.lock().unwrap().iter() {
            results.remove(key);
        }
    }
}

#[async_trait]
impl KvStore for FaultyStore {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn get(&self, key: &str) -> Result<Document, StoreFault> {
        self.check("get", key)?;
        self.inner.get(key).await
    }

    async fn get_multi(&self, keys: &[String]) -> Result<BatchResult<Document>, StoreFault> {
        self.check_batch()?;
        let mut results = HashMap::new();
        for key in keys {
            results.insert(key.clone(), BatchEntry::from_result(self.get(key).await));
        }
        self.answer(&mut results);
        Ok(results)
    }

    async fn upsert(&self, key: &str, value: &[u8], expiry: u64) -> Result<Cas, StoreFault> {
        self.check("upsert", key)?;
        self.record(key, expiry);
        self.inner.upsert(key, value, expiry).await
    }

    async fn upsert_multi(
        &self,
        items: &[(String, Vec<u8>)],
        expiry: u64,
    ) -> Result<BatchResult<Cas>, StoreFault> {
        self.check_batch()?;
        let mut results = HashMap::new();
        for (key, value) in items {
            let result = self.upsert(key, value, expiry).await;
            results.insert(key.clone(), BatchEntry::from_result(result));
        }
        self.answer(&mut results);
        Ok(results)
    }

    async fn insert(&self, key: &str, value: &[u8], expiry: u64) -> Result<Cas, StoreFault> {
        self.check("insert", key)?;
        self.record(key, expiry);
        self.inner.insert(key, value, expiry).await
    }

    async fn insert_multi(
        &self,
        items: &[(String, Vec<u8>)],
        expiry: u64,
    ) -> Result<BatchResult<Cas>, StoreFault> {
        self.check_batch()?;
        let mut results = HashMap::new();
        for (key, value) in items {
            let result = self.insert(key, value, expiry).await;
            results.insert(key.clone(), BatchEntry::from_result(result));
        }
        self.answer(&mut results);
        Ok(results)
    }

    async fn replace(
        &self,
        key: &str,
        value: &[u8],
        expiry: u64,
        cas: Option<Cas>,
    ) -> Result<Cas, StoreFault> {
        self.check("replace", key)?;
        self.record(key, expiry);
        self.inner.replace(key, value, expiry, cas).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreFault> {
        self.check("remove", key)?;
        self.inner.remove(key).await
    }

    async fn remove_multi(&self, keys: &[String]) -> Result<BatchResult<()>, StoreFault> {
        self.check_batch()?;
        let mut results = HashMap::new();
        for key in keys {
            results.insert(key.clone(), BatchEntry::from_result(self.remove(key).await));
        }
        self.answer(&mut results);
        Ok(results)
    }

    async fn touch(&self, key: &str, expiry: u64) -> Result<(), StoreFault> {
        self.check("touch", key)?;
        self.record(key, expiry);
        self.inner.touch(key, expiry).await
    }

    async fn counter(
        &self,
        key: &str,
        delta: i64,
        initial: Option<i64>,
        expiry: u64,
    ) -> Result<i64, StoreFault> {
        self.check("counter", key)?;
        self.inner.counter(key, delta, initial, expiry).await
    }

    async fn flush_all(&self) -> Result<(), StoreFault> {
        self.check("flush", "")?;
        self.inner.flush_all().await
    }

    async fn ping(&self) -> Result<(), StoreFault> {
        self.check("ping", "")
    }
}

/// Store that refuses every request and keeps the looped multi-key methods
pub struct RefusingStore;

fn refused<T>() -> Result<T, StoreFault> {
    Err(StoreFault::Transport("refused".to_string()))
}

#[async_trait]
impl KvStore for RefusingStore {
    fn name(&self) -> &'static str {
        "refusing"
    }

    async fn get(&self, _key: &str) -> Result<Document, StoreFault> {
        refused()
    }

    async fn upsert(&self, _key: &str, _value: &[u8], _expiry: u64) -> Result<Cas, StoreFault> {
        refused()
    }

    async fn insert(&self, _key: &str, _value: &[u8], _expiry: u64) -> Result<Cas, StoreFault> {
        refused()
    }

    async fn replace(
        &self,
        _key: &str,
        _value: &[u8],
        _expiry: u64,
        _cas: Option<Cas>,
    ) -> Result<Cas, StoreFault> {
        refused()
    }

    async fn remove(&self, _key: &str) -> Result<(), StoreFault> {
        refused()
    }

    async fn touch(&self, _key: &str, _expiry: u64) -> Result<(), StoreFault> {
        refused()
    }

    async fn counter(
        &self,
        _key: &str,
        _delta: i64,
        _initial: Option<i64>,
        _expiry: u64,
    ) -> Result<i64, StoreFault> {
        refused()
    }

    async fn flush_all(&self) -> Result<(), StoreFault> {
        refused()
    }

    async fn ping(&self) -> Result<(), StoreFault> {
        refused()
    }
}

/// Connector handing out fresh memory stores and counting connects
#[derive(Default)]
pub struct CountingConnector {
    connects: AtomicUsize,
    last: Mutex<Option<ResourceConfig>>,
}

impl CountingConnector {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<ResourceConfig> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl StoreConnector for CountingConnector {
    async fn connect(&self, config: &ResourceConfig) -> Result<Arc<dyn KvStore>, StoreFault> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(config.clone());
        Ok(Arc::new(MemoryStore::new()))
    }
}

/// A cache in namespace `app` over a fresh faulty store
pub async fn faulty_cache() -> (Arc<AtomicU64>, Arc<FaultyStore>, BucketCache) {
    let (now, clock) = manual_clock(START);
    let store = Arc::new(FaultyStore::new(clock.clone()));

    let resources = Arc::new(ResourceManager::default());
    resources.set_store("default", store.clone()).await;

    let cache = BucketCache::new(CacheOptions::new("app"), resources)
        .unwrap()
        .with_clock(clock);
    (now, store, cache)
}

/// A cache in namespace `app` over a store that refuses every request
pub async fn refusing_cache() -> BucketCache {
    let resources = Arc::new(ResourceManager::default());
    resources.set_store("default", Arc::new(RefusingStore)).await;
    BucketCache::new(CacheOptions::new("app"), resources).unwrap()
}
