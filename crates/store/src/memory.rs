use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::error::StoreError;
use crate::kv::KvStore;

/// Process-local `KvStore` with injectable per-key failures.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    buckets: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `get` and `append` on `key` fail with a transport error.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.lock().failing.insert(key.into());
    }

    pub fn heal_key(&self, key: &str) {
        self.lock().failing.remove(key);
    }

    pub fn put_raw(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.lock().buckets.insert(key.into(), data.into());
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().buckets.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().buckets.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store mutex poisoned")
    }

    fn check(inner: &Inner, key: &str) -> Result<(), StoreError> {
        if inner.failing.contains(key) {
            return Err(StoreError::Transport(format!("injected failure for {key}")));
        }
        Ok(())
    }
}

impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let inner = self.lock();
        Self::check(&inner, key)?;
        Ok(inner.buckets.get(key).map(|b| Bytes::copy_from_slice(b)))
    }

    async fn append(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check(&inner, key)?;
        inner
            .buckets
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(&data);
        Ok(())
    }
}
