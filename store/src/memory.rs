//! In-memory storage backend for tests and ephemeral nodes.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::{KvStore, StoreError};

/// A `HashMap`-backed store behind an `RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(map) => map.len(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        map.remove(key);
        Ok(())
    }
}
