//! Per-run exclusive use of cache keys

use crate::cache::store::CacheKey;
use crate::error::{ShipyardError, ShipyardResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Tracks which cache keys are held by a running job.
///
/// Distinct keys never contend; a second concurrent holder of the same key
/// is rejected rather than queued.
#[derive(Debug, Clone, Default)]
pub struct CacheLeases {
    held: Arc<Mutex<HashSet<CacheKey>>>,
}

impl CacheLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take exclusive use of `key` until the returned lease is dropped
    pub fn acquire(&self, key: &CacheKey) -> ShipyardResult<CacheLease> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| ShipyardError::Internal("cache lease table poisoned".to_string()))?;
        if !held.insert(key.clone()) {
            return Err(ShipyardError::CacheKeyContention(key.to_string()));
        }
        Ok(CacheLease {
            key: key.clone(),
            held: Arc::clone(&self.held),
        })
    }

    /// Number of keys currently held
    pub fn held_count(&self) -> usize {
        self.held.lock().map(|h| h.len()).unwrap_or(0)
    }
}

/// Exclusive hold on a cache key; released on drop
#[derive(Debug)]
pub struct CacheLease {
    key: CacheKey,
    held: Arc<Mutex<HashSet<CacheKey>>>,
}

impl CacheLease {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for CacheLease {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.key);
        }
    }
}
