//! Bounded TTL store with insertion-order eviction.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_MAX_SIZE: usize = 1000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) > self.ttl
    }
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion sequence -> key; the first entry is the oldest insert.
    order: BTreeMap<u64, String>,
    next_seq: u64,
    max_size: usize,
    default_ttl: Duration,
}

impl<V> CacheState<V> {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Key/value store with per-entry expiry and a fixed entry budget.
///
/// Expiry is lazy: `get` drops an entry whose age exceeds its TTL, and
/// `cleanup` sweeps the rest. At capacity, inserting a new key evicts exactly
/// one entry, the oldest inserted (access order is ignored).
///
/// A disabled cache stores nothing and always reports a miss.
pub struct TtlCache<V> {
    state: Mutex<CacheState<V>>,
    enabled: bool,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self::with_switch(max_size, default_ttl, true)
    }

    pub fn disabled() -> Self {
        Self::with_switch(DEFAULT_MAX_SIZE, DEFAULT_TTL, false)
    }

    pub fn with_switch(max_size: usize, default_ttl: Duration, enabled: bool) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
                max_size: max_size.max(1),
                default_ttl,
            }),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        if !self.enabled {
            return None;
        }

        let mut state = self.state.lock().await;
        let expired = state.entries.get(key)?.is_expired(Instant::now());
        if expired {
            state.remove(key);
            debug!("Cache entry expired: {}", key);
            return None;
        }
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store `value` under `key`. A missing or zero `ttl` uses the default.
    /// Returns false when the cache is disabled.
    pub async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        if !self.enabled {
            return false;
        }

        let mut state = self.state.lock().await;
        let ttl = ttl.filter(|ttl| !ttl.is_zero()).unwrap_or(state.default_ttl);
        let now = Instant::now();

        // Overwrites keep their original insertion slot.
        if let Some(entry) = state.entries.get_mut(key) {
            entry.value = value;
            entry.stored_at = now;
            entry.ttl = ttl;
            return true;
        }

        if state.entries.len() >= state.max_size {
            if let Some(evicted) = state.evict_oldest() {
                debug!("Cache full, evicted {}", evicted);
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.insert(seq, key.to_string());
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: now,
                ttl,
                seq,
            },
        );
        true
    }

    pub async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    pub async fn delete(&self, key: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.state.lock().await.remove(key).is_some()
    }

    pub async fn clear(&self) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.order.clear();
    }

    /// Remove every expired entry; returns how many were dropped.
    pub async fn cleanup(&self) -> usize {
        if !self.enabled {
            return 0;
        }

        let mut state = self.state.lock().await;
        let now = Instant::now();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    pub async fn stats(&self) -> CacheStats {
        if !self.enabled {
            return CacheStats { size: 0, max_size: 0 };
        }
        let state = self.state.lock().await;
        CacheStats {
            size: state.entries.len(),
            max_size: state.max_size,
        }
    }

    /// Change the capacity and/or default TTL. Shrinking below the current
    /// size evicts oldest-inserted entries until the cache fits.
    pub async fn configure(&self, max_size: Option<usize>, default_ttl: Option<Duration>) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.lock().await;
        if let Some(max_size) = max_size.filter(|size| *size > 0) {
            state.max_size = max_size;
            while state.entries.len() > state.max_size {
                if state.evict_oldest().is_none() {
                    break;
                }
            }
        }
        if let Some(ttl) = default_ttl.filter(|ttl| !ttl.is_zero()) {
            state.default_ttl = ttl;
        }
    }
}
