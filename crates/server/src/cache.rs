//! Bounded, time-limited cache of upstream resource descriptors.
//!
//! Eviction is first-in-first-out: once the cache holds more than `capacity`
//! entries, the key inserted earliest is dropped, regardless of how recently
//! it was read. Refreshing an existing key does not move it in that order.

use filegate_core::ResourceDescriptor;
use filegate_core::config::CacheConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Time source for entry expiry.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    container_id: String,
    resource_id: String,
}

impl CacheKey {
    fn new(container_id: &str, resource_id: &str) -> Self {
        Self {
            container_id: container_id.to_string(),
            resource_id: resource_id.to_string(),
        }
    }
}

struct CacheEntry {
    value: ResourceDescriptor,
    inserted_at: Instant,
    /// Insertion sequence; matches exactly one live record in `order`.
    seq: u64,
}

/// Map plus insertion log. Records in `order` whose sequence no longer
/// matches the entry are stale and skipped, so removal never scans the log.
#[derive(Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    order: VecDeque<(CacheKey, u64)>,
    next_seq: u64,
}

impl CacheInner {
    fn is_live(&self, key: &CacheKey, seq: u64) -> bool {
        self.entries.get(key).is_some_and(|e| e.seq == seq)
    }

    /// Drop the oldest live entry.
    fn evict_oldest(&mut self) {
        while let Some((key, seq)) = self.order.pop_front() {
            if self.is_live(&key, seq) {
                self.entries.remove(&key);
                return;
            }
        }
    }

    /// Rebuild the log once stale records outnumber the capacity.
    fn compact(&mut self, capacity: usize) {
        if self.order.len() > capacity.saturating_mul(2) {
            let entries = &self.entries;
            let live: VecDeque<_> = self
                .order
                .drain(..)
                .filter(|(key, seq)| entries.get(key).is_some_and(|e| e.seq == *seq))
                .collect();
            self.order = live;
        }
    }
}

/// Process-local descriptor cache keyed by `(container_id, resource_id)`.
pub struct MetadataCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl MetadataCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self::with_clock(ttl, capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            ttl,
            capacity: capacity.max(1),
            clock,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.capacity)
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the descriptor if present and younger than the TTL.
    /// Expired entries are dropped on the way out.
    pub fn get(&self, container_id: &str, resource_id: &str) -> Option<ResourceDescriptor> {
        let key = CacheKey::new(container_id, resource_id);
        let now = self.clock.now();
        let mut inner = self.lock();

        let entry = inner.entries.get(&key)?;
        if now.saturating_duration_since(entry.inserted_at) < self.ttl {
            return Some(entry.value.clone());
        }

        inner.entries.remove(&key);
        None
    }

    /// Insert or refresh a descriptor, evicting the oldest insertion when full.
    pub fn put(&self, container_id: &str, resource_id: &str, descriptor: ResourceDescriptor) {
        let key = CacheKey::new(container_id, resource_id);
        let now = self.clock.now();
        let mut inner = self.lock();

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.value = descriptor;
            entry.inserted_at = now;
            return;
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.push_back((key.clone(), seq));
        inner.entries.insert(
            key,
            CacheEntry {
                value: descriptor,
                inserted_at: now,
                seq,
            },
        );

        while inner.entries.len() > self.capacity && !inner.order.is_empty() {
            inner.evict_oldest();
        }
        inner.compact(self.capacity);
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
