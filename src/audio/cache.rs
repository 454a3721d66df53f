//! Bounded store of decoded audio keyed by source identifier.
//!
//! Eviction is by oldest insertion, not by last access, and entries expire a
//! fixed TTL after they were inserted. Reads never refresh an entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::decode::AudioData;
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;

struct CacheEntry<T> {
    value: Arc<T>,
    inserted_at: u64,
    seq: u64,
}

struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    next_seq: u64,
}

/// Shared across playback requests. Every operation holds the map lock only
/// for a short synchronous section; decoding happens outside it, so two
/// concurrent misses on one key may both decode.
pub struct AudioBufferCache<T = AudioData> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl<T> AudioBufferCache<T> {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next_seq: 0,
            }),
            capacity: config.capacity,
            ttl_ms: config.ttl_ms,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // entries are plain data, a panic elsewhere cannot leave them half-written
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fresh entry for `key`; an expired entry is removed on the way.
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        let fresh = match inner.entries.get(key) {
            Some(entry) => now.saturating_sub(entry.inserted_at) < self.ttl_ms,
            None => return None,
        };
        if fresh {
            inner.entries.get(key).map(|e| Arc::clone(&e.value))
        } else {
            inner.entries.remove(key);
            log::debug!("Cache entry expired: {}", key);
            None
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Arc<T>) {
        if self.capacity == 0 {
            return;
        }
        let key = key.into();
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.inserted_at, e.seq))
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
                log::debug!("Cache full, evicted oldest entry: {}", oldest);
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                seq,
            },
        );
    }

    /// Cached value, or decode and cache it. A failed decode is returned to
    /// the caller and nothing is stored.
    pub fn get_or_decode<E, F>(&self, key: &str, decode: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(hit) = self.get(key) {
            log::debug!("Cache hit: {}", key);
            return Ok(hit);
        }
        log::debug!("Cache miss: {}", key);
        let value = Arc::new(decode()?);
        self.set(key, Arc::clone(&value));
        Ok(value)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<T>> {
        self.lock().entries.remove(key).map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::DecodeError;
    use std::path::PathBuf;

    fn cache(capacity: usize, ttl_ms: u64) -> (AudioBufferCache<&'static str>, ManualClock) {
        let clock = ManualClock::new(1_000);
        let cache = AudioBufferCache::with_clock(
            &CacheConfig { capacity, ttl_ms },
            Arc::new(clock.clone()),
        );
        (cache, clock)
    }

    #[test]
    fn evicts_oldest_insertion_when_full() {
        let (cache, clock) = cache(2, 3_600_000);
        cache.set("A", Arc::new("a"));
        clock.advance(1);
        cache.set("B", Arc::new("b"));
        clock.advance(1);
        // reading A does not protect it
        assert!(cache.get("A").is_some());
        cache.set("C", Arc::new("c"));

        assert!(cache.get("A").is_none());
        assert_eq!(*cache.get("B").unwrap(), "b");
        assert_eq!(*cache.get("C").unwrap(), "c");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn same_millisecond_inserts_evict_in_order() {
        let (cache, _clock) = cache(2, 3_600_000);
        cache.set("A", Arc::new("a"));
        cache.set("B", Arc::new("b"));
        cache.set("C", Arc::new("c"));
        assert!(cache.get("A").is_none());
        assert!(cache.get("B").is_some());
    }

    #[test]
    fn expired_entry_is_removed_on_read() {
        let (cache, clock) = cache(4, 1_000);
        cache.set("A", Arc::new("a"));
        clock.advance(999);
        assert!(cache.get("A").is_some());
        clock.advance(1);
        assert!(cache.get("A").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn resetting_a_key_replaces_without_eviction() {
        let (cache, clock) = cache(2, 1_000);
        cache.set("A", Arc::new("a"));
        cache.set("B", Arc::new("b"));
        clock.advance(600);
        cache.set("A", Arc::new("a2"));
        assert_eq!(cache.len(), 2);
        clock.advance(600);
        // B expired, A was re-inserted 600 ms ago
        assert!(cache.get("B").is_none());
        assert_eq!(*cache.get("A").unwrap(), "a2");
    }

    #[test]
    fn decode_failures_are_not_cached() {
        let (cache, _clock) = cache(2, 1_000);
        let err = cache
            .get_or_decode("bad", || Err(DecodeError::Empty(PathBuf::from("bad.wav"))))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Empty(_)));
        assert!(cache.is_empty());

        let mut calls = 0;
        let first = cache
            .get_or_decode::<DecodeError, _>("good", || {
                calls += 1;
                Ok("pcm")
            })
            .unwrap();
        let second = cache
            .get_or_decode::<DecodeError, _>("good", || {
                calls += 1;
                Ok("other")
            })
            .unwrap();
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let (cache, _clock) = cache(0, 1_000);
        cache.set("A", Arc::new("a"));
        assert!(cache.get("A").is_none());
    }

    #[test]
    fn shared_between_threads() {
        let clock = ManualClock::new(0);
        let cache: Arc<AudioBufferCache<u32>> = Arc::new(AudioBufferCache::with_clock(
            &CacheConfig::default(),
            Arc::new(clock),
        ));
        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..10u32 {
                        cache.set(format!("{}-{}", t, i), Arc::new(i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 20);
    }
}
