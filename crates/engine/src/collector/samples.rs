//! Previous-sample cache for CPU delta computation
//!
//! Keyed by container id, bounded by capacity and age. Owned by whoever
//! owns the collector; nothing here is process-global.

use crate::models::ContainerResourceSnapshot;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedSample {
    snapshot: ContainerResourceSnapshot,
    stored_at: Instant,
}

/// Bounded map of container id -> last snapshot
#[derive(Debug)]
pub struct SampleCache {
    entries: DashMap<String, CachedSample>,
    capacity: usize,
    ttl: Duration,
}

impl Default for SampleCache {
    fn default() -> Self {
        Self::new(4096, Duration::from_secs(300))
    }
}

impl SampleCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Last snapshot for `container_id`, unless it has expired
    pub fn get(&self, container_id: &str) -> Option<ContainerResourceSnapshot> {
        let expired = match self.entries.get(container_id) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                return Some(entry.snapshot.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(container_id);
        }
        None
    }

    /// Store `snapshot` as the latest read of `container_id`
    pub fn insert(&self, container_id: &str, snapshot: ContainerResourceSnapshot) {
        self.entries.insert(
            container_id.to_string(),
            CachedSample {
                snapshot,
                stored_at: Instant::now(),
            },
        );

        if self.entries.len() > self.capacity {
            self.evict();
        }
    }

    fn evict(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, sample| sample.stored_at.elapsed() <= ttl);

        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().stored_at)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    debug!(container_id = %key, "Evicting oldest cached sample");
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(cpu: f64) -> ContainerResourceSnapshot {
        ContainerResourceSnapshot {
            cpu_time_used: cpu,
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_get() {
        let cache = SampleCache::default();
        assert!(cache.is_empty());

        cache.insert("c1", snapshot(1.0));
        cache.insert("c1", snapshot(2.0));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("c1").unwrap().cpu_time_used, 2.0);
        assert!(cache.get("c2").is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = SampleCache::new(2, Duration::from_secs(60));
        cache.insert("c1", snapshot(1.0));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("c2", snapshot(2.0));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("c3", snapshot(3.0));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("c1").is_none());
        assert!(cache.get("c2").is_some());
        assert!(cache.get("c3").is_some());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = SampleCache::new(10, Duration::from_millis(1));
        cache.insert("c1", snapshot(1.0));
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get("c1").is_none());
        assert!(cache.is_empty());
    }
}
