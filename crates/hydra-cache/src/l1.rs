// SPDX-License-Identifier: MIT
use crate::entry::CacheEntry;
use hydra_common::Fingerprint;
use lru::LruCache;
use std::num::NonZeroUsize;

/// In-memory L1 tier. Bounded by both entry count and total response bytes;
/// eviction always walks the LRU chain so recency order is never violated.
pub struct MemoryCache {
    entries: LruCache<Fingerprint, CacheEntry>,
    max_entries: usize,
    max_bytes: usize,
    current_bytes: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).unwrap();
        Self {
            entries: LruCache::new(cap),
            max_entries,
            max_bytes,
            current_bytes: 0,
        }
    }

    pub fn get(&mut self, fp: &Fingerprint) -> Option<CacheEntry> {
        self.entries.get(fp).cloned()
    }

    /// Peek without affecting recency order, used for read-only inspection
    /// (e.g. cache stats or item lookups that shouldn't disturb LRU order).
    pub fn peek(&self, fp: &Fingerprint) -> Option<&CacheEntry> {
        self.entries.peek(fp)
    }

    /// Returns the evicted entries, if any, so the caller can mirror them
    /// into the disk tier before they're gone for good.
    pub fn insert(&mut self, entry: CacheEntry) -> Vec<CacheEntry> {
        let mut evicted = Vec::new();
        let key = entry.fingerprint.clone();
        if let Some(old) = self.entries.peek(&key) {
            self.current_bytes = self.current_bytes.saturating_sub(old.size_bytes);
        }
        self.current_bytes += entry.size_bytes;
        // push() returns Some((k,v)) either when it replaced the same key's
        // old value, or when inserting a new key evicted the LRU tail.
        // Only the latter is a real eviction worth reporting to the caller.
        if let Some((old_key, old_val)) = self.entries.push(key.clone(), entry) {
            if old_key != key {
                self.current_bytes = self.current_bytes.saturating_sub(old_val.size_bytes);
                evicted.push(old_val);
            }
        }
        while self.current_bytes > self.max_bytes && self.entries.len() > 1 {
            if let Some((_, old)) = self.entries.pop_lru() {
                self.current_bytes = self.current_bytes.saturating_sub(old.size_bytes);
                evicted.push(old);
            } else {
                break;
            }
        }
        evicted
    }

    pub fn remove(&mut self, fp: &Fingerprint) -> Option<CacheEntry> {
        let removed = self.entries.pop(fp);
        if let Some(ref entry) = removed {
            self.current_bytes = self.current_bytes.saturating_sub(entry.size_bytes);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_bytes = 0;
    }

    /// Remove every entry older than `ttl_ms` relative to `now_ms`, returning them.
    pub fn sweep_expired(&mut self, now_ms: i64, ttl_ms: u64) -> Vec<CacheEntry> {
        let expired: Vec<Fingerprint> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now_ms, ttl_ms))
            .map(|(fp, _)| fp.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|fp| self.remove(&fp))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(fp_seed: &str, size: usize) -> CacheEntry {
        let mut e = CacheEntry::new(
            Fingerprint::compute("model", fp_seed),
            "model",
            fp_seed,
            "x".repeat(size),
            "backend",
            0,
        );
        e.size_bytes = size;
        e
    }

    #[test]
    fn evicts_lru_when_entry_count_exceeded() {
        let mut cache = MemoryCache::new(2, 1_000_000);
        cache.insert(mk("a", 10));
        cache.insert(mk("b", 10));
        cache.get(&Fingerprint::compute("model", "a")); // touch a, b is now LRU
        let evicted = cache.insert(mk("c", 10));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].prompt_preview, "b");
        assert!(cache.get(&Fingerprint::compute("model", "a")).is_some());
    }

    #[test]
    fn evicts_by_byte_budget_even_under_count_limit() {
        let mut cache = MemoryCache::new(10, 25);
        cache.insert(mk("a", 10));
        cache.insert(mk("b", 10));
        let evicted = cache.insert(mk("c", 10));
        assert!(!evicted.is_empty());
        assert!(cache.current_bytes() <= 25);
    }

    #[test]
    fn remove_updates_byte_accounting() {
        let mut cache = MemoryCache::new(10, 1_000);
        cache.insert(mk("a", 50));
        assert_eq!(cache.current_bytes(), 50);
        cache.remove(&Fingerprint::compute("model", "a"));
        assert_eq!(cache.current_bytes(), 0);
    }

    #[test]
    fn sweep_expired_removes_only_old_entries() {
        let mut cache = MemoryCache::new(10, 1_000);
        let mut old = mk("a", 10);
        old.created_at_ms = 0;
        let mut fresh = mk("b", 10);
        fresh.created_at_ms = 1_000;
        cache.insert(old);
        cache.insert(fresh);
        let expired = cache.sweep_expired(2_000, 500);
        assert_eq!(expired.len(), 1);
        assert_eq!(cache.len(), 1);
    }
}
