// SPDX-License-Identifier: MIT
use crate::entry::CacheEntry;
use crate::l1::MemoryCache;
use crate::l2::DiskCache;
use futures::future::{BoxFuture, FutureExt, Shared};
use hydra_common::{CacheStats, Fingerprint, HydraError};
use hydra_config::CacheConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

type BuildFuture = Shared<BoxFuture<'static, Result<String, HydraError>>>;

/// Two-tier content-addressed response cache (L1 memory + optional L2 disk).
/// `get_or_compute` guarantees at most one concurrent build per fingerprint:
/// a second caller racing the same key awaits the first caller's future
/// instead of recomputing.
pub struct ResponseCache {
    l1: Mutex<MemoryCache>,
    l2: Option<Arc<DiskCache>>,
    ttl_ms: u64,
    enabled: bool,
    min_response_len: usize,
    in_flight: StdMutex<HashMap<Fingerprint, BuildFuture>>,
    stats: StdMutex<CacheStats>,
    started: Instant,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Result<Self, HydraError> {
        let l2 = if config.persist_to_disk {
            let dir = config.dir.clone().unwrap_or_else(crate::l2::default_cache_dir);
            let key = config.resolve_key().map_err(|e| HydraError::Cache {
                message: format!("invalid cache encryption key: {e}"),
            })?;
            let debounce = std::time::Duration::from_millis(config.disk_write_debounce_ms);
            Some(Arc::new(DiskCache::with_debounce(dir, key, debounce)))
        } else {
            None
        };
        Ok(Self {
            l1: Mutex::new(MemoryCache::new(
                config.max_memory_entries,
                config.max_memory_mb * 1024 * 1024,
            )),
            l2,
            ttl_ms: config.ttl_ms,
            enabled: config.enabled,
            min_response_len: config.min_response_len,
            in_flight: StdMutex::new(HashMap::new()),
            stats: StdMutex::new(CacheStats::default()),
            started: Instant::now(),
        })
    }

    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Look up an entry without triggering a compute; used by `get_or_compute`
    /// and exposed directly for callers that want pure cache semantics.
    pub async fn get(&self, model_id: &str, prompt: &str) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }
        let fp = Fingerprint::compute(model_id, prompt);
        self.get_by_fingerprint(&fp).await
    }

    async fn get_by_fingerprint(&self, fp: &Fingerprint) -> Option<CacheEntry> {
        let now = self.now_ms();
        {
            let mut l1 = self.l1.lock().await;
            if let Some(entry) = l1.get(fp) {
                if entry.is_expired(now, self.ttl_ms) {
                    l1.remove(fp);
                } else {
                    self.record_hit();
                    return Some(entry);
                }
            }
        }
        if let Some(l2) = &self.l2 {
            if let Some(entry) = l2.read(fp).await {
                if entry.is_expired(now, self.ttl_ms) {
                    l2.remove(fp).await;
                } else {
                    let mut l1 = self.l1.lock().await;
                    l1.insert(entry.clone());
                    self.record_hit();
                    return Some(entry);
                }
            }
        }
        self.record_miss();
        None
    }

    fn record_hit(&self) {
        self.stats.lock().unwrap().hits += 1;
    }

    fn record_miss(&self) {
        self.stats.lock().unwrap().misses += 1;
    }

    /// Fetch a cached response, or compute one via `compute` and cache it.
    /// Concurrent calls for the same (model, prompt) share a single
    /// in-flight computation rather than each invoking `compute`.
    pub async fn get_or_compute<F>(
        &self,
        model_id: &str,
        prompt: &str,
        source_tag: &str,
        compute: F,
    ) -> Result<String, HydraError>
    where
        F: std::future::Future<Output = Result<String, HydraError>> + Send + 'static,
    {
        let fp = Fingerprint::compute(model_id, prompt);
        if self.enabled {
            if let Some(entry) = self.get_by_fingerprint(&fp).await {
                return Ok(entry.response_text);
            }
        }

        let shared = {
            let mut in_flight = self.in_flight.lock().unwrap();
            if let Some(existing) = in_flight.get(&fp) {
                existing.clone()
            } else {
                let boxed: BoxFuture<'static, Result<String, HydraError>> = compute.boxed();
                let shared = boxed.shared();
                in_flight.insert(fp.clone(), shared.clone());
                shared
            }
        };

        let result = shared.await;
        // Only the caller that registered the in-flight entry should still
        // see it: remove unconditionally once the shared future settles so
        // a subsequent call (e.g. retry after failure) starts fresh.
        self.in_flight.lock().unwrap().remove(&fp);

        match &result {
            Ok(text) => {
                if self.enabled && text.len() >= self.min_response_len {
                    self.insert(model_id, prompt, text, source_tag, fp).await;
                }
            }
            Err(e) => {
                self.stats.lock().unwrap().errors += 1;
                debug!(error = %e, model = model_id, "compute failed, not caching");
            }
        }
        result
    }

    async fn insert(&self, model_id: &str, prompt: &str, text: &str, source_tag: &str, fp: Fingerprint) {
        let entry = CacheEntry::new(fp, model_id, prompt, text, source_tag, self.now_ms());
        let evicted = {
            let mut l1 = self.l1.lock().await;
            l1.insert(entry.clone())
        };
        self.stats.lock().unwrap().writes += 1;
        if !evicted.is_empty() {
            self.stats.lock().unwrap().evictions += evicted.len() as u64;
        }
        if let Some(l2) = &self.l2 {
            l2.schedule_write(entry).await;
        }
    }

    pub async fn clear(&self) -> Result<(), HydraError> {
        self.l1.lock().await.clear();
        if let Some(l2) = &self.l2 {
            l2.clear().await?;
        }
        info!("cache cleared");
        Ok(())
    }

    /// Sweep both tiers for expired entries. Intended to run on a timer.
    pub async fn sweep_expired(&self) {
        self.sweep_with_ttl(self.ttl_ms).await
    }

    /// Remove entries older than `age_s` seconds from both tiers, regardless
    /// of the configured TTL. Backs the `cache_clear{older_than_s}` operation.
    pub async fn clear_older_than(&self, age_s: u64) {
        self.sweep_with_ttl(age_s.saturating_mul(1000)).await
    }

    async fn sweep_with_ttl(&self, ttl_ms: u64) {
        let now = self.now_ms();
        let expired_count = {
            let mut l1 = self.l1.lock().await;
            l1.sweep_expired(now, ttl_ms).len()
        };
        let disk_count = if let Some(l2) = &self.l2 {
            l2.sweep_expired(now, ttl_ms).await
        } else {
            0
        };
        if expired_count > 0 || disk_count > 0 {
            let mut stats = self.stats.lock().unwrap();
            stats.expirations += (expired_count + disk_count) as u64;
            stats.last_cleanup_ms = Some(now);
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().unwrap().clone();
        stats.last_cleanup_ms = stats.last_cleanup_ms.or(Some(self.now_ms()));
        stats
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydra_config::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> CacheConfig {
        CacheConfig {
            enabled: true,
            dir: None,
            persist_to_disk: false,
            ttl_ms: 60_000,
            max_memory_entries: 100,
            max_memory_mb: 16,
            cleanup_interval_ms: 60_000,
            min_response_len: 0,
            disk_write_debounce_ms: 100,
            encryption_key: None,
        }
    }

    #[tokio::test]
    async fn cache_miss_then_hit() {
        let cache = ResponseCache::new(&test_config()).unwrap();
        assert!(cache.get("m", "hello").await.is_none());
        let result = cache
            .get_or_compute("m", "hello", "backend", async { Ok("world".to_string()) })
            .await
            .unwrap();
        assert_eq!(result, "world");
        let hit = cache.get("m", "hello").await.unwrap();
        assert_eq!(hit.response_text, "world");
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_compute() {
        let cache = Arc::new(ResponseCache::new(&test_config()).unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("m", "shared", "backend", {
                        let calls = Arc::clone(&calls);
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Ok("value".to_string())
                        }
                    })
                    .await
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "value");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_compute_is_not_cached_and_can_retry() {
        let cache = ResponseCache::new(&test_config()).unwrap();
        let err = cache
            .get_or_compute("m", "fails", "backend", async {
                Err(HydraError::BackendUnavailable {
                    message: "down".to_string(),
                })
            })
            .await;
        assert!(err.is_err());
        assert!(cache.get("m", "fails").await.is_none());
        let ok = cache
            .get_or_compute("m", "fails", "backend", async { Ok("recovered".to_string()) })
            .await
            .unwrap();
        assert_eq!(ok, "recovered");
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let mut config = test_config();
        config.enabled = false;
        let cache = ResponseCache::new(&config).unwrap();
        cache
            .get_or_compute("m", "x", "backend", async { Ok("y".to_string()) })
            .await
            .unwrap();
        assert!(cache.get("m", "x").await.is_none());
    }

    #[tokio::test]
    async fn clear_empties_both_tiers() {
        let cache = ResponseCache::new(&test_config()).unwrap();
        cache
            .get_or_compute("m", "x", "backend", async { Ok("y".to_string()) })
            .await
            .unwrap();
        cache.clear().await.unwrap();
        assert!(cache.get("m", "x").await.is_none());
    }

    #[tokio::test]
    async fn clear_older_than_spares_entries_younger_than_the_threshold() {
        let cache = ResponseCache::new(&test_config()).unwrap();
        cache
            .get_or_compute("m", "x", "backend", async { Ok("y".to_string()) })
            .await
            .unwrap();
        cache.clear_older_than(3600).await;
        assert!(cache.get("m", "x").await.is_some());
    }

    #[tokio::test]
    async fn clear_older_than_removes_entries_past_the_threshold() {
        let cache = ResponseCache::new(&test_config()).unwrap();
        cache
            .get_or_compute("m", "x", "backend", async { Ok("y".to_string()) })
            .await
            .unwrap();
        cache.clear_older_than(0).await;
        assert!(cache.get("m", "x").await.is_none());
    }
}
