// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_cache_ttl_ms() -> u64 {
    3_600_000
}

fn default_cache_max_memory_entries() -> usize {
    1000
}

fn default_cache_max_memory_mb() -> usize {
    100
}

fn default_cache_cleanup_interval_ms() -> u64 {
    300_000
}

fn default_queue_max_concurrent() -> usize {
    4
}

fn default_queue_max_retries() -> u32 {
    3
}

fn default_queue_timeout_ms() -> u64 {
    60_000
}

fn default_bucket_capacity() -> u32 {
    10
}

fn default_bucket_refill_per_sec() -> f64 {
    2.0
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_retry_jitter() -> f64 {
    0.2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_cache_response_len() -> usize {
    10
}

fn default_disk_write_debounce_ms() -> u64 {
    100
}

/// Top-level validated configuration for a running hydra process.
///
/// Constructed by [`crate::load`], never by hand in non-test code — the
/// loader is what applies environment-variable precedence and validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_host: default_ollama_host(),
            cache: CacheConfig::default(),
            queue: QueueConfig::default(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for the optional L2 disk tier. `None` disables L2.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default)]
    pub persist_to_disk: bool,

    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,

    #[serde(default = "default_cache_max_memory_entries")]
    pub max_memory_entries: usize,

    #[serde(default = "default_cache_max_memory_mb")]
    pub max_memory_mb: usize,

    #[serde(default = "default_cache_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    #[serde(default = "default_min_cache_response_len")]
    pub min_response_len: usize,

    #[serde(default = "default_disk_write_debounce_ms")]
    pub disk_write_debounce_ms: u64,

    /// 64 hex chars or base64 of 32 bytes. Validated by [`CacheConfig::resolve_key`].
    #[serde(default)]
    pub encryption_key: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            persist_to_disk: false,
            ttl_ms: default_cache_ttl_ms(),
            max_memory_entries: default_cache_max_memory_entries(),
            max_memory_mb: default_cache_max_memory_mb(),
            cleanup_interval_ms: default_cache_cleanup_interval_ms(),
            min_response_len: default_min_cache_response_len(),
            disk_write_debounce_ms: default_disk_write_debounce_ms(),
            encryption_key: None,
        }
    }
}

impl CacheConfig {
    /// Decode `encryption_key` into a 32-byte AEAD key.
    ///
    /// Accepts 64 hex chars or base64 of exactly 32 bytes. Returns
    /// `Ok(None)` when no key is configured, `Err` when one is configured but
    /// malformed — callers should fail startup rather than silently fall back
    /// to plaintext.
    pub fn resolve_key(&self) -> anyhow::Result<Option<[u8; 32]>> {
        let Some(raw) = &self.encryption_key else {
            return Ok(None);
        };
        let raw = raw.trim();
        let bytes = if raw.len() == 64 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            hex::decode(raw)?
        } else {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.decode(raw)?
        };
        anyhow::ensure!(
            bytes.len() == 32,
            "CACHE_ENCRYPTION_KEY must decode to exactly 32 bytes, got {}",
            bytes.len()
        );
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Some(key))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_queue_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_queue_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_bucket_capacity")]
    pub bucket_capacity: u32,

    #[serde(default = "default_bucket_refill_per_sec")]
    pub bucket_refill_per_sec: f64,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_queue_max_concurrent(),
            max_retries: default_queue_max_retries(),
            timeout_ms: default_queue_timeout_ms(),
            bucket_capacity: default_bucket_capacity(),
            bucket_refill_per_sec: default_bucket_refill_per_sec(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_jitter: default_retry_jitter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let cfg = Config::default();
        assert_eq!(cfg.ollama_host, "http://localhost:11434");
        assert_eq!(cfg.queue.max_concurrent, 4);
        assert_eq!(cfg.cache.ttl_ms, 3_600_000);
    }

    #[test]
    fn resolve_key_accepts_hex() {
        let cfg = CacheConfig {
            encryption_key: Some("ab".repeat(32)),
            ..CacheConfig::default()
        };
        let key = cfg.resolve_key().unwrap().unwrap();
        assert_eq!(key.len(), 32);
        assert_eq!(key[0], 0xab);
    }

    #[test]
    fn resolve_key_accepts_base64() {
        use base64::Engine;
        let raw = [7u8; 32];
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        let cfg = CacheConfig {
            encryption_key: Some(encoded),
            ..CacheConfig::default()
        };
        let key = cfg.resolve_key().unwrap().unwrap();
        assert_eq!(key, raw);
    }

    #[test]
    fn resolve_key_none_when_unset() {
        let cfg = CacheConfig::default();
        assert!(cfg.resolve_key().unwrap().is_none());
    }

    #[test]
    fn resolve_key_rejects_wrong_length() {
        let cfg = CacheConfig {
            encryption_key: Some("ab".repeat(10)),
            ..CacheConfig::default()
        };
        assert!(cfg.resolve_key().is_err());
    }
}
