// SPDX-License-Identifier: MIT
use crate::crypto::{self, EncryptedPayload};
use crate::entry::CacheEntry;
use hydra_common::{Fingerprint, HydraError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Disk-backed L2 tier: one JSON file per fingerprint under `dir`, with
/// writes debounced so a burst of identical cache updates only costs one
/// fsync. Reads are always synchronous (caller controls their own timing).
pub struct DiskCache {
    dir: PathBuf,
    key: Option<[u8; 32]>,
    debounce: Duration,
    pending: Mutex<HashMap<Fingerprint, JoinHandle<()>>>,
}

impl DiskCache {
    pub fn new(dir: PathBuf, key: Option<[u8; 32]>) -> Self {
        Self::with_debounce(dir, key, Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }

    pub fn with_debounce(dir: PathBuf, key: Option<[u8; 32]>, debounce: Duration) -> Self {
        Self {
            dir,
            key,
            debounce,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, fp: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fp}.json"))
    }

    pub async fn ensure_dir(&self) -> Result<(), HydraError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| HydraError::Cache {
                message: format!("failed to create cache dir {}: {e}", self.dir.display()),
            })
    }

    /// Schedule a debounced write: if another write for the same fingerprint
    /// is already pending, it is cancelled and replaced by this one.
    pub async fn schedule_write(self: &Arc<Self>, entry: CacheEntry) {
        let fp = entry.fingerprint.clone();
        let this = Arc::clone(self);
        let debounce = self.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(e) = this.write_now(&entry).await {
                warn!(error = %e, fingerprint = %entry.fingerprint, "failed to persist cache entry");
            }
        });
        let mut pending = self.pending.lock().await;
        if let Some(old) = pending.insert(fp, handle) {
            old.abort();
        }
    }

    pub async fn write_now(&self, entry: &CacheEntry) -> Result<(), HydraError> {
        self.ensure_dir().await?;
        let body = serde_json::to_vec(entry).map_err(|e| HydraError::Cache {
            message: format!("failed to serialize cache entry: {e}"),
        })?;
        let bytes = match &self.key {
            Some(key) => {
                let payload = crypto::encrypt(key, &body)?;
                serde_json::to_vec(&payload).map_err(|e| HydraError::Cache {
                    message: format!("failed to serialize encrypted payload: {e}"),
                })?
            }
            None => body,
        };
        let path = self.path_for(&entry.fingerprint);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| HydraError::Cache {
                message: format!("failed to write {}: {e}", tmp.display()),
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| HydraError::Cache {
                message: format!("failed to rename {} -> {}: {e}", tmp.display(), path.display()),
            })?;
        debug!(fingerprint = %entry.fingerprint, bytes = bytes.len(), "persisted cache entry to disk");
        Ok(())
    }

    /// Read a single entry back; corrupt or undecryptable files are treated
    /// as a miss and removed rather than surfaced as an error.
    pub async fn read(&self, fp: &Fingerprint) -> Option<CacheEntry> {
        let path = self.path_for(fp);
        let bytes = tokio::fs::read(&path).await.ok()?;
        match self.decode(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "removing corrupt cache file");
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<CacheEntry, HydraError> {
        if let Some(key) = &self.key {
            if let Ok(payload) = serde_json::from_slice::<EncryptedPayload>(bytes) {
                if payload.encrypted {
                    let plaintext = crypto::decrypt(key, &payload)?;
                    return serde_json::from_slice(&plaintext).map_err(|e| HydraError::Cache {
                        message: format!("malformed decrypted cache entry: {e}"),
                    });
                }
            }
        }
        serde_json::from_slice(bytes).map_err(|e| HydraError::Cache {
            message: format!("malformed cache entry: {e}"),
        })
    }

    pub async fn remove(&self, fp: &Fingerprint) {
        let path = self.path_for(fp);
        let _ = tokio::fs::remove_file(&path).await;
    }

    pub async fn clear(&self) -> Result<(), HydraError> {
        let mut rd = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(HydraError::Cache {
                    message: format!("failed to read cache dir: {e}"),
                })
            }
        };
        while let Ok(Some(entry)) = rd.next_entry().await {
            let _ = tokio::fs::remove_file(entry.path()).await;
        }
        Ok(())
    }

    /// Remove every persisted entry older than `ttl_ms`. Best-effort: a file
    /// that fails to parse is removed outright since it can't be trusted.
    pub async fn sweep_expired(&self, now_ms: i64, ttl_ms: u64) -> usize {
        let mut removed = 0;
        let mut rd = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(_) => return 0,
        };
        while let Ok(Some(dirent)) = rd.next_entry().await {
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&path).await else {
                continue;
            };
            match self.decode(&bytes) {
                Ok(entry) if entry.is_expired(now_ms, ttl_ms) => {
                    let _ = tokio::fs::remove_file(&path).await;
                    removed += 1;
                }
                Err(_) => {
                    let _ = tokio::fs::remove_file(&path).await;
                    removed += 1;
                }
                _ => {}
            }
        }
        removed
    }

    /// Wait for any in-flight debounced writes to finish. Used by tests and
    /// by graceful shutdown so nothing is lost mid-debounce.
    pub async fn flush(&self) {
        let handles: Vec<_> = {
            let mut pending = self.pending.lock().await;
            pending.drain().map(|(_, h)| h).collect()
        };
        for h in handles {
            let _ = h.await;
        }
    }
}

pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| Path::new(".").to_path_buf())
        .join("hydra")
        .join("cache")
}
