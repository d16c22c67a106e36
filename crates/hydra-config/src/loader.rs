// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/hydra/config.yaml"));
    paths.push(PathBuf::from("/etc/hydra/config.yml"));

    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("hydra/config.yaml"));
        paths.push(cfg.join("hydra/config.yml"));
    }

    paths.push(PathBuf::from(".hydra.yaml"));
    paths.push(PathBuf::from(".hydra.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files, then applying
/// the recognized `HYDRA_*`/`OLLAMA_*`/`CACHE_*`/`QUEUE_*` environment
/// variables on top. Environment variables always win over file layers.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };

    apply_env_overrides(&mut config)?;
    config.cache.resolve_key().context("CACHE_ENCRYPTION_KEY")?;
    Ok(config)
}

/// Apply recognized environment variables on top of file/default values.
fn apply_env_overrides(config: &mut Config) -> anyhow::Result<()> {
    if let Ok(v) = std::env::var("OLLAMA_HOST") {
        config.ollama_host = v;
    }
    if let Ok(v) = std::env::var("CACHE_DIR") {
        config.cache.dir = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("CACHE_TTL_MS") {
        config.cache.ttl_ms = v.parse().context("CACHE_TTL_MS")?;
    }
    if let Ok(v) = std::env::var("CACHE_ENABLED") {
        config.cache.enabled = parse_bool(&v)?;
    }
    if let Ok(v) = std::env::var("CACHE_MAX_MEMORY_ENTRIES") {
        config.cache.max_memory_entries = v.parse().context("CACHE_MAX_MEMORY_ENTRIES")?;
    }
    if let Ok(v) = std::env::var("CACHE_MAX_MEMORY_MB") {
        config.cache.max_memory_mb = v.parse().context("CACHE_MAX_MEMORY_MB")?;
    }
    if let Ok(v) = std::env::var("CACHE_CLEANUP_INTERVAL_MS") {
        config.cache.cleanup_interval_ms = v.parse().context("CACHE_CLEANUP_INTERVAL_MS")?;
    }
    if let Ok(v) = std::env::var("CACHE_PERSIST_TO_DISK") {
        config.cache.persist_to_disk = parse_bool(&v)?;
    }
    if let Ok(v) = std::env::var("CACHE_ENCRYPTION_KEY") {
        config.cache.encryption_key = Some(v);
    }
    if let Ok(v) = std::env::var("QUEUE_MAX_CONCURRENT") {
        config.queue.max_concurrent = v.parse().context("QUEUE_MAX_CONCURRENT")?;
    }
    if let Ok(v) = std::env::var("QUEUE_MAX_RETRIES") {
        config.queue.max_retries = v.parse().context("QUEUE_MAX_RETRIES")?;
    }
    if let Ok(v) = std::env::var("QUEUE_TIMEOUT_MS") {
        config.queue.timeout_ms = v.parse().context("QUEUE_TIMEOUT_MS")?;
    }
    if let Ok(v) = std::env::var("HYDRA_LOG_LEVEL") {
        config.log_level = v;
    }
    Ok(())
}

fn parse_bool(v: &str) -> anyhow::Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("invalid boolean value: {other}"),
    }
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env var mutation races across tests in the same process; serialize them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn load_with_no_extra_path_returns_defaults() {
        let _g = ENV_LOCK.lock().unwrap();
        let cfg = load(None).unwrap();
        assert_eq!(cfg.ollama_host, "http://localhost:11434");
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        let _g = ENV_LOCK.lock().unwrap();
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "ollama_host: http://example:1234").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.ollama_host, "http://example:1234");
    }

    #[test]
    fn env_var_overrides_file() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("OLLAMA_HOST", "http://env-wins:9999");
        let result = load(None);
        std::env::remove_var("OLLAMA_HOST");
        assert_eq!(result.unwrap().ollama_host, "http://env-wins:9999");
    }

    #[test]
    fn invalid_encryption_key_rejected() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("CACHE_ENCRYPTION_KEY", "not-a-valid-key");
        let result = load(None);
        std::env::remove_var("CACHE_ENCRYPTION_KEY");
        assert!(result.is_err());
    }

    #[test]
    fn load_returns_error_when_explicit_path_missing() {
        let _g = ENV_LOCK.lock().unwrap();
        let result = load(Some(Path::new("/tmp/hydra_nonexistent_config_xyz.yaml")));
        assert!(result.is_err());
    }
}
