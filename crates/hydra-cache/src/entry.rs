// SPDX-License-Identifier: MIT
use hydra_common::Fingerprint;
use serde::{Deserialize, Serialize};

/// Truncate `s` to at most `max_bytes` bytes, respecting UTF-8 boundaries.
pub fn truncate_preview(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// An immutable cached response. Updates replace the whole entry rather
/// than mutating fields in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub model_id: String,
    pub prompt_preview: String,
    pub response_text: String,
    pub source_tag: String,
    pub created_at_ms: i64,
    pub size_bytes: usize,
}

impl CacheEntry {
    pub fn new(
        fingerprint: Fingerprint,
        model_id: impl Into<String>,
        prompt: &str,
        response_text: impl Into<String>,
        source_tag: impl Into<String>,
        created_at_ms: i64,
    ) -> Self {
        let response_text = response_text.into();
        let size_bytes = response_text.len();
        Self {
            fingerprint,
            model_id: model_id.into(),
            prompt_preview: truncate_preview(prompt, 100),
            response_text,
            source_tag: source_tag.into(),
            created_at_ms,
            size_bytes,
        }
    }

    pub fn is_expired(&self, now_ms: i64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > ttl_ms as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_at_byte_boundary() {
        let s = "a".repeat(150);
        let preview = truncate_preview(&s, 100);
        assert_eq!(preview.len(), 100);
    }

    #[test]
    fn preview_respects_utf8_boundaries() {
        // each 'é' is 2 bytes; truncating at byte 99 would split a char.
        let s = "é".repeat(60);
        let preview = truncate_preview(&s, 99);
        assert!(preview.len() <= 99);
        assert!(s.as_str().get(..preview.len()).is_some() || preview.is_empty());
    }

    #[test]
    fn short_prompt_is_not_truncated() {
        let preview = truncate_preview("hi", 100);
        assert_eq!(preview, "hi");
    }

    #[test]
    fn expiry_is_strictly_greater_than_ttl() {
        let entry = CacheEntry::new(
            Fingerprint::compute("m", "p"),
            "m",
            "p",
            "response text long enough",
            "backend",
            1_000,
        );
        assert!(!entry.is_expired(1_000 + 500, 500));
        assert!(entry.is_expired(1_000 + 501, 500));
    }
}
