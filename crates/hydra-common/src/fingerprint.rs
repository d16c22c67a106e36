// SPDX-License-Identifier: MIT
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 256-bit digest of `(normalized_model_id, prompt_bytes)`, rendered as a
/// hex string. The cache key and deduplication key for the whole engine.
///
/// Normalization lowercases the model id but preserves prompt bytes
/// verbatim — two requests differing only in prompt whitespace are
/// distinct fingerprints by design.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(model_id: &str, prompt: &str) -> Self {
        let normalized_model = model_id.to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update((normalized_model.len() as u64).to_le_bytes());
        hasher.update(normalized_model.as_bytes());
        hasher.update(prompt.as_bytes());
        let digest = hasher.finalize();
        Fingerprint(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_fingerprint() {
        let a = Fingerprint::compute("llama3", "hello world");
        let b = Fingerprint::compute("llama3", "hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn model_id_is_case_insensitive() {
        let a = Fingerprint::compute("Llama3", "hello");
        let b = Fingerprint::compute("llama3", "hello");
        assert_eq!(a, b);
    }

    #[test]
    fn prompt_bytes_are_case_sensitive() {
        let a = Fingerprint::compute("llama3", "Hello");
        let b = Fingerprint::compute("llama3", "hello");
        assert_ne!(a, b);
    }

    #[test]
    fn different_prompts_produce_different_fingerprints() {
        let a = Fingerprint::compute("llama3", "hello");
        let b = Fingerprint::compute("llama3", "goodbye");
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_is_64_hex_chars() {
        let f = Fingerprint::compute("m", "p");
        assert_eq!(f.as_str().len(), 64);
        assert!(f.as_str().bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn no_boundary_collision_between_model_and_prompt_concatenation() {
        // Without a length-prefixed model id, ("ab", "c") and ("a", "bc")
        // would hash identically since both concatenate to "abc".
        let a = Fingerprint::compute("ab", "c");
        let b = Fingerprint::compute("a", "bc");
        assert_ne!(a, b);
    }
}
