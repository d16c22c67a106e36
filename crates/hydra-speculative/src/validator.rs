// SPDX-License-Identifier: MIT
use std::sync::Arc;

pub type Validator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Default acceptance rule for `FIRST_VALID`: non-empty trimmed text of at
/// least 10 characters.
pub fn default_validator() -> Validator {
    Arc::new(|text: &str| text.trim().len() >= 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_text() {
        let v = default_validator();
        assert!(!v("short"));
    }

    #[test]
    fn accepts_text_at_boundary() {
        let v = default_validator();
        assert!(v("0123456789"));
    }

    #[test]
    fn trims_before_measuring() {
        let v = default_validator();
        assert!(!v("   a   "));
    }
}
