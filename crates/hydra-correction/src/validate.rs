// SPDX-License-Identifier: MIT
use crate::language::{detect_language, Language};
use crate::syntax_checks;
use crate::types::Diagnostic;

/// Run the syntactic half of self-correction directly against caller-supplied
/// code, skipping generation and the critic pass entirely. `language_hint`
/// overrides detection when given and recognized; otherwise the language is
/// inferred from the code itself.
pub fn validate_code(code: &str, language_hint: Option<&str>) -> (Language, Vec<Diagnostic>) {
    let language = language_hint
        .and_then(Language::from_name)
        .unwrap_or_else(|| detect_language(code));
    let diagnostics = if language == Language::Unknown {
        Vec::new()
    } else {
        syntax_checks::check(language, code)
    };
    (language, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_language_hint_overrides_detection() {
        let (lang, diags) = validate_code("x = (1 + 2", Some("python"));
        assert_eq!(lang, Language::Py);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn falls_back_to_detection_when_hint_unrecognized() {
        let (lang, _) = validate_code("fn main() { let v = vec![1]; }", Some("esperanto"));
        assert_eq!(lang, Language::Rs);
    }

    #[test]
    fn unknown_language_skips_checks() {
        let (lang, diags) = validate_code("just some prose", None);
        assert_eq!(lang, Language::Unknown);
        assert!(diags.is_empty());
    }
}
