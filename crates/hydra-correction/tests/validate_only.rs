// SPDX-License-Identifier: MIT
use hydra_correction::{detect_language, extract_code_blocks, Language};

#[test]
fn validate_operation_input_is_code_without_a_prompt() {
    // The `validate` dispatcher operation runs the same extraction and
    // language-detection path as `code`, just without a generator call:
    // this pins down that behavior independent of the dispatcher crate.
    let code = "```python\ndef f():\n    return 1\n```";
    assert_eq!(detect_language(code), Language::Py);
    assert_eq!(extract_code_blocks(code), vec!["def f():\n    return 1".to_string()]);
}
