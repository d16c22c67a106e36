// SPDX-License-Identifier: MIT
mod extract;
mod language;
mod loop_;
mod syntax_checks;
mod types;
mod validate;

pub use extract::extract_code_blocks;
pub use language::{detect_language, Language};
pub use loop_::{default_max_attempts, generate_with_correction};
pub use types::{CorrectionAction, CorrectionAttempt, CorrectionTrace, Diagnostic};
pub use validate::validate_code;
