// SPDX-License-Identifier: MIT
use crate::language::Language;
use crate::types::Diagnostic;

/// Cheap, best-effort syntactic hints — never a substitute for the critic
/// pass. Unknown languages and languages with no check defined produce no
/// diagnostics rather than false positives.
pub fn check(language: Language, code: &str) -> Vec<Diagnostic> {
    let mut diagnostics = check_balanced_delimiters(code);
    match language {
        Language::Py => diagnostics.extend(check_python_indentation(code)),
        Language::Sh => diagnostics.extend(check_unmatched_quotes(code)),
        _ => {}
    }
    diagnostics
}

fn check_balanced_delimiters(code: &str) -> Vec<Diagnostic> {
    let mut stack = Vec::new();
    for ch in code.chars() {
        match ch {
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    '}' => '{',
                    _ => unreachable!(),
                };
                match stack.pop() {
                    Some(open) if open == expected => {}
                    Some(open) => {
                        return vec![Diagnostic {
                            kind: "unbalanced_delimiters".to_string(),
                            message: format!("expected closing for '{open}' but found '{ch}'"),
                        }]
                    }
                    None => {
                        return vec![Diagnostic {
                            kind: "unbalanced_delimiters".to_string(),
                            message: format!("unmatched closing '{ch}' with no matching opener"),
                        }]
                    }
                }
            }
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        vec![Diagnostic {
            kind: "unbalanced_delimiters".to_string(),
            message: format!("unclosed '{open}'"),
        }]
    } else {
        Vec::new()
    }
}

fn check_python_indentation(code: &str) -> Vec<Diagnostic> {
    for (idx, line) in code.lines().enumerate() {
        let leading: String = line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
        if leading.contains(' ') && leading.contains('\t') {
            return vec![Diagnostic {
                kind: "mixed_indentation".to_string(),
                message: format!("line {} mixes tabs and spaces in leading whitespace", idx + 1),
            }];
        }
    }
    Vec::new()
}

fn check_unmatched_quotes(code: &str) -> Vec<Diagnostic> {
    for quote in ['\'', '"'] {
        let count = code.chars().filter(|c| *c == quote).count();
        if count % 2 != 0 {
            return vec![Diagnostic {
                kind: "unmatched_quote".to_string(),
                message: format!("odd number of '{quote}' characters"),
            }];
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_code_has_no_diagnostics() {
        assert!(check(Language::Rs, "fn main() { let v = vec![1, 2]; }").is_empty());
    }

    #[test]
    fn detects_unclosed_brace() {
        let diags = check(Language::Rs, "fn main() { let v = vec![1, 2];");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, "unbalanced_delimiters");
    }

    #[test]
    fn detects_mixed_python_indentation() {
        let code = "def f():\n\t x = 1\n";
        let diags = check(Language::Py, code);
        assert!(diags.iter().any(|d| d.kind == "mixed_indentation"));
    }

    #[test]
    fn detects_unmatched_shell_quote() {
        let diags = check(Language::Sh, "echo \"unterminated");
        assert!(diags.iter().any(|d| d.kind == "unmatched_quote"));
    }

    #[test]
    fn unknown_language_gets_only_delimiter_checks() {
        let diags = check(Language::Unknown, "x = (1 + 2");
        assert_eq!(diags.len(), 1);
    }
}
