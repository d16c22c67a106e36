// SPDX-License-Identifier: MIT

/// Extract fenced triple-backtick code blocks from a model response. If no
/// fences are present, the whole response is treated as code.
pub fn extract_code_blocks(response: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut lines = response.lines().peekable();
    let mut in_block = false;
    let mut current = String::new();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            if in_block {
                blocks.push(std::mem::take(&mut current));
                in_block = false;
            } else {
                in_block = true;
            }
            continue;
        }
        if in_block {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    // Unterminated fence: still return what was captured.
    if in_block && !current.is_empty() {
        blocks.push(current);
    }

    if blocks.is_empty() {
        vec![response.trim().to_string()]
    } else {
        blocks
    }
}
