//! Candidate discovery for the extractor.
//!
//! Each function narrows raw model text down to a slice that may hold a JSON
//! value. None of them parse; parsing and root checks live in `mod.rs`.

/// Opening delimiter the patch prompts ask models to emit.
pub const START_DELIMITER: &str = "<<<JSON_START>>>";
/// Closing delimiter paired with [`START_DELIMITER`].
pub const END_DELIMITER: &str = "<<<JSON_END>>>";

/// Upper bound on opening braces considered by [`balanced_blocks`].
const MAX_BLOCK_STARTS: usize = 64;

/// Remove Markdown code-fence lines (```` ``` ```` and ```` ```json ````).
pub fn strip_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop preamble noise before the first `{` (or `[` when it comes first).
pub fn strip_preamble(text: &str) -> &str {
    let start = text.find(|c: char| c == '{' || c == '[');
    match start {
        Some(idx) => text[idx..].trim_end(),
        None => text.trim(),
    }
}

/// Content between both delimiters, when both are present in order.
pub fn delimited(text: &str) -> Option<&str> {
    let start = text.find(START_DELIMITER)? + START_DELIMITER.len();
    let end = text[start..].find(END_DELIMITER)? + start;
    Some(text[start..end].trim())
}

/// Salvage for truncated output: only the start delimiter is present, so
/// take the first `{` through the last `}` after it.
pub fn truncated_delimited(text: &str) -> Option<&str> {
    if text.contains(END_DELIMITER) {
        return None;
    }
    let after = text.find(START_DELIMITER)? + START_DELIMITER.len();
    let rest = &text[after..];
    let open = rest.find('{')?;
    let close = rest.rfind('}')?;
    (close > open).then(|| &rest[open..=close])
}

/// Depth-balanced `{...}` blocks, string-aware, longest first.
///
/// Blocks may nest; an inner block is still a candidate when its enclosing
/// block is malformed. Unbalanced openings are skipped.
pub fn balanced_blocks(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut blocks: Vec<&str> = text
        .match_indices('{')
        .take(MAX_BLOCK_STARTS)
        .filter_map(|(start, _)| matching_close(bytes, start).map(|end| &text[start..=end]))
        .collect();
    blocks.sort_by(|a, b| b.len().cmp(&a.len()));
    blocks.dedup();
    blocks
}

/// Index of the `}` closing the `{` at `start`, ignoring braces in strings.
fn matching_close(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_fences_removes_fence_lines_only() {
        let raw = "Here:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(strip_fences(raw), "Here:\n{\"a\": 1}\nDone.");
    }

    #[test]
    fn preamble_is_cut_at_first_structural_char() {
        assert_eq!(strip_preamble("Sure! {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_preamble("list: [1,2]"), "[1,2]");
        assert_eq!(strip_preamble("  nothing here "), "nothing here");
    }

    #[test]
    fn delimited_requires_both_markers() {
        let text = "x <<<JSON_START>>> {\"a\":1} <<<JSON_END>>> y";
        assert_eq!(delimited(text), Some("{\"a\":1}"));
        assert_eq!(delimited("<<<JSON_START>>>{\"a\":1}"), None);
    }

    #[test]
    fn truncated_salvage_spans_first_to_last_brace() {
        let text = "<<<JSON_START>>> {\"a\": {\"b\": 2}} and then the model stopped";
        assert_eq!(truncated_delimited(text), Some("{\"a\": {\"b\": 2}}"));
        assert_eq!(truncated_delimited("<<<JSON_START>>>{}<<<JSON_END>>>"), None);
    }

    #[test]
    fn balanced_blocks_ignore_braces_in_strings() {
        let text = r#"a {"x": "}{"} b {"y": {"z": 1}} c"#;
        let blocks = balanced_blocks(text);
        assert_eq!(blocks[0], r#"{"y": {"z": 1}}"#);
        assert!(blocks.contains(&r#"{"x": "}{"}"#));
        assert!(blocks.contains(&r#"{"z": 1}"#));
    }

    #[test]
    fn unbalanced_opening_is_skipped() {
        let blocks = balanced_blocks(r#"{"broken": {"ok": true}"#);
        assert_eq!(blocks, vec![r#"{"ok": true}"#]);
    }
}
