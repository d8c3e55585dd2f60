//! Minimal markup lexer for component files.
//!
//! Finds `<script>` blocks (whose contents go to the script parser) and the
//! capitalized component tags used in the markup. `<style>` blocks and HTML
//! comments are skipped.

use std::ops::Range;

/// One `<script>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBlock {
    /// Byte range of the opening tag, `<script ...>`.
    pub open_tag: Range<usize>,
    /// Byte range of the contents between the tags.
    pub content: Range<usize>,
    /// `context="module"` (Svelte 4) or `module` (Svelte 5) script.
    pub is_module: bool,
}

/// A component tag in the markup, e.g. `<Chart` or `<Tabs.Item`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentTag {
    /// Binding the tag refers to (`Tabs` for `Tabs.Item`).
    pub name: String,
    pub offset: usize,
}

/// Byte offset of the next case-insensitive match of `needle` at or after `from`.
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || from >= hay.len() {
        return None;
    }
    (from..hay.len()).find(|&i| {
        hay.get(i..i + needle.len())
            .is_some_and(|window| window.eq_ignore_ascii_case(needle))
    })
}

/// End (exclusive) of the tag opened at `start`.
///
/// A `>` inside quotes or inside a `{...}` attribute expression does not
/// close the tag.
pub fn tag_end(source: &str, start: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    for (i, &b) in source.as_bytes().iter().enumerate().skip(start) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'' | b'`') => quote = Some(b),
            (None, b'{') => depth += 1,
            (None, b'}') => depth = depth.saturating_sub(1),
            (None, b'>') if depth == 0 => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Script and style elements, flagged `true` for scripts.
fn raw_elements(source: &str) -> Vec<(ScriptBlock, bool)> {
    let mut found = Vec::new();
    let mut at = 0;
    loop {
        let script = find_ci(source, "<script", at);
        let style = find_ci(source, "<style", at);
        let (start, tag, is_script) = match (script, style) {
            (Some(s), Some(t)) if t < s => (t, "</style", false),
            (Some(s), _) => (s, "</script", true),
            (None, Some(t)) => (t, "</style", false),
            (None, None) => break,
        };
        let name_len = if is_script { 7 } else { 6 };
        let boundary = source.as_bytes().get(start + name_len).copied();
        if !matches!(boundary, Some(b'>' | b' ' | b'\t' | b'\n' | b'\r' | b'/')) {
            at = start + name_len;
            continue;
        }
        let Some(open_end) = tag_end(source, start) else {
            break;
        };
        let open = &source[start..open_end];
        let close = find_ci(source, tag, open_end).unwrap_or(source.len());
        let is_module = open.contains("context=\"module\"")
            || open.contains("context='module'")
            || open
                .split(|c: char| c.is_whitespace() || c == '>')
                .any(|attr| attr == "module");
        found.push((
            ScriptBlock {
                open_tag: start..open_end,
                content: open_end..close,
                is_module,
            },
            is_script,
        ));
        at = tag_end(source, close).unwrap_or(source.len());
    }
    found
}

/// All `<script>` blocks in source order.
pub fn script_blocks(source: &str) -> Vec<ScriptBlock> {
    raw_elements(source)
        .into_iter()
        .filter_map(|(block, is_script)| is_script.then_some(block))
        .collect()
}

/// The instance (non-module) script block, if any.
pub fn instance_script(source: &str) -> Option<ScriptBlock> {
    script_blocks(source).into_iter().find(|b| !b.is_module)
}

/// Byte ranges holding markup: outside script, style and comments.
fn markup_ranges(source: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut at = 0;
    for (block, _) in raw_elements(source) {
        ranges.push(at..block.open_tag.start);
        at = tag_end(source, block.content.end).unwrap_or(source.len());
    }
    ranges.push(at..source.len());

    let mut without_comments = Vec::new();
    for range in ranges {
        let mut start = range.start;
        while let Some(open) = source[start..range.end].find("<!--").map(|i| i + start) {
            without_comments.push(start..open);
            start = source[open..range.end]
                .find("-->")
                .map(|i| open + i + 3)
                .unwrap_or(range.end);
        }
        without_comments.push(start..range.end);
    }
    without_comments
        .into_iter()
        .filter(|r| r.start < r.end)
        .collect()
}

/// Capitalized component tags used in the markup, in order of appearance.
pub fn component_tags(source: &str) -> Vec<ComponentTag> {
    let mut tags = Vec::new();
    for range in markup_ranges(source) {
        let segment = &source[range.clone()];
        let bytes = segment.as_bytes();
        for (i, _) in segment.match_indices('<') {
            if !bytes.get(i + 1).is_some_and(u8::is_ascii_uppercase) {
                continue;
            }
            let name: String = segment[i + 1..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || matches!(*c, '_' | '$' | '.'))
                .collect();
            let base = name.split('.').next().unwrap_or_default().to_string();
            tags.push(ComponentTag {
                name: base,
                offset: range.start + i,
            });
        }
    }
    tags
}
