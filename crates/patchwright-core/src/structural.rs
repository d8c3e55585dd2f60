//! Deterministic structural fixes and security hazard scanning.
//!
//! `cleanup` runs after every patch in the repair loop. Each fix only adds
//! an attribute or removes a repeated import, so applying it twice is the same
//! as applying it once and it cannot introduce new diagnostics.
//!
//! `scan_hazards` flags APIs that have no place in a previewed component.
//! The validator reports them as warnings; the sandbox refuses to execute a
//! module that contains any of them.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::compile::markup;
use crate::domain::{Diagnostic, DiagnosticSource, Phase};
use crate::syntax;

struct Patterns {
    alt_attr: Regex,
    rel_attr: Regex,
    blank_target: Regex,
    hazards: Vec<(&'static str, Regex)>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("structural pattern is a valid regex");
        Patterns {
            alt_attr: re(r"(?:^|\s)alt\s*=|\{alt\}"),
            rel_attr: re(r"(?:^|\s)rel\s*="),
            blank_target: re(r#"(?:^|\s)target\s*=\s*["']_blank["']"#),
            hazards: vec![
                ("eval", re(r"\beval\s*\(")),
                ("new Function", re(r"\bnew\s+Function\b")),
                ("document.cookie", re(r"\bdocument\s*\.\s*cookie\b")),
                ("web storage", re(r"\b(?:localStorage|sessionStorage)\b")),
                ("process.env", re(r"\bprocess\s*\.\s*env\b")),
                ("require", re(r"\brequire\s*\(")),
                ("child_process", re(r"\bchild_process\b")),
                ("XMLHttpRequest", re(r"\bXMLHttpRequest\b")),
                ("importScripts", re(r"\bimportScripts\b")),
            ],
        }
    })
}

/// Apply the idempotent structural fixes.
pub fn cleanup(source: &str) -> String {
    let p = patterns();

    let with_alt = amend_open_tags(source, "img", |attrs| {
        (!p.alt_attr.is_match(attrs)).then_some(r#" alt="""#)
    });
    let with_rel = amend_open_tags(&with_alt, "a", |attrs| {
        (p.blank_target.is_match(attrs) && !p.rel_attr.is_match(attrs))
            .then_some(r#" rel="noopener noreferrer""#)
    });

    drop_duplicate_imports(&with_rel)
}

/// Append the attribute `extra` picks for each `<name ...>` open tag, ahead
/// of its closing `>` or `/>`. Tag ends come from the markup scan, so a `>`
/// inside a quoted value or a `{...}` expression does not end the tag.
fn amend_open_tags(
    source: &str,
    name: &str,
    extra: impl Fn(&str) -> Option<&'static str>,
) -> String {
    let open = format!("<{name}");
    let mut out = String::with_capacity(source.len());
    let mut copied = 0;
    let mut from = 0;
    while let Some(found) = source[from..].find(&open) {
        let start = from + found;
        let attrs_start = start + open.len();
        from = attrs_start;
        let bounded = source[attrs_start..]
            .chars()
            .next()
            .is_some_and(|c| c.is_whitespace() || c == '>' || c == '/');
        if !bounded {
            continue;
        }
        let Some(end) = markup::tag_end(source, start) else {
            break;
        };
        let body = &source[attrs_start..end - 1];
        let attrs = body.trim_end();
        let attrs = attrs.strip_suffix('/').unwrap_or(attrs).trim_end();
        if let Some(attr) = extra(attrs) {
            let insert_at = attrs_start + attrs.len();
            out.push_str(&source[copied..insert_at]);
            out.push_str(attr);
            copied = insert_at;
        }
        from = end;
    }
    out.push_str(&source[copied..]);
    out
}

/// Remove `import` statements identical to an earlier one in the same
/// script. Statements are compared whole, with whitespace collapsed, so two
/// multi-line imports that only share a first line are both kept.
fn drop_duplicate_imports(source: &str) -> String {
    let blocks = markup::script_blocks(source);
    let regions: Vec<Range<usize>> = if !blocks.is_empty() {
        blocks.into_iter().map(|b| b.content).collect()
    } else if source.trim_start().starts_with('<') {
        return source.to_string();
    } else {
        vec![0..source.len()]
    };

    let mut drops: Vec<Range<usize>> = Vec::new();
    for region in regions {
        let script = &source[region.clone()];
        let Some(tree) = syntax::parse_script(script) else {
            continue;
        };
        let root = tree.root_node();
        let bytes = script.as_bytes();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            if node.kind() != "import_statement" || node.has_error() {
                continue;
            }
            let key = syntax::text(node, bytes)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if seen.insert(key) {
                continue;
            }
            let span = statement_lines(script, node.start_byte()..node.end_byte());
            drops.push(region.start + span.start..region.start + span.end);
        }
    }

    let mut out = String::with_capacity(source.len());
    let mut copied = 0;
    for span in drops {
        out.push_str(&source[copied..span.start]);
        copied = span.end;
    }
    out.push_str(&source[copied..]);
    out
}

/// Widen a statement to its whole lines when nothing else shares them.
fn statement_lines(script: &str, stmt: Range<usize>) -> Range<usize> {
    let line_start = script[..stmt.start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = script[stmt.end..]
        .find('\n')
        .map_or(script.len(), |i| stmt.end + i + 1);
    let alone = script[line_start..stmt.start].trim().is_empty()
        && script[stmt.end..line_end].trim().is_empty();
    if alone {
        line_start..line_end
    } else {
        stmt
    }
}

/// One flagged API use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hazard {
    pub pattern: &'static str,
    /// 1-indexed line of the match.
    pub line: u32,
}

/// Find uses of APIs a previewed component must not touch.
pub fn scan_hazards(source: &str) -> Vec<Hazard> {
    let mut found = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        for (name, re) in &patterns().hazards {
            if re.is_match(line) {
                found.push(Hazard {
                    pattern: name,
                    line: u32::try_from(idx + 1).unwrap_or(u32::MAX),
                });
            }
        }
    }
    found
}

/// Hazards as warning diagnostics for the validator.
pub fn hazard_diagnostics(source: &str) -> Vec<Diagnostic> {
    scan_hazards(source)
        .into_iter()
        .map(|h| {
            Diagnostic::warning(
                DiagnosticSource::Structure,
                format!("use of {} is not allowed in previewed components", h.pattern),
            )
            .at(Some(h.line), None)
            .with_rule(format!("hazard/{}", h.pattern.replace(' ', "-")))
            .in_phase(Phase::Structure)
        })
        .collect()
}

/// Escape text for HTML content and double-quoted attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
