//! Script syntax helpers over the tree-sitter TypeScript grammar.
//!
//! Shared by the compile-time stub pass (component `<script>` blocks) and the
//! sandbox module rewrite (compiler output). The TypeScript grammar accepts
//! plain JavaScript, so one parser serves both.

use tree_sitter::{Node, Parser, Tree};

/// Parse script text. `None` only if the grammar cannot be loaded.
pub fn parse_script(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
        .ok()?;
    parser.parse(source, None)
}

/// 1-based position of the first syntax error under `node`.
pub fn first_error(node: Node) -> Option<(u32, u32)> {
    if !node.has_error() {
        return None;
    }
    if node.is_error() || node.is_missing() {
        let pos = node.start_position();
        return Some((to_u32(pos.row) + 1, to_u32(pos.column) + 1));
    }
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find_map(first_error);
    found.or_else(|| {
        let pos = node.start_position();
        Some((to_u32(pos.row) + 1, to_u32(pos.column) + 1))
    })
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Node text, empty when the node does not cover valid UTF-8.
pub fn text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or_default()
}

/// Value of a string literal node, quotes removed.
pub fn string_value(node: Node, source: &[u8]) -> String {
    let raw = text(node, source);
    let quote = |c: char| matches!(c, '"' | '\'' | '`');
    let inner = raw
        .strip_prefix(quote)
        .and_then(|s| s.strip_suffix(quote))
        .unwrap_or(raw);
    inner.to_string()
}

/// First direct child of `node` with the given kind.
pub fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|c| c.kind() == kind);
    found
}

/// Whether `node` has an anonymous token child spelled `token`.
pub fn has_token(node: Node, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|c| !c.is_named() && c.kind() == token);
    found
}

/// Names bound by a declaration node (`const`, `let`, `var`, `function`,
/// `class`), including names inside destructuring patterns.
pub fn declared_names(node: Node, source: &[u8], out: &mut Vec<String>) {
    match node.kind() {
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            for declarator in node.named_children(&mut cursor) {
                if let Some(name) = declarator.child_by_field_name("name") {
                    pattern_names(name, source, out);
                }
            }
        }
        "function_declaration"
        | "generator_function_declaration"
        | "class_declaration"
        | "abstract_class_declaration" => {
            if let Some(name) = node.child_by_field_name("name") {
                out.push(text(name, source).to_string());
            }
        }
        _ => {}
    }
}

/// Identifiers bound by a binding pattern.
pub fn pattern_names(node: Node, source: &[u8], out: &mut Vec<String>) {
    match node.kind() {
        "identifier" | "shorthand_property_identifier_pattern" => {
            out.push(text(node, source).to_string());
        }
        "pair_pattern" => {
            if let Some(value) = node.child_by_field_name("value") {
                pattern_names(value, source, out);
            }
        }
        "object_assignment_pattern" | "assignment_pattern" => {
            if let Some(left) = node.child_by_field_name("left") {
                pattern_names(left, source, out);
            }
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                pattern_names(child, source, out);
            }
        }
    }
}

/// JavaScript string literal for `value`.
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
