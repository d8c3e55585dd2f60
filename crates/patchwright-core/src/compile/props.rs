//! Initial render state from declared component parameters.
//!
//! Recognizes `export let name = <literal>;` and
//! `let { name = <literal>, ... } = $props();` in the instance script.
//! Parameters without a literal default are left out.

use serde_json::{Map, Number, Value};
use tree_sitter::Node;

use super::markup::instance_script;
use crate::syntax::{self, string_value, text};

pub fn initial_props(source: &str) -> Map<String, Value> {
    let mut props = Map::new();
    let Some(block) = instance_script(source) else {
        return props;
    };
    let script = &source[block.content];
    let Some(tree) = syntax::parse_script(script) else {
        return props;
    };
    let src = script.as_bytes();
    let root = tree.root_node();
    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        match node.kind() {
            "export_statement" => {
                if let Some(decl) = node.child_by_field_name("declaration") {
                    exported_lets(decl, src, &mut props);
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                rune_props(node, src, &mut props);
            }
            _ => {}
        }
    }
    props
}

fn exported_lets(decl: Node, src: &[u8], props: &mut Map<String, Value>) {
    if !matches!(decl.kind(), "lexical_declaration" | "variable_declaration") {
        return;
    }
    let mut cursor = decl.walk();
    for declarator in decl.named_children(&mut cursor) {
        let (Some(name), Some(value)) = (
            declarator.child_by_field_name("name"),
            declarator.child_by_field_name("value"),
        ) else {
            continue;
        };
        if name.kind() != "identifier" {
            continue;
        }
        if let Some(value) = literal(value, src) {
            props.insert(text(name, src).to_string(), value);
        }
    }
}

/// `let { a = 1, b: local = "x" } = $props();`
fn rune_props(decl: Node, src: &[u8], props: &mut Map<String, Value>) {
    let mut cursor = decl.walk();
    for declarator in decl.named_children(&mut cursor) {
        let (Some(pattern), Some(value)) = (
            declarator.child_by_field_name("name"),
            declarator.child_by_field_name("value"),
        ) else {
            continue;
        };
        let is_props_call = value.kind() == "call_expression"
            && value
                .child_by_field_name("function")
                .is_some_and(|f| text(f, src) == "$props");
        if pattern.kind() != "object_pattern" || !is_props_call {
            continue;
        }

        let mut inner = pattern.walk();
        for entry in pattern.named_children(&mut inner) {
            let (key, default) = match entry.kind() {
                "object_assignment_pattern" => (
                    entry.child_by_field_name("left"),
                    entry.child_by_field_name("right"),
                ),
                "pair_pattern" => {
                    let default = entry
                        .child_by_field_name("value")
                        .filter(|v| v.kind() == "assignment_pattern")
                        .and_then(|v| v.child_by_field_name("right"));
                    (entry.child_by_field_name("key"), default)
                }
                _ => continue,
            };
            let (Some(key), Some(default)) = (key, default) else {
                continue;
            };
            if let Some(value) = literal(default, src) {
                props.insert(string_value(key, src), value);
            }
        }
    }
}

/// JSON value of a literal expression; `None` for anything computed.
fn literal(node: Node, src: &[u8]) -> Option<Value> {
    let raw = text(node, src);
    match node.kind() {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        "null" => Some(Value::Null),
        "string" => Some(
            serde_json::from_str::<String>(raw)
                .map(Value::String)
                .unwrap_or_else(|_| Value::String(string_value(node, src))),
        ),
        "template_string" if !raw.contains("${") => {
            Some(Value::String(string_value(node, src)))
        }
        "number" => number(raw),
        "unary_expression" if raw.starts_with('-') => number(raw),
        "object" | "array" => serde_json::from_str(raw).ok(),
        "parenthesized_expression" => node.named_child(0).and_then(|n| literal(n, src)),
        _ => None,
    }
}

fn number(raw: &str) -> Option<Value> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace() && *c != '_').collect();
    if let Ok(int) = cleaned.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    cleaned
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn export_let_defaults() {
        let source = r#"<script>
  export let title = "Hello";
  export let count = 3;
  export let ratio = -0.5;
  export let open = false;
  export let items = [1, 2];
  export let config = { "dense": true };
  export let computed = make();
  export let required;
  let internal = 1;
</script>
<h1>{title}</h1>"#;
        let props = initial_props(source);
        assert_eq!(
            Value::Object(props),
            json!({
                "title": "Hello",
                "count": 3,
                "ratio": -0.5,
                "open": false,
                "items": [1, 2],
                "config": {"dense": true}
            })
        );
    }

    #[test]
    fn props_rune_defaults() {
        let source = r#"<script lang="ts">
  let { label = 'Save', size: s = 2, disabled = null, onclick } = $props();
  let { other = 1 } = somethingElse();
</script>
<button {disabled}>{label}</button>"#;
        let props = initial_props(source);
        assert_eq!(
            Value::Object(props),
            json!({"label": "Save", "size": 2, "disabled": null})
        );
    }

    #[test]
    fn no_script_means_no_props() {
        assert!(initial_props("<p>static</p>").is_empty());
    }
}
