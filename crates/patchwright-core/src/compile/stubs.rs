//! Compile-time stub pass.
//!
//! Component tags with no import or local declaration get an import of a
//! virtual stub component, and imports of project-local modules missing from
//! the request's dependency map are pointed at virtual stubs. The compiler
//! never sees an unresolved reference and the sandbox resolves the virtual
//! specifiers to the stub modules prepared here.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use super::markup::{component_tags, instance_script, script_blocks};
use crate::sandbox::resolver::{
    component_stub_code, is_local_specifier, normalize, placeholder_markup, script_stub_code,
    STUB_PREFIX,
};
use crate::syntax::{self, child_of_kind, declared_names, has_token, js_string, string_value, text};

/// A reference replaced by a stub during one compile call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyStub {
    /// Binding the stub stands in for.
    pub identifier: String,
    /// Specifier the source asked for (empty for undeclared tags).
    pub origin_specifier: String,
    /// Markup rendered in place of a component; empty for script stubs.
    pub placeholder_markup: String,
}

/// Source ready for the template compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedSource {
    pub source: String,
    pub stubs: Vec<DependencyStub>,
    /// Closed-form stub modules keyed by virtual specifier.
    pub stub_modules: BTreeMap<String, String>,
}

/// One import statement of a script block.
struct ImportInfo {
    specifier: String,
    /// Absolute byte range of the specifier string literal.
    literal: std::ops::Range<usize>,
    default_local: Option<String>,
    /// Imported (not local) names of named imports.
    named: Vec<String>,
}

#[derive(Default)]
struct ScriptScan {
    bound: BTreeSet<String>,
    imports: Vec<ImportInfo>,
}

fn scan_script(script: &str, offset: usize, scan: &mut ScriptScan) {
    let Some(tree) = syntax::parse_script(script) else {
        return;
    };
    let src = script.as_bytes();
    let root = tree.root_node();
    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        match node.kind() {
            "import_statement" => {
                if let Some(info) = import_info(node, src, offset, &mut scan.bound) {
                    scan.imports.push(info);
                }
            }
            "export_statement" => {
                if let Some(decl) = node.child_by_field_name("declaration") {
                    bind_declaration(decl, src, &mut scan.bound);
                }
            }
            _ => bind_declaration(node, src, &mut scan.bound),
        }
    }
}

fn bind_declaration(node: Node, src: &[u8], bound: &mut BTreeSet<String>) {
    let mut names = Vec::new();
    declared_names(node, src, &mut names);
    bound.extend(names);
}

fn import_info(
    node: Node,
    src: &[u8],
    offset: usize,
    bound: &mut BTreeSet<String>,
) -> Option<ImportInfo> {
    let source = node.child_by_field_name("source")?;
    let mut info = ImportInfo {
        specifier: string_value(source, src),
        literal: offset + source.start_byte()..offset + source.end_byte(),
        default_local: None,
        named: Vec::new(),
    };
    let Some(clause) = child_of_kind(node, "import_clause") else {
        return Some(info);
    };
    let mut cursor = clause.walk();
    for part in clause.named_children(&mut cursor) {
        match part.kind() {
            "identifier" => {
                let local = text(part, src).to_string();
                bound.insert(local.clone());
                info.default_local = Some(local);
            }
            "namespace_import" => {
                if let Some(name) = child_of_kind(part, "identifier") {
                    bound.insert(text(name, src).to_string());
                }
            }
            "named_imports" => {
                let mut inner = part.walk();
                for spec in part.named_children(&mut inner) {
                    if spec.kind() != "import_specifier" || has_token(spec, "type") {
                        continue;
                    }
                    let Some(name) = spec.child_by_field_name("name") else {
                        continue;
                    };
                    let imported = string_value(name, src);
                    let local = spec
                        .child_by_field_name("alias")
                        .map(|a| text(a, src).to_string())
                        .unwrap_or_else(|| imported.clone());
                    bound.insert(local);
                    info.named.push(imported);
                }
            }
            _ => {}
        }
    }
    Some(info)
}

fn stem(specifier: &str) -> &str {
    let file = specifier.rsplit('/').next().unwrap_or(specifier);
    file.split('.').next().unwrap_or(file)
}

/// Whether `specifier` resolves to an entry of the dependency map.
fn is_provided(specifier: &str, dependencies: &BTreeSet<String>) -> bool {
    let key = normalize("", specifier);
    [
        key.clone(),
        format!("{key}.js"),
        format!("{key}.ts"),
        format!("{key}.svelte"),
    ]
    .iter()
    .any(|candidate| dependencies.contains(candidate))
}

/// Run the stub pass over a component source.
pub fn prepare(source: &str, dependencies: &BTreeMap<String, String>) -> PreparedSource {
    let provided: BTreeSet<String> = dependencies.keys().map(|k| normalize("", k)).collect();

    let mut scan = ScriptScan::default();
    for block in script_blocks(source) {
        let script = &source[block.content.clone()];
        scan_script(script, block.content.start, &mut scan);
    }

    let mut prepared = PreparedSource::default();
    let mut edits: Vec<(std::ops::Range<usize>, String)> = Vec::new();

    for import in &scan.imports {
        if !is_local_specifier(&import.specifier) || is_provided(&import.specifier, &provided) {
            continue;
        }
        let virtual_spec = format!("{STUB_PREFIX}{}", import.specifier);
        let identifier = import
            .default_local
            .clone()
            .unwrap_or_else(|| stem(&import.specifier).to_string());
        let (markup, code) = if import.specifier.ends_with(".svelte") {
            let markup = placeholder_markup(&identifier);
            let code = component_stub_code(&markup);
            (markup, code)
        } else {
            (String::new(), script_stub_code(&import.named))
        };
        prepared.stub_modules.insert(virtual_spec.clone(), code);
        prepared.stubs.push(DependencyStub {
            identifier,
            origin_specifier: import.specifier.clone(),
            placeholder_markup: markup,
        });
        edits.push((import.literal.clone(), js_string(&virtual_spec)));
    }

    let mut injected = String::new();
    let mut seen = BTreeSet::new();
    for tag in component_tags(source) {
        if scan.bound.contains(&tag.name) || !seen.insert(tag.name.clone()) {
            continue;
        }
        let virtual_spec = format!("{STUB_PREFIX}component/{}", tag.name);
        let markup = placeholder_markup(&tag.name);
        prepared
            .stub_modules
            .insert(virtual_spec.clone(), component_stub_code(&markup));
        injected.push_str(&format!(
            "\n  import {} from {};",
            tag.name,
            js_string(&virtual_spec)
        ));
        prepared.stubs.push(DependencyStub {
            identifier: tag.name,
            origin_specifier: String::new(),
            placeholder_markup: markup,
        });
    }

    let mut out = String::with_capacity(source.len() + injected.len() + 32);
    let mut insert_at = None;
    if !injected.is_empty() {
        match instance_script(source) {
            Some(block) => insert_at = Some(block.content.start),
            None => out.push_str(&format!("<script>{injected}\n</script>\n")),
        }
    }

    let mut at = 0;
    for (range, replacement) in edits {
        if let Some(pos) = insert_at.filter(|pos| *pos <= range.start) {
            out.push_str(&source[at..pos]);
            out.push_str(&injected);
            at = pos;
            insert_at = None;
        }
        out.push_str(&source[at..range.start]);
        out.push_str(&replacement);
        at = range.end;
    }
    if let Some(pos) = insert_at {
        out.push_str(&source[at..pos]);
        out.push_str(&injected);
        at = pos;
    }
    out.push_str(&source[at..]);

    prepared.source = out;
    prepared
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(paths: &[&str]) -> BTreeMap<String, String> {
        paths
            .iter()
            .map(|p| (p.to_string(), String::from("<p/>")))
            .collect()
    }

    #[test]
    fn undeclared_component_tag_gets_stub_import() {
        let source = "<script>\n  let count = 0;\n</script>\n\n<Chart values={[count]} />\n";
        let prepared = prepare(source, &BTreeMap::new());

        assert_eq!(prepared.stubs.len(), 1);
        assert_eq!(prepared.stubs[0].identifier, "Chart");
        assert!(prepared.stubs[0]
            .placeholder_markup
            .contains("data-missing-dependency=\"Chart\""));
        assert!(prepared
            .source
            .contains("import Chart from \"pw-stub:component/Chart\";"));
        assert!(prepared.source.contains("let count = 0;"));
        assert!(prepared.stub_modules.contains_key("pw-stub:component/Chart"));
    }

    #[test]
    fn missing_local_import_is_redirected() {
        let source = "<script>\n  import Card from './Card.svelte';\n  import { fmt, parse as p } from '$lib/format';\n  import Button from './Button.svelte';\n</script>\n<Card><Button /></Card>\n";
        let prepared = prepare(source, &deps(&["./Button.svelte"]));

        assert!(prepared
            .source
            .contains("import Card from \"pw-stub:./Card.svelte\";"));
        assert!(prepared
            .source
            .contains("from \"pw-stub:$lib/format\";"));
        assert!(prepared.source.contains("import Button from './Button.svelte';"));

        let ids: Vec<&str> = prepared.stubs.iter().map(|s| s.identifier.as_str()).collect();
        assert_eq!(ids, vec!["Card", "format"]);
        let script_stub = &prepared.stub_modules["pw-stub:$lib/format"];
        assert!(script_stub.contains("[\"fmt\"] = inert"));
        assert!(script_stub.contains("[\"parse\"] = inert"));
    }

    #[test]
    fn markup_only_component_gets_a_script_block() {
        let prepared = prepare("<Widget />", &BTreeMap::new());
        assert!(prepared.source.starts_with("<script>"));
        assert!(prepared.source.ends_with("<Widget />"));
        assert_eq!(prepared.stubs.len(), 1);
    }

    #[test]
    fn resolved_source_is_untouched() {
        let source = "<script>\n  import Card from './Card.svelte';\n  import { writable } from 'svelte/store';\n  const Local = null;\n</script>\n<Card /><Local />\n";
        let prepared = prepare(source, &deps(&["Card.svelte"]));
        assert_eq!(prepared.source, source);
        assert!(prepared.stubs.is_empty());
    }
}
