//! Rewrite an ES module into the closed evaluation form
//! `(function (__pw_require, __pw_exports) { ... })`.
//!
//! Top-level `import` and `export` statements are replaced in place; every
//! other statement is left untouched. Type-only TypeScript imports and
//! exports are dropped.

use tree_sitter::Node;

use super::error::{SandboxError, SandboxResult};
use crate::syntax::{
    self, child_of_kind, declared_names, has_token, js_string, string_value, text,
};

pub const REQUIRE_PARAM: &str = "__pw_require";
pub const EXPORTS_PARAM: &str = "__pw_exports";

/// A module in closed form plus the specifiers it requires, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedModule {
    pub code: String,
    pub imports: Vec<String>,
}

pub fn close_module(code: &str) -> SandboxResult<ClosedModule> {
    let tree = syntax::parse_script(code)
        .ok_or_else(|| SandboxError::Rewrite("script grammar unavailable".to_string()))?;
    let root = tree.root_node();
    if let Some((line, column)) = syntax::first_error(root) {
        return Err(SandboxError::Rewrite(format!(
            "syntax error at {line}:{column}"
        )));
    }

    let src = code.as_bytes();
    let mut rewriter = Rewriter {
        src,
        imports: Vec::new(),
        next_binding: 0,
    };
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        let replacement = match node.kind() {
            "import_statement" => rewriter.import(node)?,
            "export_statement" => rewriter.export(node)?,
            _ => continue,
        };
        edits.push((node.start_byte(), node.end_byte(), replacement));
    }

    let mut body = String::with_capacity(code.len() + 64);
    let mut at = 0;
    for (start, end, replacement) in edits {
        body.push_str(&code[at..start]);
        body.push_str(&replacement);
        at = end;
    }
    body.push_str(&code[at..]);

    Ok(ClosedModule {
        code: format!("(function ({REQUIRE_PARAM}, {EXPORTS_PARAM}) {{\n{body}\n}})"),
        imports: rewriter.imports,
    })
}

struct Rewriter<'a> {
    src: &'a [u8],
    imports: Vec<String>,
    next_binding: usize,
}

impl Rewriter<'_> {
    /// `const __pw_mN = __pw_require("spec");`, returning the binding name.
    fn require(&mut self, spec: String, out: &mut String) -> String {
        let binding = format!("__pw_m{}", self.next_binding);
        self.next_binding += 1;
        out.push_str(&format!(
            "const {binding} = {REQUIRE_PARAM}({});",
            js_string(&spec)
        ));
        self.imports.push(spec);
        binding
    }

    fn source_of(&self, node: Node) -> SandboxResult<String> {
        node.child_by_field_name("source")
            .map(|s| string_value(s, self.src))
            .ok_or_else(|| {
                SandboxError::Rewrite(format!(
                    "unsupported import form: {}",
                    text(node, self.src)
                ))
            })
    }

    fn import(&mut self, node: Node) -> SandboxResult<String> {
        if has_token(node, "type") {
            return Ok(String::new());
        }
        let spec = self.source_of(node)?;
        let mut out = String::new();
        let module = self.require(spec, &mut out);

        let Some(clause) = child_of_kind(node, "import_clause") else {
            return Ok(out);
        };
        let mut cursor = clause.walk();
        for part in clause.named_children(&mut cursor) {
            match part.kind() {
                "identifier" => out.push_str(&format!(
                    " const {} = {module}.default;",
                    text(part, self.src)
                )),
                "namespace_import" => {
                    if let Some(name) = child_of_kind(part, "identifier") {
                        out.push_str(&format!(" const {} = {module};", text(name, self.src)));
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
                        let imported = string_value(name, self.src);
                        let local = spec
                            .child_by_field_name("alias")
                            .map(|a| text(a, self.src).to_string())
                            .unwrap_or_else(|| imported.clone());
                        out.push_str(&format!(
                            " const {local} = {module}[{}];",
                            js_string(&imported)
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }

    fn export(&mut self, node: Node) -> SandboxResult<String> {
        if has_token(node, "type") {
            return Ok(String::new());
        }

        if let Some(decl) = node.child_by_field_name("declaration") {
            if matches!(
                decl.kind(),
                "type_alias_declaration" | "interface_declaration"
            ) {
                return Ok(String::new());
            }
            let mut names = Vec::new();
            declared_names(decl, self.src, &mut names);
            let mut out = text(decl, self.src).to_string();
            if has_token(node, "default") {
                match names.first() {
                    Some(name) => out.push_str(&format!("\n{EXPORTS_PARAM}.default = {name};")),
                    None => {
                        out = format!("{EXPORTS_PARAM}.default = ({out});");
                    }
                }
            } else {
                for name in names {
                    out.push_str(&format!("\n{EXPORTS_PARAM}.{name} = {name};"));
                }
            }
            return Ok(out);
        }

        if let Some(value) = node.child_by_field_name("value") {
            return Ok(format!(
                "{EXPORTS_PARAM}.default = ({});",
                text(value, self.src)
            ));
        }

        let reexport = node.child_by_field_name("source").is_some();
        let mut out = String::new();
        let module = if reexport {
            let spec = self.source_of(node)?;
            Some(self.require(spec, &mut out))
        } else {
            None
        };

        if let Some(clause) = child_of_kind(node, "export_clause") {
            let mut cursor = clause.walk();
            for spec in clause.named_children(&mut cursor) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                let Some(name) = spec.child_by_field_name("name") else {
                    continue;
                };
                let local = string_value(name, self.src);
                let exported = spec
                    .child_by_field_name("alias")
                    .map(|a| string_value(a, self.src))
                    .unwrap_or_else(|| local.clone());
                let value = match &module {
                    Some(module) => format!("{module}[{}]", js_string(&local)),
                    None => local,
                };
                out.push_str(&format!(
                    " {EXPORTS_PARAM}[{}] = {value};",
                    js_string(&exported)
                ));
            }
            return Ok(out);
        }

        match module {
            Some(module) => {
                if let Some(ns) = child_of_kind(node, "namespace_export") {
                    let name = ns
                        .named_child(0)
                        .map(|n| string_value(n, self.src))
                        .unwrap_or_default();
                    out.push_str(&format!(
                        " {EXPORTS_PARAM}[{}] = {module};",
                        js_string(&name)
                    ));
                } else {
                    out.push_str(&format!(" Object.assign({EXPORTS_PARAM}, {module});"));
                }
                Ok(out)
            }
            None => Err(SandboxError::Rewrite(format!(
                "unsupported export form: {}",
                text(node, self.src)
            ))),
        }
    }
}
