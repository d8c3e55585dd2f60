//! Capability-scoped module resolution.
//!
//! Every import of the entry module (and, transitively, of the local modules
//! it pulls in) is resolved by the first matching strategy:
//!
//! 1. framework runtime package, loaded by the runner;
//! 2. a dependency from the request, compiled on first use and memoized for
//!    the rest of the call;
//! 3. an environment package the [`ResolverPolicy`] allows, loaded by the
//!    runner;
//! 4. a stub: either a stub prepared by the compile-time stub pass or an
//!    inert module that answers every export with a no-op.

use std::collections::{BTreeMap, HashSet, VecDeque};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::capability::ModuleOrigin;
use super::closure::{close_module, ClosedModule, EXPORTS_PARAM, REQUIRE_PARAM};
use super::engine::evaluate_specifier;
use super::error::SandboxResult;
use super::graph::{ModuleGraph, ResolvedModule, ENTRY_SPECIFIER};
use super::policy::{PolicyVerdict, ResolverPolicy};
use super::refuse_hazards;
use crate::structural::escape_html;
use crate::syntax::js_string;

/// Prefix of virtual specifiers produced by the compile-time stub pass.
pub const STUB_PREFIX: &str = "pw-stub:";

/// Compiles request dependencies for execution.
#[async_trait]
pub trait LocalCompiler: Send + Sync {
    /// ES module text for the dependency at `path`.
    async fn compile_local(&self, path: &str, source: &str) -> SandboxResult<String>;
}

/// Whether `specifier` names a project-local module (`./`, `../`, `/` or
/// the `$lib/` alias) rather than a package.
pub fn is_local_specifier(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || specifier.starts_with("$lib/")
}

/// Normalize a dependency path or a specifier relative to `importer_dir`.
///
/// `./` and `../` segments are resolved, a leading `/` is dropped and the
/// `$lib/` alias is kept as an absolute root.
pub fn normalize(importer_dir: &str, specifier: &str) -> String {
    if specifier.starts_with("$lib/") {
        return collapse(specifier);
    }
    if let Some(rest) = specifier.strip_prefix('/') {
        return collapse(rest);
    }
    if specifier.starts_with("./") || specifier.starts_with("../") {
        if importer_dir.is_empty() {
            return collapse(specifier);
        }
        return collapse(&format!("{importer_dir}/{specifier}"));
    }
    specifier.to_string()
}

fn collapse(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn dir_of(key: &str) -> String {
    key.rsplit_once('/')
        .map(|(dir, _)| dir.to_string())
        .unwrap_or_default()
}

/// Placeholder rendered in place of a missing component.
pub fn placeholder_markup(name: &str) -> String {
    format!(
        "<div data-missing-dependency=\"{attr}\" style=\"border:1px dashed #c0392b;\
         padding:4px 8px;color:#c0392b;font:12px monospace\">missing component: {text}</div>",
        attr = escape_html(name),
        text = escape_html(name),
    )
}

/// Closed-form component that renders `markup` under either server API.
pub fn component_stub_code(markup: &str) -> String {
    format!(
        "(function ({REQUIRE_PARAM}, {EXPORTS_PARAM}) {{\n\
         const markup = {markup};\n\
         function Stub(payload) {{ if (payload && typeof payload.out === \"string\") {{ payload.out += markup; }} return markup; }}\n\
         Stub.$$render = function () {{ return markup; }};\n\
         Stub.render = function () {{ return {{ html: markup, css: {{ code: \"\", map: null }}, head: \"\" }}; }};\n\
         {EXPORTS_PARAM}.default = Stub;\n\
         }})",
        markup = js_string(markup),
    )
}

/// Closed-form module exporting a no-op for each of `bindings` and `default`.
pub fn script_stub_code(bindings: &[String]) -> String {
    let mut code = format!(
        "(function ({REQUIRE_PARAM}, {EXPORTS_PARAM}) {{\n\
         const inert = function () {{ return undefined; }};\n\
         {EXPORTS_PARAM}.default = inert;\n"
    );
    for name in bindings {
        code.push_str(&format!("{EXPORTS_PARAM}[{}] = inert;\n", js_string(name)));
    }
    code.push_str("})");
    code
}

/// Closed-form module whose every export is a no-op.
pub fn inert_module_code() -> String {
    format!(
        "(function ({REQUIRE_PARAM}, {EXPORTS_PARAM}) {{\n\
         const inert = function () {{ return undefined; }};\n\
         return new Proxy({{}}, {{ get: function (_, key) {{ return key === \"then\" ? undefined : inert; }} }});\n\
         }})"
    )
}

/// Where one import resolved to, before its code is materialized.
enum Target {
    Runtime(String),
    Local(String),
    Environment(String),
    Stub(String),
}

impl Target {
    fn key(&self) -> &str {
        match self {
            Target::Runtime(k) | Target::Local(k) | Target::Environment(k) | Target::Stub(k) => k,
        }
    }
}

/// Resolver for one compile call.
pub struct ModuleResolver<'a> {
    policy: &'a ResolverPolicy,
    /// Dependency sources keyed by normalized path.
    dependencies: BTreeMap<String, &'a str>,
    /// Closed-form stubs from the compile-time stub pass, by virtual specifier.
    stubs: &'a BTreeMap<String, String>,
    compiler: &'a dyn LocalCompiler,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(
        policy: &'a ResolverPolicy,
        dependencies: &'a BTreeMap<String, String>,
        stubs: &'a BTreeMap<String, String>,
        compiler: &'a dyn LocalCompiler,
    ) -> Self {
        Self {
            policy,
            dependencies: dependencies
                .iter()
                .map(|(path, source)| (normalize("", path), source.as_str()))
                .collect(),
            stubs,
            compiler,
        }
    }

    fn locate(&self, importer_dir: &str, specifier: &str) -> Target {
        if self.policy.is_runtime(specifier) {
            return Target::Runtime(specifier.to_string());
        }
        if specifier.starts_with(STUB_PREFIX) {
            return Target::Stub(specifier.to_string());
        }
        if is_local_specifier(specifier) {
            let key = normalize(importer_dir, specifier);
            let found = [
                key.clone(),
                format!("{key}.js"),
                format!("{key}.ts"),
                format!("{key}.svelte"),
            ]
            .into_iter()
            .find(|candidate| self.dependencies.contains_key(candidate));
            return match found {
                Some(key) => Target::Local(key),
                None => Target::Stub(key),
            };
        }
        match evaluate_specifier(self.policy, specifier) {
            PolicyVerdict::Allowed => Target::Environment(specifier.to_string()),
            PolicyVerdict::Denied { reason } => {
                debug!(specifier, %reason, "environment module denied; stubbing");
                Target::Stub(specifier.to_string())
            }
        }
    }

    fn stub_for(&self, key: &str) -> String {
        if let Some(code) = self.stubs.get(key) {
            return code.clone();
        }
        if key.ends_with(".svelte") {
            let name = key
                .rsplit('/')
                .next()
                .unwrap_or(key)
                .trim_end_matches(".svelte");
            return component_stub_code(&placeholder_markup(name));
        }
        inert_module_code()
    }

    /// Compile and close a request dependency. `Ok(None)` means it should be
    /// stubbed; a hazardous dependency refuses the whole graph.
    async fn materialize_local(&self, key: &str) -> SandboxResult<Option<ClosedModule>> {
        let Some(source) = self.dependencies.get(key) else {
            return Ok(None);
        };
        let code = if key.ends_with(".svelte") {
            match self.compiler.compile_local(key, source).await {
                Ok(code) => code,
                Err(err) => {
                    warn!(dependency = key, error = %err, "dependency failed to compile; stubbing");
                    return Ok(None);
                }
            }
        } else {
            (*source).to_string()
        };
        if let Err(err) = refuse_hazards(&code) {
            warn!(dependency = key, error = %err, "dependency refused");
            return Err(err);
        }
        match close_module(&code) {
            Ok(closed) => Ok(Some(closed)),
            Err(err) => {
                warn!(dependency = key, error = %err, "dependency rewrite failed; stubbing");
                Ok(None)
            }
        }
    }

    /// Resolve the entry module and everything it reaches.
    pub async fn build_graph(
        &self,
        entry: ClosedModule,
        props: serde_json::Map<String, serde_json::Value>,
    ) -> SandboxResult<ModuleGraph> {
        let mut graph = ModuleGraph {
            entry: ENTRY_SPECIFIER.to_string(),
            modules: BTreeMap::new(),
            props,
        };
        let mut seen: HashSet<String> = HashSet::from([ENTRY_SPECIFIER.to_string()]);
        let mut pending: VecDeque<(String, ModuleOrigin, ClosedModule)> =
            VecDeque::from([(ENTRY_SPECIFIER.to_string(), ModuleOrigin::Local, entry)]);

        while let Some((key, origin, closed)) = pending.pop_front() {
            let dir = if key == ENTRY_SPECIFIER {
                String::new()
            } else {
                dir_of(&key)
            };
            let mut links = BTreeMap::new();

            for specifier in &closed.imports {
                let target = self.locate(&dir, specifier);
                let target_key = target.key().to_string();
                links.insert(specifier.clone(), target_key.clone());
                if !seen.insert(target_key.clone()) {
                    continue;
                }
                match target {
                    Target::Runtime(k) => {
                        graph
                            .modules
                            .insert(k, ResolvedModule::host(ModuleOrigin::Runtime));
                    }
                    Target::Environment(k) => {
                        graph
                            .modules
                            .insert(k, ResolvedModule::host(ModuleOrigin::Environment));
                    }
                    Target::Local(k) => match self.materialize_local(&k).await? {
                        Some(dep) => pending.push_back((k, ModuleOrigin::Local, dep)),
                        None => {
                            let code = self.stub_for(&k);
                            graph
                                .modules
                                .insert(k, ResolvedModule::with_code(ModuleOrigin::Stub, code));
                        }
                    },
                    Target::Stub(k) => {
                        let code = self.stub_for(&k);
                        graph
                            .modules
                            .insert(k, ResolvedModule::with_code(ModuleOrigin::Stub, code));
                    }
                }
            }

            graph.modules.insert(
                key,
                ResolvedModule {
                    origin,
                    code: Some(closed.code),
                    links,
                },
            );
        }

        debug!(
            modules = graph.modules.len(),
            stubs = graph.count(ModuleOrigin::Stub),
            "module graph resolved"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::error::SandboxError;
    use crate::sandbox::policy::ResolverRule;

    struct EchoCompiler;

    #[async_trait]
    impl LocalCompiler for EchoCompiler {
        async fn compile_local(&self, path: &str, _source: &str) -> SandboxResult<String> {
            if path.contains("Broken") {
                return Err(SandboxError::Rewrite("nope".into()));
            }
            Ok(format!(
                "import {{ escape }} from 'svelte/internal';\nexport default {};",
                js_string(path)
            ))
        }
    }

    #[test]
    fn normalizes_relative_paths() {
        assert_eq!(normalize("", "./Button.svelte"), "Button.svelte");
        assert_eq!(normalize("lib/ui", "../Card.svelte"), "lib/Card.svelte");
        assert_eq!(normalize("lib", "/src/App.svelte"), "src/App.svelte");
        assert_eq!(normalize("x", "$lib/util.js"), "$lib/util.js");
        assert_eq!(normalize("x", "svelte/store"), "svelte/store");
    }

    #[test]
    fn local_specifiers() {
        assert!(is_local_specifier("./a"));
        assert!(is_local_specifier("../a"));
        assert!(is_local_specifier("/a"));
        assert!(is_local_specifier("$lib/a"));
        assert!(!is_local_specifier("svelte"));
    }

    #[test]
    fn placeholder_carries_marker_attribute() {
        let markup = placeholder_markup("Chart<x>");
        assert!(markup.contains("data-missing-dependency=\"Chart&lt;x&gt;\""));
        assert!(component_stub_code(&markup).contains("data-missing-dependency"));
    }

    #[tokio::test]
    async fn resolves_each_strategy() {
        let policy = ResolverPolicy::default().with_rule(ResolverRule::allow("clsx"));
        let deps = BTreeMap::from([
            ("./Button.svelte".to_string(), "<button/>".to_string()),
            ("./Broken.svelte".to_string(), "<p".to_string()),
            ("./format.js".to_string(), "export const fmt = (x) => x;".to_string()),
        ]);
        let stubs = BTreeMap::new();
        let resolver = ModuleResolver::new(&policy, &deps, &stubs, &EchoCompiler);

        let entry = close_module(
            "import Button from './Button.svelte';\n\
             import Broken from './Broken.svelte';\n\
             import { fmt } from './format';\n\
             import clsx from 'clsx';\n\
             import _ from 'lodash';\n\
             import Missing from './Missing.svelte';\n\
             export default 1;",
        )
        .unwrap();
        let graph = resolver
            .build_graph(entry, serde_json::Map::new())
            .await
            .unwrap();

        let origin = |k: &str| graph.modules.get(k).map(|m| m.origin);
        assert_eq!(origin(ENTRY_SPECIFIER), Some(ModuleOrigin::Local));
        assert_eq!(origin("Button.svelte"), Some(ModuleOrigin::Local));
        assert_eq!(origin("svelte/internal"), Some(ModuleOrigin::Runtime));
        assert_eq!(origin("Broken.svelte"), Some(ModuleOrigin::Stub));
        assert_eq!(origin("format.js"), Some(ModuleOrigin::Local));
        assert_eq!(origin("clsx"), Some(ModuleOrigin::Environment));
        assert_eq!(origin("lodash"), Some(ModuleOrigin::Stub));
        assert_eq!(origin("Missing.svelte"), Some(ModuleOrigin::Stub));

        let entry = &graph.modules[ENTRY_SPECIFIER];
        assert_eq!(entry.links["./format"], "format.js");
        let missing = graph.modules["Missing.svelte"].code.as_deref().unwrap();
        assert!(missing.contains("data-missing-dependency"));
    }

    #[tokio::test]
    async fn shared_dependencies_are_compiled_once() {
        let policy = ResolverPolicy::default();
        let deps = BTreeMap::from([
            (
                "lib/a.js".to_string(),
                "import b from './b.js'; export default b;".to_string(),
            ),
            (
                "lib/b.js".to_string(),
                "import a from './a.js'; export default 2;".to_string(),
            ),
        ]);
        let stubs = BTreeMap::new();
        let resolver = ModuleResolver::new(&policy, &deps, &stubs, &EchoCompiler);
        let entry = close_module(
            "import a from '/lib/a.js';\nimport b from './lib/b.js';\nexport default a + b;",
        )
        .unwrap();
        let graph = resolver
            .build_graph(entry, serde_json::Map::new())
            .await
            .unwrap();
        assert_eq!(graph.modules.len(), 3);
        assert_eq!(graph.modules["lib/b.js"].links["./a.js"], "lib/a.js");
    }

    #[tokio::test]
    async fn hazardous_dependency_refuses_the_graph() {
        let policy = ResolverPolicy::default();
        let deps = BTreeMap::from([(
            "./util.js".to_string(),
            "export const run = (s) => eval(s);".to_string(),
        )]);
        let stubs = BTreeMap::new();
        let resolver = ModuleResolver::new(&policy, &deps, &stubs, &EchoCompiler);
        let entry = close_module("import { run } from './util.js';\nexport default run;").unwrap();
        let err = resolver
            .build_graph(entry, serde_json::Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::HazardRefused { line: 1, .. }));
    }
}
