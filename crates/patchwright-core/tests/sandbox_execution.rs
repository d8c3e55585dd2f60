//! End-to-end sandbox execution: resolver policy, runner controls and
//! refusal paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Map;

use patchwright_core::sandbox::{
    ExecutionInputs, LocalCompiler, ModuleGraph, ModuleOrigin, ModuleRunner, RenderedMarkup,
    ResolverPolicy, ResolverRule, Sandbox, SandboxConfig, SandboxError, SandboxResult,
};

const ENTRY: &str = "import { chunk } from 'lodash-es';\nimport { onMount } from 'svelte';\nimport Card from './Card.svelte';\nexport default { render: function () { return { html: '<p/>' }; } };\n";

struct NoCompiler;

#[async_trait]
impl LocalCompiler for NoCompiler {
    async fn compile_local(&self, _path: &str, source: &str) -> SandboxResult<String> {
        Ok(source.to_string())
    }
}

/// Fails with a runner fault `faults` times, then renders.
#[derive(Default)]
struct FlakyRunner {
    faults: u32,
    calls: AtomicU32,
    graph: Mutex<Option<ModuleGraph>>,
}

impl FlakyRunner {
    fn with_faults(faults: u32) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleRunner for FlakyRunner {
    async fn run(&self, graph: &ModuleGraph) -> SandboxResult<RenderedMarkup> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.graph.lock().unwrap() = Some(graph.clone());
        if n < self.faults {
            return Err(SandboxError::ExecutionFailed {
                attempts: 1,
                reason: "runner crashed".to_string(),
            });
        }
        Ok(RenderedMarkup {
            html: "<p>rendered</p>".to_string(),
            css: None,
            head: None,
        })
    }
}

fn fast_config(max_retries: u32, breaker_threshold: u32) -> SandboxConfig {
    SandboxConfig {
        timeout_ms: 1_000,
        max_retries,
        backoff_base_ms: 1,
        breaker_threshold,
    }
}

async fn execute(sandbox: &Sandbox, code: &str) -> SandboxResult<RenderedMarkup> {
    let dependencies = BTreeMap::from([(
        "./Card.svelte".to_string(),
        "export default {};\n".to_string(),
    )]);
    let stubs = BTreeMap::new();
    sandbox
        .execute(
            code,
            ExecutionInputs {
                dependencies: &dependencies,
                stubs: &stubs,
                compiler: &NoCompiler,
                props: Map::new(),
            },
        )
        .await
}

#[tokio::test]
async fn environment_packages_are_denied_by_default() {
    let runner = Arc::new(FlakyRunner::default());
    let sandbox = Sandbox::new(Some(runner.clone()), fast_config(0, 3));

    let out = execute(&sandbox, ENTRY).await.unwrap();
    assert_eq!(out.html, "<p>rendered</p>");

    let graph = runner.graph.lock().unwrap().clone().unwrap();
    assert_eq!(graph.modules["lodash-es"].origin, ModuleOrigin::Stub);
    assert_eq!(graph.modules["svelte"].origin, ModuleOrigin::Runtime);
    assert_eq!(graph.modules["Card.svelte"].origin, ModuleOrigin::Local);
}

#[tokio::test]
async fn allowed_packages_load_from_the_environment() {
    let runner = Arc::new(FlakyRunner::default());
    let policy = ResolverPolicy::default().with_rule(ResolverRule::allow("lodash-es"));
    let sandbox = Sandbox::new(Some(runner.clone()), fast_config(0, 3)).with_policy(policy);

    execute(&sandbox, ENTRY).await.unwrap();
    let graph = runner.graph.lock().unwrap().clone().unwrap();
    let lodash = &graph.modules["lodash-es"];
    assert_eq!(lodash.origin, ModuleOrigin::Environment);
    assert!(lodash.code.is_none(), "host modules ship no code");
}

#[tokio::test]
async fn runner_faults_are_retried_then_succeed() {
    let runner = Arc::new(FlakyRunner::with_faults(1));
    let sandbox = Sandbox::new(Some(runner.clone()), fast_config(1, 5));

    let out = execute(&sandbox, ENTRY).await.unwrap();
    assert_eq!(out.html, "<p>rendered</p>");
    assert_eq!(runner.calls(), 2);
    assert_eq!(sandbox.breaker().failure_count(), 0);
}

#[tokio::test]
async fn repeated_faults_open_the_breaker() {
    let runner = Arc::new(FlakyRunner::with_faults(u32::MAX));
    let sandbox = Sandbox::new(Some(runner.clone()), fast_config(0, 2));

    for _ in 0..2 {
        let err = execute(&sandbox, ENTRY).await.unwrap_err();
        assert!(matches!(err, SandboxError::ExecutionFailed { .. }));
    }
    let err = execute(&sandbox, ENTRY).await.unwrap_err();
    assert!(matches!(err, SandboxError::CircuitBreakerOpen { threshold: 2, .. }));
    assert!(err.is_degraded());
    assert_eq!(runner.calls(), 2);
}

#[tokio::test]
async fn hazardous_code_is_refused_before_running() {
    let runner = Arc::new(FlakyRunner::default());
    let sandbox = Sandbox::new(Some(runner.clone()), fast_config(0, 3));

    let err = execute(&sandbox, "const s = document.cookie;\nexport default {};\n")
        .await
        .unwrap_err();
    match err {
        SandboxError::HazardRefused { pattern, line } => {
            assert_eq!(pattern, "document.cookie");
            assert_eq!(line, 1);
        }
        other => panic!("expected HazardRefused, got {other:?}"),
    }
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn hazardous_dependencies_are_refused_before_running() {
    let runner = Arc::new(FlakyRunner::default());
    let sandbox = Sandbox::new(Some(runner.clone()), fast_config(0, 3));
    let dependencies = BTreeMap::from([(
        "./util.js".to_string(),
        "export const load = () => {\n  return eval('1 + 1');\n};\n".to_string(),
    )]);
    let stubs = BTreeMap::new();
    let err = sandbox
        .execute(
            "import { load } from './util.js';\nexport default { render: load };\n",
            ExecutionInputs {
                dependencies: &dependencies,
                stubs: &stubs,
                compiler: &NoCompiler,
                props: Map::new(),
            },
        )
        .await
        .unwrap_err();
    match err {
        SandboxError::HazardRefused { pattern, line } => {
            assert_eq!(pattern, "eval");
            assert_eq!(line, 2);
        }
        other => panic!("expected HazardRefused, got {other:?}"),
    }
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn disabled_sandbox_reports_unavailable() {
    let err = execute(&Sandbox::disabled(), ENTRY).await.unwrap_err();
    assert!(matches!(err, SandboxError::RunnerUnavailable(_)));
}

#[tokio::test]
async fn unparseable_modules_are_rewrite_errors() {
    let runner = Arc::new(FlakyRunner::default());
    let sandbox = Sandbox::new(Some(runner.clone()), fast_config(0, 3));
    let err = execute(&sandbox, "export default {{{;").await.unwrap_err();
    assert!(matches!(err, SandboxError::Rewrite(_)));
    assert_eq!(runner.calls(), 0);
}
