//! Sandbox: executes compiled, untrusted component modules for preview.
//!
//! A compiled module is rewritten into a closed evaluation form, its imports
//! are resolved through a capability-scoped resolver (default-deny for
//! environment packages), and the resulting graph is executed by an isolated
//! runner under timeout, retry and circuit-breaker controls.
//!
//! # Modules
//!
//! - [`capability`]: `ModuleOrigin` (runtime, local, environment, stub)
//! - [`policy`]    : `ResolverRule`, `ResolverPolicy`
//! - [`engine`]    : `evaluate_specifier()` (first-match, default-deny)
//! - [`closure`]   : `close_module()` import/export rewrite
//! - [`resolver`]  : `ModuleResolver`, stub module synthesis
//! - [`graph`]     : `ModuleGraph`, `ResolvedModule`, `RenderedMarkup`
//! - [`runner`]    : `ModuleRunner`, `SubprocessRunner`
//! - [`execution`] : `SandboxConfig`, `CircuitBreaker`, `execute_with_controls()`
//! - [`error`]     : `SandboxError` / `SandboxResult`

pub mod capability;
pub mod closure;
pub mod engine;
pub mod error;
pub mod execution;
pub mod graph;
pub mod policy;
pub mod resolver;
pub mod runner;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::structural::scan_hazards;

pub use capability::ModuleOrigin;
pub use closure::{close_module, ClosedModule};
pub use engine::evaluate_specifier;
pub use error::{SandboxError, SandboxResult};
pub use execution::{execute_with_controls, CircuitBreaker, SandboxConfig};
pub use graph::{ModuleGraph, RenderedMarkup, ResolvedModule};
pub use policy::{PolicyVerdict, ResolverPolicy, ResolverRule};
pub use resolver::{LocalCompiler, ModuleResolver};
pub use runner::{ModuleRunner, SubprocessRunner};

/// Inputs of one execution besides the entry module itself.
pub struct ExecutionInputs<'a> {
    pub dependencies: &'a BTreeMap<String, String>,
    /// Closed-form stubs keyed by virtual specifier.
    pub stubs: &'a BTreeMap<String, String>,
    pub compiler: &'a dyn LocalCompiler,
    pub props: serde_json::Map<String, serde_json::Value>,
}

/// Runner plus the controls and policy it executes under.
pub struct Sandbox {
    runner: Option<Arc<dyn ModuleRunner>>,
    breaker: CircuitBreaker,
    config: SandboxConfig,
    policy: ResolverPolicy,
}

impl Sandbox {
    pub fn new(runner: Option<Arc<dyn ModuleRunner>>, config: SandboxConfig) -> Self {
        Self {
            runner,
            breaker: CircuitBreaker::new(config.breaker_threshold),
            config,
            policy: ResolverPolicy::default(),
        }
    }

    /// A sandbox that never executes anything.
    pub fn disabled() -> Self {
        Self::new(None, SandboxConfig::default())
    }

    pub fn with_policy(mut self, policy: ResolverPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.runner.is_some()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Render the compiled entry module `code`.
    pub async fn execute(
        &self,
        code: &str,
        inputs: ExecutionInputs<'_>,
    ) -> SandboxResult<RenderedMarkup> {
        let Some(runner) = &self.runner else {
            return Err(SandboxError::RunnerUnavailable(
                "no module runner configured".to_string(),
            ));
        };
        refuse_hazards(code)?;

        let entry = close_module(code)?;
        let resolver =
            ModuleResolver::new(&self.policy, inputs.dependencies, inputs.stubs, inputs.compiler);
        let graph = resolver.build_graph(entry, inputs.props).await?;

        execute_with_controls(&self.config, &self.breaker, || runner.run(&graph)).await
    }
}

/// Refuse module text that uses any hazardous API.
pub(crate) fn refuse_hazards(code: &str) -> SandboxResult<()> {
    match scan_hazards(code).into_iter().next() {
        Some(hazard) => Err(SandboxError::HazardRefused {
            pattern: hazard.pattern.to_string(),
            line: hazard.line,
        }),
        None => Ok(()),
    }
}
