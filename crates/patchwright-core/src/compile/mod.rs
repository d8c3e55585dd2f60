//! Compile service: turns a component source into a rendered preview and a
//! retrievable interactive module.
//!
//! One `compile` call runs the stub pass, compiles twice (interactive, then
//! static), registers the interactive module as a runtime bundle, derives the
//! initial props and renders the static module in the sandbox. Sandbox
//! outages degrade to a labelled source preview; evaluation errors do not.
//!
//! # Modules
//!
//! - [`markup`] : script block and component tag lexer
//! - [`stubs`]  : `prepare()` stub injection, `DependencyStub`
//! - [`props`]  : `initial_props()` from declared parameters
//! - [`bundles`]: `TtlCache`, `RuntimeBundleRegistry`, `CompileCache`
//! - [`preview`]: `fallback_html()`

pub mod bundles;
pub mod markup;
pub mod preview;
pub mod props;
pub mod stubs;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn, Instrument};

use patchwright_state::ContentDigest;

use crate::metrics::METRICS;
use crate::obs;
use crate::repair::{Provenance, RepairLoop, RepairRequest};
use crate::sandbox::{ExecutionInputs, LocalCompiler, Sandbox, SandboxError, SandboxResult};
use crate::tools::{CompileMode, CompiledOutput, TemplateCompiler, ToolError};

pub use bundles::{CompileCache, RuntimeBundle, RuntimeBundleRegistry, TtlCache, TtlPolicy};
pub use stubs::{DependencyStub, PreparedSource};

/// Filename used when the request does not name one.
pub const DEFAULT_FILENAME: &str = "Component.svelte";

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid compile request: {0}")]
    InvalidRequest(String),

    #[error("syntax error: {message}")]
    Syntax {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
    },

    /// The compiled module threw while rendering.
    #[error("evaluation failed: {message}")]
    Evaluation { message: String },

    #[error("template compiler unavailable: {0}")]
    CompilerUnavailable(String),
}

impl From<ToolError> for CompileError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Rejected {
                message,
                line,
                column,
            } => CompileError::Syntax {
                message,
                line,
                column,
            },
            other => CompileError::CompilerUnavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Expiry of runtime bundles and cached results.
    pub ttl: TtlPolicy,
    /// Hand an interactive-compile syntax error to the repair loop once.
    pub repair_on_syntax_error: bool,
    /// Render through the sandbox; when off every preview is the fallback.
    pub execute: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            ttl: TtlPolicy::default(),
            repair_on_syntax_error: true,
            execute: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub source: String,
    /// Project-local modules keyed by path, e.g. `./Card.svelte`.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl CompileRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn with_dependency(mut self, path: impl Into<String>, source: impl Into<String>) -> Self {
        self.dependencies.insert(path.into(), source.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Cache key over every field that affects the output.
    pub fn digest(&self) -> ContentDigest {
        let mut material = String::with_capacity(self.source.len() + 64);
        material.push_str(self.filename.as_deref().unwrap_or(DEFAULT_FILENAME));
        material.push('\0');
        material.push_str(&self.source);
        for (path, source) in &self.dependencies {
            material.push('\0');
            material.push_str(path);
            material.push('\0');
            material.push_str(source);
        }
        ContentDigest::from_bytes(material.as_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOutput {
    /// Rendered markup, or the labelled source preview when not executed.
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    /// Interactive module text.
    pub code: String,
    #[serde(default)]
    pub stylesheet: Option<String>,
    /// Runtime bundle id of `code`.
    pub id: String,
    pub props: Map<String, Value>,
    pub stubs: Vec<DependencyStub>,
    pub executed: bool,
    /// Whether the delegated repair rewrote the source before compiling.
    pub repaired: bool,
}

/// Compiles dependency modules on demand for the sandbox resolver.
struct StaticModules<'a> {
    compiler: &'a dyn TemplateCompiler,
}

#[async_trait]
impl LocalCompiler for StaticModules<'_> {
    async fn compile_local(&self, path: &str, source: &str) -> SandboxResult<String> {
        let compiled = self
            .compiler
            .compile(source, CompileMode::Static, path)
            .await?;
        Ok(compiled.code)
    }
}

struct Rendered {
    html: String,
    head: Option<String>,
    css: Option<String>,
    executed: bool,
}

pub struct CompileService {
    compiler: Arc<dyn TemplateCompiler>,
    sandbox: Arc<Sandbox>,
    repair: Option<Arc<RepairLoop>>,
    bundles: Arc<RuntimeBundleRegistry>,
    cache: CompileCache,
    config: CompileConfig,
}

impl CompileService {
    pub fn new(compiler: Arc<dyn TemplateCompiler>) -> Self {
        let config = CompileConfig::default();
        Self {
            compiler,
            sandbox: Arc::new(Sandbox::disabled()),
            repair: None,
            bundles: Arc::new(RuntimeBundleRegistry::new(config.ttl)),
            cache: CompileCache::new(config.ttl),
            config,
        }
    }

    pub fn with_sandbox(mut self, sandbox: Sandbox) -> Self {
        self.sandbox = Arc::new(sandbox);
        self
    }

    pub fn with_repair(mut self, repair: Arc<RepairLoop>) -> Self {
        self.repair = Some(repair);
        self
    }

    /// Share a bundle registry with other services (e.g. the HTTP layer).
    pub fn with_bundles(mut self, bundles: Arc<RuntimeBundleRegistry>) -> Self {
        self.bundles = bundles;
        self
    }

    /// Replaces the config. The result cache and the bundle registry are
    /// rebuilt under its TTL, so call [`Self::with_bundles`] afterwards to
    /// share a registry.
    pub fn with_config(mut self, config: CompileConfig) -> Self {
        self.cache = CompileCache::new(config.ttl);
        self.bundles = Arc::new(RuntimeBundleRegistry::new(config.ttl));
        self.config = config;
        self
    }

    pub fn bundles(&self) -> &Arc<RuntimeBundleRegistry> {
        &self.bundles
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Drop cached results and registered bundles.
    pub fn reset(&self) {
        self.cache.reset();
        self.bundles.reset();
    }

    pub async fn compile(&self, request: CompileRequest) -> Result<CompileOutput, CompileError> {
        if request.source.trim().is_empty() {
            return Err(CompileError::InvalidRequest(
                "source is required".to_string(),
            ));
        }
        let digest = request.digest();
        let span = tracing::info_span!("compile", digest = %digest.short());
        self.compile_inner(request, digest).instrument(span).await
    }

    async fn compile_inner(
        &self,
        request: CompileRequest,
        digest: ContentDigest,
    ) -> Result<CompileOutput, CompileError> {
        if let Some(hit) = self.cache.get(digest.as_str()) {
            // The bundle may have expired or been swept while the result
            // stayed cached; ids are content digests so this restores it.
            self.bundles.register(&hit.code);
            obs::emit_compile_finished(digest.as_str(), hit.executed, hit.stubs.len(), true);
            return Ok(hit);
        }

        let filename = request.filename.as_deref().unwrap_or(DEFAULT_FILENAME);
        let (source, prepared, interactive, repaired) =
            self.compile_interactive(filename, &request).await?;

        let static_out = self
            .compiler
            .compile(&prepared.source, CompileMode::Static, filename)
            .await?;

        let id = self.bundles.register(&interactive.code);
        let props = props::initial_props(&source);

        let rendered = self
            .render(&static_out, &source, &request.dependencies, &prepared, props.clone())
            .await?;

        let output = CompileOutput {
            html: rendered.html,
            head: rendered.head,
            code: interactive.code,
            stylesheet: static_out.css.or(interactive.css).or(rendered.css),
            id,
            props,
            stubs: prepared.stubs,
            executed: rendered.executed,
            repaired,
        };
        self.cache.insert(digest.as_str(), output.clone());
        obs::emit_compile_finished(
            digest.as_str(),
            output.executed,
            output.stubs.len(),
            false,
        );
        Ok(output)
    }

    /// Stub pass plus interactive compile. A syntax error is handed to the
    /// repair loop at most once before it is reported.
    async fn compile_interactive(
        &self,
        filename: &str,
        request: &CompileRequest,
    ) -> Result<(String, PreparedSource, CompiledOutput, bool), CompileError> {
        let mut source = request.source.clone();
        let mut repair_attempted = false;
        loop {
            let prepared = stubs::prepare(&source, &request.dependencies);
            match self
                .compiler
                .compile(&prepared.source, CompileMode::Interactive, filename)
                .await
            {
                Ok(compiled) => return Ok((source, prepared, compiled, repair_attempted)),
                Err(err @ ToolError::Rejected { .. }) if !repair_attempted => {
                    repair_attempted = true;
                    match self.delegate_repair(filename, &source, &err).await {
                        Some(fixed) => source = fixed,
                        None => return Err(err.into()),
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn delegate_repair(
        &self,
        filename: &str,
        source: &str,
        error: &ToolError,
    ) -> Option<String> {
        if !self.config.repair_on_syntax_error {
            return None;
        }
        let repair = self.repair.as_ref()?;
        debug!(error = %error, "interactive compile rejected; delegating to repair");
        let request = RepairRequest::inline(filename, source)
            .with_max_passes(1)
            .with_catalog(false);
        match repair.run(request).await {
            Ok(outcome) if outcome.provenance == Provenance::AiRepair => Some(outcome.fixed_code),
            Ok(outcome) => {
                debug!(
                    provenance = outcome.provenance.as_str(),
                    remaining = outcome.error_count(),
                    "delegated repair produced no fix"
                );
                None
            }
            Err(err) => {
                warn!(error = %err, "delegated repair failed");
                None
            }
        }
    }

    async fn render(
        &self,
        compiled: &CompiledOutput,
        source: &str,
        dependencies: &BTreeMap<String, String>,
        prepared: &PreparedSource,
        props: Map<String, Value>,
    ) -> Result<Rendered, CompileError> {
        if !self.config.execute {
            return Ok(fallback(source, "execution disabled"));
        }
        let modules = StaticModules {
            compiler: self.compiler.as_ref(),
        };
        let inputs = ExecutionInputs {
            dependencies,
            stubs: &prepared.stub_modules,
            compiler: &modules,
            props,
        };
        match self.sandbox.execute(&compiled.code, inputs).await {
            Ok(markup) => Ok(Rendered {
                html: markup.html,
                head: markup.head,
                css: markup.css,
                executed: true,
            }),
            Err(SandboxError::Evaluation { message }) => {
                Err(CompileError::Evaluation { message })
            }
            Err(err) => {
                METRICS.inc_sandbox_fallbacks();
                let reason = err.to_string();
                obs::emit_sandbox_fallback(&reason);
                Ok(fallback(source, &reason))
            }
        }
    }
}

fn fallback(source: &str, reason: &str) -> Rendered {
    Rendered {
        html: preview::fallback_html(source, reason),
        head: None,
        css: None,
        executed: false,
    }
}
