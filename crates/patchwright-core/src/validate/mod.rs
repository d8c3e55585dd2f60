//! Multi-stage validator: lint → format → compile → hazard scan, per file.
//!
//! Every stage is isolated. A stage that fails records a diagnostic, and a
//! stage that panics is caught and recorded the same way, so later stages and
//! other files always run and every [`ValidationResult`] field is populated.

mod stages;

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Diagnostic, DiagnosticSource, FileKind, Phase, ValidationResult};
use crate::structural::hazard_diagnostics;
use crate::toolchain::{Toolchain, Tools};
use crate::tools::{CompileMode, FormatJob, TemplateCompiler, ToolError};

pub(crate) use stages::tool_failure;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Run one batched format pass over all files before the per-file stages.
    pub pre_format: bool,
    /// Report hazardous API use as warnings.
    pub scan_hazards: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            pre_format: true,
            scan_hazards: true,
        }
    }
}

pub struct Validator {
    toolchain: Arc<Toolchain>,
    compiler: Option<Arc<dyn TemplateCompiler>>,
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(toolchain: Arc<Toolchain>, compiler: Option<Arc<dyn TemplateCompiler>>) -> Self {
        Self {
            toolchain,
            compiler,
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate a set of files, keyed by path.
    pub async fn validate(
        &self,
        files: &BTreeMap<String, String>,
    ) -> BTreeMap<String, ValidationResult> {
        let tools = self.toolchain.get().await;
        let mut preformatted = match (&tools, self.config.pre_format) {
            (Ok(tools), true) => self.pre_format(tools, files).await,
            _ => BTreeMap::new(),
        };

        let mut results = BTreeMap::new();
        for (path, content) in files {
            let input = preformatted.remove(path);
            let result = self.validate_one(&tools, path, content, input).await;
            debug!(
                path = %path,
                errors = result.error_count(),
                diagnostics = result.diagnostics.len(),
                "file validated"
            );
            results.insert(path.clone(), result);
        }
        results
    }

    /// Validate a single file without the batch pre-format pass.
    pub async fn validate_file(&self, path: &str, content: &str) -> ValidationResult {
        let tools = self.toolchain.get().await;
        self.validate_one(&tools, path, content, None).await
    }

    /// Batched formatting. Any failure leaves files unformatted here; the
    /// per-file format stage still runs and reports problems.
    async fn pre_format(
        &self,
        tools: &Tools,
        files: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let jobs: Vec<FormatJob> = files
            .iter()
            .map(|(path, source)| FormatJob {
                path: path.clone(),
                parser: FileKind::from_path(path).formatter_parser(path).to_string(),
                source: source.clone(),
            })
            .collect();
        if jobs.is_empty() {
            return BTreeMap::new();
        }

        let outcome = AssertUnwindSafe(tools.formatter.format_batch(&jobs))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(results)) => jobs
                .into_iter()
                .zip(results)
                .filter_map(|(job, result)| result.ok().map(|text| (job.path, text)))
                .collect(),
            Ok(Err(err)) => {
                warn!(error = %err, "batch pre-format failed; using unformatted input");
                BTreeMap::new()
            }
            Err(_) => {
                warn!("batch pre-format panicked; using unformatted input");
                BTreeMap::new()
            }
        }
    }

    async fn validate_one(
        &self,
        tools: &Result<Tools, ToolError>,
        path: &str,
        content: &str,
        preformatted: Option<String>,
    ) -> ValidationResult {
        let kind = FileKind::from_path(path);
        let mut result = ValidationResult::pending(content, kind == FileKind::Component);
        let mut text = preformatted.unwrap_or_else(|| content.to_string());

        // (a) lint, or (d) parse validation for data files
        if kind == FileKind::Data {
            let found = isolated(Phase::Parse, async { stages::parse_data(&text) }).await;
            result.diagnostics.extend(flatten(found));
        } else if kind.is_lintable() {
            match tools {
                Ok(tools) => {
                    let outcome =
                        isolated(Phase::Lint, stages::lint(tools.linter.as_ref(), &text, path))
                            .await;
                    match outcome {
                        Ok(rewrite) => {
                            if let Some(fixed) = rewrite.text {
                                text = fixed;
                                result.fix_applied = true;
                            }
                            result.diagnostics.extend(rewrite.diagnostics);
                        }
                        Err(crash) => result.diagnostics.push(crash),
                    }
                }
                Err(err) => result.diagnostics.push(tool_failure(
                    DiagnosticSource::Toolchain,
                    Phase::Lint,
                    err,
                )),
            }
        }

        // (b) format
        match tools {
            Ok(tools) => {
                let parser = kind.formatter_parser(path);
                let outcome = isolated(
                    Phase::Format,
                    stages::format(tools.formatter.as_ref(), &text, parser),
                )
                .await;
                match outcome {
                    Ok(rewrite) => {
                        if let Some(formatted) = rewrite.text {
                            text = formatted;
                        }
                        result.diagnostics.extend(rewrite.diagnostics);
                    }
                    Err(crash) => result.diagnostics.push(crash),
                }
            }
            Err(err) => result.diagnostics.push(tool_failure(
                DiagnosticSource::Toolchain,
                Phase::Format,
                err,
            )),
        }

        // (c) compile components in both modes
        if kind == FileKind::Component {
            match &self.compiler {
                Some(compiler) => {
                    for mode in [CompileMode::Static, CompileMode::Interactive] {
                        let phase = compile_phase(mode);
                        let outcome = isolated(
                            phase,
                            stages::compile(compiler.as_ref(), &text, path, mode),
                        )
                        .await;
                        let (ok, found) = match outcome {
                            Ok(pair) => pair,
                            Err(crash) => (false, vec![crash]),
                        };
                        match mode {
                            CompileMode::Static => result.static_mode_ok = ok,
                            CompileMode::Interactive => result.interactive_mode_ok = ok,
                        }
                        result.diagnostics.extend(found);
                    }
                }
                None => result.diagnostics.push(
                    Diagnostic::info(
                        DiagnosticSource::Compiler,
                        "compile stage skipped: no template compiler configured",
                    )
                    .in_phase(Phase::Static),
                ),
            }
        }

        // (e) hazard scan
        if self.config.scan_hazards && matches!(kind, FileKind::Component | FileKind::Script) {
            let found = isolated(Phase::Structure, async { hazard_diagnostics(&text) }).await;
            result.diagnostics.extend(flatten(found));
        }

        result.formatted = text;
        result
    }
}

fn compile_phase(mode: CompileMode) -> Phase {
    match mode {
        CompileMode::Static => Phase::Static,
        CompileMode::Interactive => Phase::Interactive,
    }
}

fn phase_source(phase: Phase) -> DiagnosticSource {
    match phase {
        Phase::Lint => DiagnosticSource::Lint,
        Phase::Format => DiagnosticSource::Format,
        Phase::Parse => DiagnosticSource::Parse,
        Phase::Static | Phase::Interactive => DiagnosticSource::Compiler,
        Phase::Typecheck => DiagnosticSource::Typecheck,
        Phase::Structure => DiagnosticSource::Structure,
    }
}

/// Run one stage, turning a panic into an error diagnostic for that phase.
async fn isolated<F: Future>(phase: Phase, stage: F) -> Result<F::Output, Diagnostic> {
    AssertUnwindSafe(stage).catch_unwind().await.map_err(|panic| {
        let detail = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        warn!(?phase, %detail, "validator stage crashed");
        Diagnostic::error(phase_source(phase), format!("internal error in stage: {detail}"))
            .in_phase(phase)
    })
}

fn flatten(outcome: Result<Vec<Diagnostic>, Diagnostic>) -> Vec<Diagnostic> {
    outcome.unwrap_or_else(|crash| vec![crash])
}
