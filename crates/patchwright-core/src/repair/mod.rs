//! Diagnostic-driven repair loop.
//!
//! One [`RepairLoop::run`] repairs exactly one file:
//!
//! ```text
//! VALIDATE ── no errors ──────────────────────────────▶ DONE
//!    │
//!    └─▶ DIAGNOSE ─▶ PATCH ─▶ STRUCTURAL_CLEANUP ─▶ REVALIDATE ─┐
//!           ▲                                                     │
//!           └──────────── errors left, passes left ───────────────┘
//! ```
//!
//! When the pass budget runs out with errors left, the loop may substitute a
//! known-good catalog component once; otherwise it returns the original
//! source with its diagnostics. The outcome always carries diagnostics.

pub mod catalog;
pub mod context;
pub mod memory;
pub mod patch;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn, Instrument};

use patchwright_state::{ProjectStore, RepairAuditRecord};

use crate::domain::diagnostic::error_count;
use crate::domain::{Diagnostic, DiagnosticSource, PatchwrightError, Phase, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::structural;
use crate::tools::{PatchGenerator, TypeChecker};
use crate::validate::{tool_failure, Validator};

pub use catalog::{ComponentCatalog, StaticCatalog};
pub use context::PatchContext;
pub use memory::RepairMemory;
pub use patch::{interpret_response, PatchProposal};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Bounds governing one repair run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepairPolicy {
    /// Patch passes before giving up.
    pub max_passes: u32,
    /// Upper bound on any per-request pass budget.
    pub pass_ceiling: u32,
    /// Error diagnostics shown to the patch generator per pass.
    pub max_diagnostics: usize,
    /// Run the type checker after revalidation only below this error count.
    pub typecheck_below: usize,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            max_passes: 3,
            pass_ceiling: 10,
            max_diagnostics: 20,
            typecheck_below: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// How the accepted source was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// A patch changed the source and the result validates.
    AiRepair,
    /// The input validated without any patch.
    ValidatedOriginal,
    /// A known-good catalog component replaced the file.
    Catalog,
    /// Repair failed; the input is returned with its diagnostics.
    Original,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::AiRepair => "ai-repair",
            Provenance::ValidatedOriginal => "validated-original",
            Provenance::Catalog => "catalog",
            Provenance::Original => "original",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRequest {
    pub filename: String,
    /// Inline source; when absent it is read from the project store.
    #[serde(default)]
    pub code: Option<String>,
    /// Enables persisted mode when present.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Overrides the policy's pass budget.
    #[serde(default)]
    pub max_passes: Option<u32>,
    #[serde(default = "default_true")]
    pub allow_catalog: bool,
    /// Extra memory entries merged after the stored ones.
    #[serde(default)]
    pub memory: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl RepairRequest {
    pub fn inline(filename: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            code: Some(code.into()),
            allow_catalog: true,
            ..Self::default()
        }
    }

    pub fn for_project(filename: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            project_id: Some(project_id.into()),
            allow_catalog: true,
            ..Self::default()
        }
    }

    pub fn with_max_passes(mut self, max_passes: u32) -> Self {
        self.max_passes = Some(max_passes);
        self
    }

    pub fn with_catalog(mut self, allow: bool) -> Self {
        self.allow_catalog = allow;
        self
    }
}

/// Audit entry for one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassRecord {
    pub pass: u32,
    pub errors_before: usize,
    pub errors_after: usize,
    /// Whether the patch (after cleanup) changed the source.
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOutcome {
    pub passes: u32,
    pub fixed_code: String,
    pub final_diagnostics: Vec<Diagnostic>,
    pub provenance: Provenance,
    pub records: Vec<PassRecord>,
    pub memory: Vec<String>,
}

impl RepairOutcome {
    pub fn error_count(&self) -> usize {
        error_count(&self.final_diagnostics)
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

pub struct RepairLoop {
    validator: Arc<Validator>,
    generator: Option<Arc<dyn PatchGenerator>>,
    catalog: Option<Arc<dyn ComponentCatalog>>,
    store: Option<Arc<dyn ProjectStore>>,
    type_checker: Option<Arc<dyn TypeChecker>>,
    policy: RepairPolicy,
}

/// Validated state of the working source.
struct Checked {
    text: String,
    diagnostics: Vec<Diagnostic>,
}

impl Checked {
    fn errors(&self) -> usize {
        error_count(&self.diagnostics)
    }
}

impl RepairLoop {
    pub fn new(validator: Arc<Validator>) -> Self {
        Self {
            validator,
            generator: None,
            catalog: None,
            store: None,
            type_checker: None,
            policy: RepairPolicy::default(),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn PatchGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ComponentCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ProjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_type_checker(mut self, checker: Arc<dyn TypeChecker>) -> Self {
        self.type_checker = Some(checker);
        self
    }

    pub fn with_policy(mut self, policy: RepairPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RepairPolicy {
        &self.policy
    }

    /// Whether a patch generator is configured.
    pub fn can_patch(&self) -> bool {
        self.generator.is_some()
    }

    /// Repair one file.
    ///
    /// Fails only for malformed requests or a missing stored file; every
    /// collaborator failure is absorbed into the outcome's diagnostics.
    pub async fn run(&self, request: RepairRequest) -> Result<RepairOutcome> {
        let span = obs::RepairSpan::span(&request.filename);
        self.run_inner(request).instrument(span).await
    }

    async fn run_inner(&self, request: RepairRequest) -> Result<RepairOutcome> {
        if request.filename.trim().is_empty() {
            return Err(PatchwrightError::InvalidRequest(
                "filename is required".to_string(),
            ));
        }
        let filename = request.filename.as_str();
        let persisted = self
            .store
            .as_ref()
            .zip(request.project_id.as_deref());
        let original = self.resolve_source(&request).await?;
        let requested = request.max_passes.unwrap_or(self.policy.max_passes);
        let max_passes = requested.min(self.policy.pass_ceiling);
        if max_passes < requested {
            debug!(filename, requested, max_passes, "pass budget clamped");
        }

        METRICS.inc_repairs();
        obs::emit_repair_started(filename, max_passes, persisted.is_some());

        let mut memory = match persisted {
            Some((store, project_id)) => match store.load_memory(project_id, filename).await {
                Ok(entries) => entries,
                Err(err) => {
                    obs::emit_persistence_error(filename, "load_memory", &err);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        memory.extend(request.memory.iter().cloned());
        let mut memory = RepairMemory::new(memory);

        // VALIDATE
        let initial = self.check(filename, &original, false).await;
        let mut current = Checked {
            text: initial.text.clone(),
            diagnostics: initial.diagnostics.clone(),
        };
        let mut records = Vec::new();
        let mut patched = false;
        let mut passes = 0u32;

        while current.errors() > 0 && passes < max_passes {
            passes += 1;
            let errors_before = current.errors();

            // DIAGNOSE
            let top: Vec<Diagnostic> = current
                .diagnostics
                .iter()
                .filter(|d| d.is_error())
                .take(self.policy.max_diagnostics)
                .cloned()
                .collect();

            // PATCH
            let proposal = self
                .propose(filename, &current.text, &top, &memory, passes, max_passes)
                .await;
            let candidate = proposal
                .as_ref()
                .map(|p| p.code.as_str())
                .filter(|code| code.trim() != current.text.trim());

            let Some(candidate) = candidate else {
                debug!(pass = passes, "patch was blank or unchanged; carrying source forward");
                records.push(PassRecord {
                    pass: passes,
                    errors_before,
                    errors_after: errors_before,
                    changed: false,
                    summary: None,
                });
                obs::emit_pass_completed(filename, passes, errors_before, errors_before);
                continue;
            };

            // STRUCTURAL_CLEANUP + REVALIDATE
            let cleaned = structural::cleanup(candidate);
            let changed = cleaned.trim() != current.text.trim();
            let summary = proposal.and_then(|p| p.summary);
            current = self.check(filename, &cleaned, true).await;

            if changed {
                patched = true;
                METRICS.inc_patches_applied();
                let note = summary.clone().or_else(|| {
                    top.first().map(|d| format!("fixed: {}", d.message))
                });
                if let Some(note) = note {
                    memory.remember(&note);
                }
            }
            records.push(PassRecord {
                pass: passes,
                errors_before,
                errors_after: current.errors(),
                changed,
                summary,
            });
            obs::emit_pass_completed(filename, passes, errors_before, current.errors());
        }

        let (fixed_code, final_diagnostics, provenance) = if current.errors() == 0 {
            let provenance = if patched {
                Provenance::AiRepair
            } else {
                Provenance::ValidatedOriginal
            };
            (current.text, current.diagnostics, provenance)
        } else if let Some(substitute) = self.catalog_fallback(filename, &request).await {
            (substitute.text, substitute.diagnostics, Provenance::Catalog)
        } else {
            (original, initial.diagnostics, Provenance::Original)
        };

        let outcome = RepairOutcome {
            passes,
            fixed_code,
            final_diagnostics,
            provenance,
            records,
            memory: memory.into_entries(),
        };

        if let Some((store, project_id)) = persisted {
            self.persist(store.as_ref(), project_id, filename, &outcome)
                .await;
        }
        obs::emit_repair_finished(
            filename,
            outcome.passes,
            outcome.error_count(),
            outcome.provenance.as_str(),
        );
        Ok(outcome)
    }

    async fn resolve_source(&self, request: &RepairRequest) -> Result<String> {
        if let Some(code) = &request.code {
            return Ok(code.clone());
        }
        let Some(project_id) = &request.project_id else {
            return Err(PatchwrightError::InvalidRequest(
                "either code or projectId is required".to_string(),
            ));
        };
        let Some(store) = &self.store else {
            return Err(PatchwrightError::InvalidRequest(
                "projectId given but no project store is configured".to_string(),
            ));
        };
        store
            .read_file(project_id, &request.filename)
            .await?
            .map(|record| record.content)
            .ok_or_else(|| PatchwrightError::FileNotFound {
                project_id: project_id.clone(),
                filename: request.filename.clone(),
            })
    }

    async fn propose(
        &self,
        filename: &str,
        source: &str,
        top: &[Diagnostic],
        memory: &RepairMemory,
        pass: u32,
        max_passes: u32,
    ) -> Option<PatchProposal> {
        let generator = self.generator.as_ref()?;
        let ctx = PatchContext {
            filename,
            source,
            diagnostics: top,
            memory: memory.prompt_text(),
            catalog_names: self
                .catalog
                .as_ref()
                .map(|c| c.names())
                .unwrap_or_default(),
            pass,
            max_passes,
        };

        METRICS.inc_patch_calls();
        match generator.generate(&ctx.instructions(), &ctx.render()).await {
            Ok(raw) => interpret_response(&raw),
            Err(err) => {
                warn!(pass, error = %err, "patch generator failed; pass is a no-op");
                None
            }
        }
    }

    /// Validate `text`; after a patch, also type-check when few errors remain.
    async fn check(&self, filename: &str, text: &str, after_patch: bool) -> Checked {
        let result = self.validator.validate_file(filename, text).await;
        let mut checked = Checked {
            text: result.formatted,
            diagnostics: result.diagnostics,
        };

        let checker = self.type_checker.as_ref().filter(|_| after_patch);
        if let Some(checker) = checker {
            if checked.errors() < self.policy.typecheck_below {
                let found = match checker.check(filename, &checked.text).await {
                    Ok(found) => found,
                    Err(err) => vec![tool_failure(
                        DiagnosticSource::Typecheck,
                        Phase::Typecheck,
                        &err,
                    )],
                };
                merge_diagnostics(&mut checked.diagnostics, found);
            }
        }
        checked
    }

    /// One catalog substitution, after the last pass only.
    async fn catalog_fallback(&self, filename: &str, request: &RepairRequest) -> Option<Checked> {
        if !request.allow_catalog {
            return None;
        }
        let catalog = self.catalog.as_ref()?;
        let Some(known_good) = catalog.lookup_path(filename) else {
            obs::emit_catalog_fallback(filename, "-", false);
            return None;
        };
        METRICS.inc_catalog_substitutions();
        let checked = self.check(filename, &known_good, true).await;
        obs::emit_catalog_fallback(filename, crate::domain::source::file_stem(filename), true);
        Some(checked)
    }

    async fn persist(
        &self,
        store: &dyn ProjectStore,
        project_id: &str,
        filename: &str,
        outcome: &RepairOutcome,
    ) {
        if let Err(err) = store
            .upsert_file(project_id, filename, &outcome.fixed_code)
            .await
        {
            obs::emit_persistence_error(filename, "upsert_file", &err);
        }
        if let Err(err) = store
            .save_memory(project_id, filename, outcome.memory.clone())
            .await
        {
            obs::emit_persistence_error(filename, "save_memory", &err);
        }
        let audit = RepairAuditRecord {
            project_id: project_id.to_string(),
            filename: filename.to_string(),
            passes: outcome.passes,
            final_error_count: u32::try_from(outcome.error_count()).unwrap_or(u32::MAX),
            provenance: outcome.provenance.as_str().to_string(),
            created_at: Utc::now(),
        };
        if let Err(err) = store.append_audit(audit).await {
            obs::emit_persistence_error(filename, "append_audit", &err);
        }
    }
}

/// Append `extra`, skipping entries already present by `(source, message, line)`.
pub fn merge_diagnostics(into: &mut Vec<Diagnostic>, extra: Vec<Diagnostic>) {
    let mut seen: HashSet<(DiagnosticSource, String, Option<u32>)> = into
        .iter()
        .map(|d| (d.source, d.message.clone(), d.line))
        .collect();
    for diag in extra {
        if seen.insert((diag.source, diag.message.clone(), diag.line)) {
            into.push(diag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults() {
        let policy = RepairPolicy::default();
        assert_eq!(policy.max_passes, 3);
        assert_eq!(policy.pass_ceiling, 10);
        assert_eq!(policy.max_diagnostics, 20);
        assert_eq!(policy.typecheck_below, 5);
    }

    #[test]
    fn provenance_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(Provenance::ValidatedOriginal).unwrap(),
            "validated-original"
        );
        assert_eq!(Provenance::AiRepair.as_str(), "ai-repair");
    }

    #[test]
    fn request_defaults_allow_catalog() {
        let req: RepairRequest =
            serde_json::from_str(r#"{"filename": "App.svelte", "code": "<p/>"}"#).unwrap();
        assert!(req.allow_catalog);
        assert!(req.max_passes.is_none());
    }

    #[test]
    fn merge_dedupes_by_source_message_line() {
        let mut base = vec![Diagnostic::error(DiagnosticSource::Typecheck, "bad").at(Some(1), None)];
        merge_diagnostics(
            &mut base,
            vec![
                Diagnostic::error(DiagnosticSource::Typecheck, "bad").at(Some(1), Some(4)),
                Diagnostic::error(DiagnosticSource::Typecheck, "bad").at(Some(2), None),
                Diagnostic::error(DiagnosticSource::Compiler, "bad").at(Some(1), None),
            ],
        );
        assert_eq!(base.len(), 3);
    }
}
