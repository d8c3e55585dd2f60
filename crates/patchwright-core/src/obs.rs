//! Structured observability hooks for repair and compile lifecycle events.
//!
//! This module provides:
//! - Repair-scoped tracing spans via the `RepairSpan` RAII guard
//! - Emission functions for key lifecycle events
//!
//! Events are emitted at `info!` level, degraded paths at `warn!`. Filter with
//! `RUST_LOG`; the daemon switches to JSON lines with `--log-json`.

use tracing::{info, warn};

/// RAII guard that enters a repair-scoped span for one file.
///
/// Only hold it across synchronous sections; async code should use
/// [`RepairSpan::span`] with `tracing::Instrument`.
pub struct RepairSpan {
    _span: tracing::span::EnteredSpan,
}

impl RepairSpan {
    /// Create and enter a span tagged with the filename.
    pub fn enter(filename: &str) -> Self {
        Self {
            _span: Self::span(filename).entered(),
        }
    }

    /// The span itself, for instrumenting futures.
    pub fn span(filename: &str) -> tracing::Span {
        tracing::info_span!("patchwright.repair", filename = %filename)
    }
}

pub fn emit_repair_started(filename: &str, max_passes: u32, persisted: bool) {
    info!(
        event = "repair.started",
        filename = %filename,
        max_passes = max_passes,
        persisted = persisted,
    );
}

/// Emit event: one diagnose → patch → revalidate pass finished.
pub fn emit_pass_completed(filename: &str, pass: u32, errors_before: usize, errors_after: usize) {
    info!(
        event = "repair.pass_completed",
        filename = %filename,
        pass = pass,
        errors_before = errors_before,
        errors_after = errors_after,
    );
}

pub fn emit_repair_finished(filename: &str, passes: u32, remaining_errors: usize, provenance: &str) {
    info!(
        event = "repair.finished",
        filename = %filename,
        passes = passes,
        remaining_errors = remaining_errors,
        provenance = %provenance,
    );
}

pub fn emit_catalog_fallback(filename: &str, component: &str, accepted: bool) {
    info!(
        event = "repair.catalog_fallback",
        filename = %filename,
        component = %component,
        accepted = accepted,
    );
}

/// Emit event: compile request served (executed, fallback or cached).
pub fn emit_compile_finished(digest: &str, executed: bool, stubs: usize, cached: bool) {
    info!(
        event = "compile.finished",
        digest = %digest,
        executed = executed,
        stubs = stubs,
        cached = cached,
    );
}

/// Emit event: execution skipped and the labelled code-block preview used.
pub fn emit_sandbox_fallback(reason: &str) {
    warn!(event = "sandbox.fallback", reason = %reason);
}

pub fn emit_bundle_swept(removed: usize, remaining: usize) {
    info!(event = "bundles.swept", removed = removed, remaining = remaining);
}

/// Emit event: project store write failed; the in-memory result is kept.
pub fn emit_persistence_error(filename: &str, operation: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "repair.persistence_error",
        filename = %filename,
        operation = %operation,
        error = %error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_span_create() {
        let _span = RepairSpan::enter("App.svelte");
    }
}
