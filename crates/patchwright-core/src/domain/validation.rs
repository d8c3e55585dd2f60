//! Per-file validator output.

use serde::{Deserialize, Serialize};

use super::diagnostic::{error_count, Diagnostic};

/// Result of validating one file. Every field is always populated, even when
/// a stage failed internally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Input as received by the validator.
    pub original: String,
    /// Lint-fixed and formatted text (equals `original` when no stage changed it).
    pub formatted: String,
    /// Whether the linter's auto-fix changed the text.
    pub fix_applied: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub static_mode_ok: bool,
    pub interactive_mode_ok: bool,
}

impl ValidationResult {
    /// Starting point for a file: nothing changed, no findings.
    ///
    /// `compiles` is true for component files, whose mode flags only flip
    /// after a successful compile.
    pub fn pending(original: &str, compiles: bool) -> Self {
        Self {
            original: original.to_string(),
            formatted: original.to_string(),
            fix_applied: false,
            diagnostics: Vec::new(),
            static_mode_ok: !compiles,
            interactive_mode_ok: !compiles,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn error_count(&self) -> usize {
        error_count(&self.diagnostics)
    }

    pub fn is_clean(&self) -> bool {
        self.error_count() == 0
    }
}
