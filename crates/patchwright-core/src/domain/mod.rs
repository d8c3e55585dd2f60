//! Domain models for Patchwright.
//!
//! Canonical definitions shared by every stage:
//! - `SourceFile` / `FileKind`: a project file and how it is validated
//! - `Diagnostic`: one finding from a lint, format, compile or check stage
//! - `ValidationResult`: the per-file output of the validator

pub mod diagnostic;
pub mod error;
pub mod source;
pub mod validation;

pub use diagnostic::{Diagnostic, DiagnosticSource, Phase, Severity};
pub use error::{PatchwrightError, Result};
pub use source::{FileKind, SourceFile};
pub use validation::ValidationResult;
