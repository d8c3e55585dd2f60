//! Normalized validation diagnostics.

use serde::{Deserialize, Serialize};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Tool that produced a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSource {
    Lint,
    Format,
    Parse,
    Compiler,
    Typecheck,
    Structure,
    Toolchain,
}

impl DiagnosticSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticSource::Lint => "lint",
            DiagnosticSource::Format => "format",
            DiagnosticSource::Parse => "parse",
            DiagnosticSource::Compiler => "compiler",
            DiagnosticSource::Typecheck => "typecheck",
            DiagnosticSource::Structure => "structure",
            DiagnosticSource::Toolchain => "toolchain",
        }
    }
}

/// Validator stage a diagnostic was recorded in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lint,
    Format,
    Parse,
    Static,
    Interactive,
    Typecheck,
    Structure,
}

/// A single normalized diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    /// Severity level.
    pub severity: Severity,

    /// Which tool produced this diagnostic.
    pub source: DiagnosticSource,

    /// Human-readable message.
    pub message: String,

    /// Line number (1-indexed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    /// Column number (1-indexed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    /// Rule identifier reported by the tool (e.g. "no-unused-vars").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
}

impl Diagnostic {
    /// Create a new diagnostic.
    pub fn new(severity: Severity, source: DiagnosticSource, message: impl Into<String>) -> Self {
        Self {
            severity,
            source,
            message: message.into(),
            line: None,
            column: None,
            rule: None,
            phase: None,
        }
    }

    pub fn error(source: DiagnosticSource, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, source, message)
    }

    pub fn warning(source: DiagnosticSource, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, source, message)
    }

    pub fn info(source: DiagnosticSource, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, source, message)
    }

    /// Set line/column, ignoring absent values.
    pub fn at(mut self, line: Option<u32>, column: Option<u32>) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    /// Set the tool rule identifier.
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Tag the diagnostic with a validator phase.
    pub fn in_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Key used to de-duplicate merged diagnostic lists.
    pub fn dedupe_key(&self) -> (DiagnosticSource, &str, Option<u32>) {
        (self.source, self.message.as_str(), self.line)
    }

    /// One-line rendering used in prompts and logs.
    pub fn summary_line(&self) -> String {
        let location = match (self.line, self.column) {
            (Some(l), Some(c)) => format!(" at {l}:{c}"),
            (Some(l), None) => format!(" at line {l}"),
            _ => String::new(),
        };
        let rule = self
            .rule
            .as_deref()
            .map(|r| format!(" ({r})"))
            .unwrap_or_default();
        format!(
            "[{}]{} {}{}",
            self.source.as_str(),
            location,
            self.message,
            rule
        )
    }
}

/// Count error-severity diagnostics.
pub fn error_count(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| d.is_error()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn test_serde_uses_snake_case_ids() {
        let diag = Diagnostic::error(DiagnosticSource::Compiler, "Unexpected token")
            .at(Some(3), Some(7))
            .in_phase(Phase::Interactive);
        let json = serde_json::to_value(&diag).expect("serialize");
        assert_eq!(json["severity"], "error");
        assert_eq!(json["source"], "compiler");
        assert_eq!(json["phase"], "interactive");
        assert!(json.get("rule").is_none());
    }

    #[test]
    fn test_summary_line_includes_location_and_rule() {
        let diag = Diagnostic::warning(DiagnosticSource::Lint, "'x' is unused")
            .at(Some(4), Some(2))
            .with_rule("no-unused-vars");
        assert_eq!(
            diag.summary_line(),
            "[lint] at 4:2 'x' is unused (no-unused-vars)"
        );
    }

    #[test]
    fn test_dedupe_key_ignores_column_and_rule() {
        let a = Diagnostic::error(DiagnosticSource::Typecheck, "bad").at(Some(1), Some(1));
        let b = Diagnostic::error(DiagnosticSource::Typecheck, "bad")
            .at(Some(1), Some(9))
            .with_rule("ts2322");
        assert_eq!(a.dedupe_key(), b.dedupe_key());
        assert_eq!(error_count(&[a, b]), 2);
    }
}
