//! External collaborators reached through traits.
//!
//! The engine never links a linter, formatter, template compiler, type
//! checker or language model. Each is a trait here with a shipped adapter:
//! JSON-over-stdio subprocesses (`command`), a line-streaming type checker
//! (`typecheck`) and an OpenAI-compatible chat client (`llm`).

pub mod command;
pub mod llm;
pub mod process;
pub mod typecheck;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Diagnostic;

pub use command::{CommandCompiler, CommandFormatter, CommandLinter};
pub use llm::OpenAiPatchGenerator;
pub use process::CommandSpec;
pub use typecheck::CommandTypeChecker;

/// Failures of an external collaborator.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool is not installed, not configured or failed to start.
    #[error("{tool} unavailable: {reason}")]
    Unavailable { tool: String, reason: String },

    #[error("{tool} timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },

    /// The tool ran and rejected the input (syntax error, parse failure).
    #[error("{message}")]
    Rejected {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
    },

    /// The tool answered with something that is not its documented protocol.
    #[error("{tool} protocol error: {reason}")]
    Protocol { tool: String, reason: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    pub fn unavailable(tool: &str, reason: impl Into<String>) -> Self {
        ToolError::Unavailable {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        ToolError::Rejected {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Unavailable and timed-out tools degrade to `info` diagnostics.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            ToolError::Unavailable { .. } | ToolError::Timeout { .. }
        )
    }

    /// Source position of a rejection, if the tool reported one.
    pub fn position(&self) -> (Option<u32>, Option<u32>) {
        match self {
            ToolError::Rejected { line, column, .. } => (*line, *column),
            _ => (None, None),
        }
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        ToolError::Http(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Linter / Formatter
// ---------------------------------------------------------------------------

/// One message reported by the linter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LintMessage {
    /// ESLint-style numeric severity: 2 = error, 1 = warning, anything else = info.
    pub severity: u8,
    #[serde(default, rename = "ruleId")]
    pub rule: Option<String>,
    pub message: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintOutput {
    /// Auto-fixed text, when the linter changed anything.
    #[serde(default, alias = "output")]
    pub fixed_source: Option<String>,
    #[serde(default)]
    pub messages: Vec<LintMessage>,
}

#[async_trait]
pub trait Linter: Send + Sync {
    /// Lint `source` as if it lived at `virtual_path`, applying auto-fixes.
    async fn lint(&self, source: &str, virtual_path: &str) -> Result<LintOutput, ToolError>;
}

/// One entry of a batch format request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatJob {
    pub path: String,
    pub parser: String,
    pub source: String,
}

#[async_trait]
pub trait Formatter: Send + Sync {
    async fn format(&self, source: &str, parser: &str) -> Result<String, ToolError>;

    /// Format many files at once. Per-file failures are returned in place.
    async fn format_batch(
        &self,
        jobs: &[FormatJob],
    ) -> Result<Vec<Result<String, ToolError>>, ToolError> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            results.push(self.format(&job.source, &job.parser).await);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Template compiler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileMode {
    /// Server-side render path: produces an executable `render` module.
    Static,
    /// Client hydration module.
    Interactive,
}

impl CompileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompileMode::Static => "static",
            CompileMode::Interactive => "interactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledOutput {
    pub code: String,
    #[serde(default)]
    pub css: Option<String>,
}

/// Compiles markup components. Syntax errors are `ToolError::Rejected`.
#[async_trait]
pub trait TemplateCompiler: Send + Sync {
    async fn compile(
        &self,
        source: &str,
        mode: CompileMode,
        filename: &str,
    ) -> Result<CompiledOutput, ToolError>;
}

// ---------------------------------------------------------------------------
// Patch generator / type checker
// ---------------------------------------------------------------------------

/// Language-model style patcher. Its output is untrusted free text.
#[async_trait]
pub trait PatchGenerator: Send + Sync {
    async fn generate(&self, instructions: &str, context: &str) -> Result<String, ToolError>;
}

/// Structural/type checker run after revalidation when few errors remain.
///
/// Implementations enforce their own timeout and return partial results
/// plus a warning instead of failing on timeout.
#[async_trait]
pub trait TypeChecker: Send + Sync {
    async fn check(&self, filename: &str, source: &str) -> Result<Vec<Diagnostic>, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lint_output_accepts_eslint_field_names() {
        let raw = r#"{"output": "let a = 1;", "messages": [
            {"severity": 2, "ruleId": "no-undef", "message": "'b' is not defined", "line": 3, "column": 5}
        ]}"#;
        let out: LintOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(out.fixed_source.as_deref(), Some("let a = 1;"));
        assert_eq!(out.messages[0].rule.as_deref(), Some("no-undef"));
        assert_eq!(out.messages[0].line, Some(3));
    }

    #[test]
    fn degraded_errors() {
        assert!(ToolError::unavailable("lint", "not installed").is_degraded());
        assert!(ToolError::Timeout {
            tool: "lint".into(),
            timeout_ms: 10
        }
        .is_degraded());
        assert!(!ToolError::rejected("Unexpected token").is_degraded());
    }

    #[test]
    fn rejection_carries_position() {
        let err = ToolError::Rejected {
            message: "Unexpected token".into(),
            line: Some(2),
            column: Some(4),
        };
        assert_eq!(err.position(), (Some(2), Some(4)));
        assert_eq!(err.to_string(), "Unexpected token");
    }
}
