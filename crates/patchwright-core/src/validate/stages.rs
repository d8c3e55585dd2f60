//! Individual validator stages.
//!
//! Each stage takes the current text and returns what it found; none of them
//! mutate shared state, so the caller can isolate every stage on its own.

use serde_json::Value;

use crate::domain::{Diagnostic, DiagnosticSource, Phase, Severity};
use crate::tools::{CompileMode, Formatter, LintMessage, Linter, TemplateCompiler, ToolError};

/// Output of a stage that may rewrite the text.
#[derive(Debug, Default)]
pub(crate) struct Rewrite {
    pub text: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Rewrite {
    fn finding(diagnostic: Diagnostic) -> Self {
        Self {
            text: None,
            diagnostics: vec![diagnostic],
        }
    }
}

/// Map a collaborator failure: degraded tools are `info`, rejections `error`.
pub(crate) fn tool_failure(source: DiagnosticSource, phase: Phase, err: &ToolError) -> Diagnostic {
    let (line, column) = err.position();
    let severity = if err.is_degraded() {
        Severity::Info
    } else {
        Severity::Error
    };
    let message = if err.is_degraded() {
        format!("{} stage skipped: {err}", source.as_str())
    } else {
        err.to_string()
    };
    Diagnostic::new(severity, source, message)
        .at(line, column)
        .in_phase(phase)
}

pub(crate) fn lint_severity(level: u8) -> Severity {
    match level {
        2 => Severity::Error,
        1 => Severity::Warning,
        _ => Severity::Info,
    }
}

fn lint_diagnostic(msg: LintMessage) -> Diagnostic {
    let mut diag = Diagnostic::new(lint_severity(msg.severity), DiagnosticSource::Lint, msg.message)
        .at(msg.line, msg.column)
        .in_phase(Phase::Lint);
    if let Some(rule) = msg.rule {
        diag = diag.with_rule(rule);
    }
    diag
}

/// (a) lint with auto-fix.
pub(crate) async fn lint(linter: &dyn Linter, text: &str, path: &str) -> Rewrite {
    match linter.lint(text, path).await {
        Ok(output) => Rewrite {
            text: output.fixed_source.filter(|fixed| fixed != text),
            diagnostics: output.messages.into_iter().map(lint_diagnostic).collect(),
        },
        Err(err) => Rewrite::finding(tool_failure(DiagnosticSource::Lint, Phase::Lint, &err)),
    }
}

/// (b) format with the parser chosen for the file kind.
pub(crate) async fn format(formatter: &dyn Formatter, text: &str, parser: &str) -> Rewrite {
    match formatter.format(text, parser).await {
        Ok(formatted) => Rewrite {
            text: (formatted != text).then_some(formatted),
            diagnostics: Vec::new(),
        },
        Err(err) => Rewrite::finding(tool_failure(DiagnosticSource::Format, Phase::Format, &err)),
    }
}

/// (c) compile once in `mode`; returns whether it succeeded.
pub(crate) async fn compile(
    compiler: &dyn TemplateCompiler,
    text: &str,
    path: &str,
    mode: CompileMode,
) -> (bool, Vec<Diagnostic>) {
    let phase = match mode {
        CompileMode::Static => Phase::Static,
        CompileMode::Interactive => Phase::Interactive,
    };
    match compiler.compile(text, mode, path).await {
        Ok(_) => (true, Vec::new()),
        Err(err) => (
            false,
            vec![tool_failure(DiagnosticSource::Compiler, phase, &err)],
        ),
    }
}

/// (d) structured-data files: strict JSON parse.
pub(crate) fn parse_data(text: &str) -> Vec<Diagnostic> {
    match serde_json::from_str::<Value>(text) {
        Ok(_) => Vec::new(),
        Err(err) => vec![Diagnostic::error(
            DiagnosticSource::Parse,
            format!("invalid JSON: {err}"),
        )
        .at(
            u32::try_from(err.line()).ok().filter(|l| *l > 0),
            u32::try_from(err.column()).ok().filter(|c| *c > 0),
        )
        .in_phase(Phase::Parse)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lint_severity_mapping() {
        assert_eq!(lint_severity(2), Severity::Error);
        assert_eq!(lint_severity(1), Severity::Warning);
        assert_eq!(lint_severity(0), Severity::Info);
        assert_eq!(lint_severity(7), Severity::Info);
    }

    #[test]
    fn parse_data_reports_position() {
        assert!(parse_data(r#"{"name": "app"}"#).is_empty());
        let diags = parse_data("{\n  \"name\": \n}");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].phase, Some(Phase::Parse));
        assert_eq!(diags[0].line, Some(3));
    }

    #[test]
    fn degraded_tool_failure_is_info() {
        let diag = tool_failure(
            DiagnosticSource::Format,
            Phase::Format,
            &ToolError::unavailable("format", "prettier missing"),
        );
        assert_eq!(diag.severity, Severity::Info);
        assert!(diag.message.contains("prettier missing"));

        let diag = tool_failure(
            DiagnosticSource::Compiler,
            Phase::Static,
            &ToolError::Rejected {
                message: "Unexpected token".into(),
                line: Some(4),
                column: Some(2),
            },
        );
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.line, Some(4));
    }
}
