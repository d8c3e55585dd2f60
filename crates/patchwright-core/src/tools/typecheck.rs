//! Line-streaming type checker adapter.
//!
//! The checker runs in a scratch directory holding the file under test and
//! prints one finding per line, either as JSON
//! (`{"severity":"error","message":...,"line":3,"column":1,"code":"TS2322"}`)
//! or in the `file(line,col): error TS2322: message` / `file:line:col - error
//! TS2322: message` shapes that `tsc` emits. Lines are consumed as they arrive
//! so a timeout still yields everything printed before the deadline.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::process::{spawn_error, CommandSpec};
use super::{ToolError, TypeChecker};
use crate::domain::{Diagnostic, DiagnosticSource, Phase, Severity};

/// Default hard limit for one type-check run.
pub const DEFAULT_TYPECHECK_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Debug, Clone)]
pub struct CommandTypeChecker {
    spec: CommandSpec,
}

impl CommandTypeChecker {
    /// `spec.args` are passed first, followed by the path of the file to check.
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[derive(Debug, Deserialize)]
struct JsonFinding {
    #[serde(default)]
    severity: Option<String>,
    message: String,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    column: Option<u32>,
    #[serde(default)]
    code: Option<String>,
}

fn tsc_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^.+?(?:\((\d+),(\d+)\):|:(\d+):(\d+)\s+-)\s*(error|warning)\s+(?:(TS\d+):\s*)?(.*)$",
        )
        .expect("type-check line pattern is a valid regex")
    })
}

/// Parse one output line into a diagnostic; noise lines yield `None`.
pub fn parse_finding(line: &str) -> Option<Diagnostic> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.starts_with('{') {
        let finding: JsonFinding = serde_json::from_str(line).ok()?;
        let severity = match finding.severity.as_deref() {
            Some("warning") => Severity::Warning,
            Some("info") | Some("hint") => Severity::Info,
            _ => Severity::Error,
        };
        let mut diag = Diagnostic::new(severity, DiagnosticSource::Typecheck, finding.message)
            .at(finding.line, finding.column)
            .in_phase(Phase::Typecheck);
        if let Some(code) = finding.code {
            diag = diag.with_rule(code);
        }
        return Some(diag);
    }

    let caps = tsc_line().captures(line)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let severity = if &caps[5] == "warning" {
        Severity::Warning
    } else {
        Severity::Error
    };
    let mut diag = Diagnostic::new(severity, DiagnosticSource::Typecheck, caps[7].trim())
        .at(num(1).or(num(3)), num(2).or(num(4)))
        .in_phase(Phase::Typecheck);
    if let Some(code) = caps.get(6) {
        diag = diag.with_rule(code.as_str());
    }
    Some(diag)
}

#[async_trait]
impl TypeChecker for CommandTypeChecker {
    async fn check(&self, filename: &str, source: &str) -> Result<Vec<Diagnostic>, ToolError> {
        let scratch = tempfile::tempdir()?;
        let name = filename.rsplit('/').next().unwrap_or(filename);
        let path = scratch.path().join(name);
        tokio::fs::write(&path, source).await?;

        let mut cmd = self.spec.command();
        cmd.arg(&path)
            .current_dir(scratch.path())
            .stdin(std::process::Stdio::null());
        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_error("typecheck", &self.spec, e))?;
        let stdout = child.stdout.take().ok_or_else(|| ToolError::Protocol {
            tool: "typecheck".to_string(),
            reason: "stdout not captured".to_string(),
        })?;

        let deadline = Instant::now() + self.spec.timeout;
        let mut lines = BufReader::new(stdout).lines();
        let mut findings = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, lines.next_line()).await {
                Ok(Ok(Some(line))) => findings.extend(parse_finding(&line)),
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(ToolError::Io(e)),
                Err(_) => {
                    let _ = child.kill().await;
                    warn!(
                        filename,
                        timeout_ms = self.spec.timeout_ms(),
                        partial = findings.len(),
                        "type check timed out; returning partial results"
                    );
                    findings.push(
                        Diagnostic::warning(
                            DiagnosticSource::Typecheck,
                            format!(
                                "type check timed out after {}ms; results are partial",
                                self.spec.timeout_ms()
                            ),
                        )
                        .in_phase(Phase::Typecheck),
                    );
                    return Ok(findings);
                }
            }
        }

        // Output is complete; reap the child without letting it hang us.
        let remaining = deadline.saturating_duration_since(Instant::now());
        if tokio::time::timeout(remaining, child.wait()).await.is_err() {
            let _ = child.kill().await;
        }
        debug!(filename, findings = findings.len(), "type check finished");
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_lines() {
        let diag = parse_finding(
            r#"{"severity":"error","message":"Type 'string' is not assignable","line":3,"column":7,"code":"TS2322"}"#,
        )
        .unwrap();
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.line, Some(3));
        assert_eq!(diag.rule.as_deref(), Some("TS2322"));
        assert_eq!(diag.phase, Some(Phase::Typecheck));
    }

    #[test]
    fn parses_tsc_shapes() {
        let a = parse_finding("App.ts(4,10): error TS2304: Cannot find name 'foo'.").unwrap();
        assert_eq!((a.line, a.column), (Some(4), Some(10)));
        assert_eq!(a.message, "Cannot find name 'foo'.");

        let b = parse_finding("App.ts:2:1 - warning unused label").unwrap();
        assert_eq!(b.severity, Severity::Warning);
        assert_eq!((b.line, b.column), (Some(2), Some(1)));
    }

    #[test]
    fn ignores_noise() {
        assert!(parse_finding("").is_none());
        assert!(parse_finding("Found 2 errors.").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_returns_partial_findings_and_warning() {
        let spec = CommandSpec::new("sh", Duration::from_millis(300)).with_args([
            "-c",
            r#"echo '{"message":"early finding","line":1}'; sleep 5"#,
            "checker",
        ]);
        let found = CommandTypeChecker::new(spec)
            .check("App.ts", "let a: number = 'x';")
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].message, "early finding");
        assert_eq!(found[1].severity, Severity::Warning);
        assert!(found[1].message.contains("timed out"));
    }
}
