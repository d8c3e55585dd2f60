//! Subprocess plumbing shared by the command adapters.
//!
//! Protocol: the request is written to stdin as one JSON document and stdin
//! is closed; the tool answers with one JSON envelope on stdout:
//! `{"ok": true, "result": ...}` or
//! `{"ok": false, "error": {"message": ..., "line": ..., "column": ...}}`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::ToolError;

/// How to launch an external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Hard wall-clock limit; the child is killed when it elapses.
    pub timeout: Duration,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Parse `"program arg1 arg2"` (whitespace separated, no quoting).
    pub fn parse(command_line: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, timeout).with_args(parts))
    }

    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// A `tokio` command with piped stdio that is killed when dropped.
    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Captured result of one subprocess run.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Map a spawn failure: a missing binary means the tool is unavailable.
pub(crate) fn spawn_error(tool: &str, spec: &CommandSpec, err: std::io::Error) -> ToolError {
    ToolError::unavailable(tool, format!("failed to start `{}`: {err}", spec.program))
}

/// Run a prepared command, feed `input` on stdin, and wait under `spec.timeout`.
pub async fn run_with_input(
    tool: &str,
    spec: &CommandSpec,
    mut cmd: Command,
    input: &[u8],
) -> Result<ProcessOutput, ToolError> {
    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| spawn_error(tool, spec, e))?;

    // Feeding stdin shares the deadline with the wait: a child that never
    // reads would otherwise block the write once the pipe buffer fills.
    let stdin = child.stdin.take();
    let feed = async move {
        if let Some(mut stdin) = stdin {
            stdin.write_all(input).await?;
            stdin.shutdown().await?;
        }
        Ok::<_, std::io::Error>(())
    };
    let exchange = async {
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        fed?;
        output
    };

    // Dropping the future on timeout drops the child, which kills it.
    let output = tokio::time::timeout(spec.timeout, exchange)
        .await
        .map_err(|_| ToolError::Timeout {
            tool: tool.to_string(),
            timeout_ms: spec.timeout_ms(),
        })??;

    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    debug!(tool, duration_ms, status = ?output.status, "subprocess finished");
    Ok(ProcessOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms,
    })
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    column: Option<u32>,
}

/// Send `request` to the tool and decode its envelope.
pub async fn call_json<Req, Resp>(
    tool: &str,
    spec: &CommandSpec,
    request: &Req,
) -> Result<Resp, ToolError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let body = serde_json::to_vec(request).map_err(|e| ToolError::Protocol {
        tool: tool.to_string(),
        reason: format!("request encoding failed: {e}"),
    })?;
    let output = run_with_input(tool, spec, spec.command(), &body).await?;
    decode_envelope(tool, &output)
}

pub(crate) fn decode_envelope<Resp: DeserializeOwned>(
    tool: &str,
    output: &ProcessOutput,
) -> Result<Resp, ToolError> {
    let protocol = |reason: String| ToolError::Protocol {
        tool: tool.to_string(),
        reason,
    };
    let envelope: Envelope<Resp> = serde_json::from_str(output.stdout.trim()).map_err(|e| {
        let stderr = output.stderr.trim();
        protocol(format!(
            "exit code {}: {e}{}",
            output.exit_code,
            if stderr.is_empty() {
                String::new()
            } else {
                format!(" (stderr: {stderr})")
            }
        ))
    })?;

    if envelope.ok {
        return envelope
            .result
            .ok_or_else(|| protocol("ok envelope without result".to_string()));
    }
    let error = envelope
        .error
        .ok_or_else(|| protocol("error envelope without error".to_string()))?;
    Err(ToolError::Rejected {
        message: error.message,
        line: error.line,
        column: error.column,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration_ms: 1,
        }
    }

    #[test]
    fn parse_command_line() {
        let spec = CommandSpec::parse("node tools/lint.mjs --fix", Duration::from_secs(5)).unwrap();
        assert_eq!(spec.program, "node");
        assert_eq!(spec.args, vec!["tools/lint.mjs", "--fix"]);
        assert!(CommandSpec::parse("   ", Duration::from_secs(1)).is_none());
    }

    #[test]
    fn envelope_ok_and_error() {
        let ok: String = decode_envelope("fmt", &output(r#"{"ok":true,"result":"x"}"#)).unwrap();
        assert_eq!(ok, "x");

        let err = decode_envelope::<String>(
            "fmt",
            &output(r#"{"ok":false,"error":{"message":"Unexpected token","line":2}}"#),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::Rejected { line: Some(2), .. }));
    }

    #[test]
    fn garbage_is_protocol_error() {
        let err = decode_envelope::<String>("fmt", &output("segfault")).unwrap_err();
        assert!(matches!(err, ToolError::Protocol { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let spec = CommandSpec::new("patchwright-no-such-tool", Duration::from_secs(1));
        let err = call_json::<_, String>("lint", &spec, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_times_out() {
        let spec = CommandSpec::new("sleep", Duration::from_millis(100)).with_args(["5"]);
        let err = run_with_input("typecheck", &spec, spec.command(), b"")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { timeout_ms: 100, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unread_input_does_not_outlive_the_timeout() {
        let spec = CommandSpec::new("sleep", Duration::from_millis(200)).with_args(["30"]);
        let input = vec![b'x'; 4 * 1024 * 1024];
        let started = Instant::now();
        let err = run_with_input("compile", &spec, spec.command(), &input)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { timeout_ms: 200, .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
