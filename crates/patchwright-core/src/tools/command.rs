//! JSON-over-stdio adapters for the linter, formatter and template compiler.
//!
//! Each adapter owns a [`CommandSpec`] and sends one request per call; the
//! wrapper script on the other side drives the real tool (ESLint, Prettier,
//! the Svelte compiler, ...). See `process` for the envelope format.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::process::{call_json, CommandSpec};
use super::{
    CompileMode, CompiledOutput, FormatJob, Formatter, LintOutput, Linter, TemplateCompiler,
    ToolError,
};

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Lint {
        source: &'a str,
        path: &'a str,
    },
    Format {
        source: &'a str,
        parser: &'a str,
    },
    FormatBatch {
        files: &'a [FormatJob],
    },
    Compile {
        source: &'a str,
        mode: CompileMode,
        filename: &'a str,
    },
}

#[derive(Debug, Clone)]
pub struct CommandLinter {
    spec: CommandSpec,
}

impl CommandLinter {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Linter for CommandLinter {
    async fn lint(&self, source: &str, virtual_path: &str) -> Result<LintOutput, ToolError> {
        call_json(
            "lint",
            &self.spec,
            &Request::Lint {
                source,
                path: virtual_path,
            },
        )
        .await
    }
}

#[derive(Debug, Clone)]
pub struct CommandFormatter {
    spec: CommandSpec,
}

impl CommandFormatter {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[derive(Debug, Deserialize)]
struct BatchEntry {
    #[serde(default)]
    formatted: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl Formatter for CommandFormatter {
    async fn format(&self, source: &str, parser: &str) -> Result<String, ToolError> {
        call_json("format", &self.spec, &Request::Format { source, parser }).await
    }

    async fn format_batch(
        &self,
        jobs: &[FormatJob],
    ) -> Result<Vec<Result<String, ToolError>>, ToolError> {
        let entries: Vec<BatchEntry> =
            call_json("format", &self.spec, &Request::FormatBatch { files: jobs }).await?;
        if entries.len() != jobs.len() {
            return Err(ToolError::Protocol {
                tool: "format".to_string(),
                reason: format!("expected {} batch results, got {}", jobs.len(), entries.len()),
            });
        }
        Ok(entries
            .into_iter()
            .map(|entry| match (entry.formatted, entry.error) {
                (Some(text), _) => Ok(text),
                (None, Some(message)) => Err(ToolError::rejected(message)),
                (None, None) => Err(ToolError::rejected("formatter returned no output")),
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct CommandCompiler {
    spec: CommandSpec,
}

impl CommandCompiler {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl TemplateCompiler for CommandCompiler {
    async fn compile(
        &self,
        source: &str,
        mode: CompileMode,
        filename: &str,
    ) -> Result<CompiledOutput, ToolError> {
        call_json(
            "compiler",
            &self.spec,
            &Request::Compile {
                source,
                mode,
                filename,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_tagged_by_op() {
        let json = serde_json::to_value(Request::Compile {
            source: "<p/>",
            mode: CompileMode::Interactive,
            filename: "A.svelte",
        })
        .unwrap();
        assert_eq!(json["op"], "compile");
        assert_eq!(json["mode"], "interactive");

        let jobs = vec![FormatJob {
            path: "a.css".into(),
            parser: "css".into(),
            source: "a{}".into(),
        }];
        let json = serde_json::to_value(Request::FormatBatch { files: &jobs }).unwrap();
        assert_eq!(json["op"], "format_batch");
        assert_eq!(json["files"][0]["parser"], "css");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn formatter_speaks_the_envelope_protocol() {
        use std::time::Duration;
        // Scripted stand-in for a formatter wrapper.
        let spec = CommandSpec::new("sh", Duration::from_secs(5)).with_args([
            "-c",
            r#"cat > /dev/null; printf '{"ok":true,"result":"a { color: red; }\\n"}'"#,
        ]);
        let formatted = CommandFormatter::new(spec)
            .format("a{color:red}", "css")
            .await
            .unwrap();
        assert_eq!(formatted, "a { color: red; }\n");
    }
}
