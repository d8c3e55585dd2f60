//! Module runners: execute a resolved graph and return the rendered markup.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::error::{SandboxError, SandboxResult};
use super::graph::{ModuleGraph, RenderedMarkup};
use crate::tools::process::{decode_envelope, run_with_input};
use crate::tools::CommandSpec;

#[async_trait]
pub trait ModuleRunner: Send + Sync {
    async fn run(&self, graph: &ModuleGraph) -> SandboxResult<RenderedMarkup>;
}

/// Bootstrap executed by the runner process. Reads the graph from stdin,
/// evaluates shipped modules in a fresh `vm` context, loads host modules
/// from `PW_MODULE_ROOT` and answers with one JSON envelope.
pub const BOOTSTRAP: &str = r#""use strict";
const vm = require("vm");
const path = require("path");
const { createRequire } = require("module");

const hostRequire = createRequire(path.join(process.env.PW_MODULE_ROOT || process.cwd(), "__pw_host.js"));

function reply(value) {
  process.stdout.write(JSON.stringify(value));
}

function fail(err) {
  reply({ ok: false, error: { message: String((err && err.message) || err) } });
}

function render(graph) {
  const quiet = function () {};
  const context = vm.createContext({
    console: { log: quiet, info: quiet, warn: quiet, error: quiet, debug: quiet },
    URL, TextEncoder, TextDecoder, queueMicrotask,
  });
  const cache = new Map();

  function load(key) {
    if (cache.has(key)) return cache.get(key);
    const mod = graph.modules[key];
    if (!mod) throw new Error("module not in graph: " + key);
    if (mod.origin === "runtime" || mod.origin === "environment") {
      const host = hostRequire(key);
      cache.set(key, host);
      return host;
    }
    const exports = {};
    cache.set(key, exports);
    const factory = vm.runInContext(mod.code, context, { filename: key });
    const links = mod.links || {};
    const result = factory(function (specifier) {
      const target = links[specifier];
      if (target === undefined) throw new Error("unresolved import " + specifier + " in " + key);
      return load(target);
    }, exports);
    const value = result === undefined ? exports : result;
    cache.set(key, value);
    return value;
  }

  const entry = load(graph.entry);
  const component = entry && entry.default !== undefined ? entry.default : entry;
  const props = graph.props || {};
  if (component && typeof component.render === "function") {
    const out = component.render(props);
    return { html: out.html || "", css: (out.css && out.css.code) || null, head: out.head || null };
  }
  const server = hostRequire("svelte/server");
  const out = server.render(component, { props });
  return { html: out.body || out.html || "", css: null, head: out.head || null };
}

let input = "";
process.stdin.setEncoding("utf8");
process.stdin.on("data", function (chunk) { input += chunk; });
process.stdin.on("end", function () {
  Promise.resolve()
    .then(function () { return render(JSON.parse(input)); })
    .then(function (result) { reply({ ok: true, result: result }); }, fail);
});
"#;

/// Runs the graph in a child process with a cleared environment and a
/// scratch working directory. Only `PATH` and `PW_MODULE_ROOT` are passed.
///
/// `spec` names the interpreter (e.g. `node`); the bootstrap script path is
/// appended as its last argument.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    spec: CommandSpec,
    module_root: Option<PathBuf>,
}

impl SubprocessRunner {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            module_root: None,
        }
    }

    /// Directory whose `node_modules` provides runtime and environment packages.
    pub fn with_module_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.module_root = Some(root.into());
        self
    }

    fn command(&self, scratch: &std::path::Path, script: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args)
            .arg(script)
            .env_clear()
            .current_dir(scratch)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        if let Some(root) = &self.module_root {
            cmd.env("PW_MODULE_ROOT", root);
        }
        cmd
    }
}

#[async_trait]
impl ModuleRunner for SubprocessRunner {
    async fn run(&self, graph: &ModuleGraph) -> SandboxResult<RenderedMarkup> {
        let scratch = tempfile::tempdir()?;
        let script = scratch.path().join("bootstrap.cjs");
        tokio::fs::write(&script, BOOTSTRAP).await?;

        let body = serde_json::to_vec(graph).map_err(|e| SandboxError::ExecutionFailed {
            attempts: 1,
            reason: format!("graph encoding failed: {e}"),
        })?;
        let output = run_with_input(
            "runner",
            &self.spec,
            self.command(scratch.path(), &script),
            &body,
        )
        .await?;
        debug!(
            modules = graph.modules.len(),
            duration_ms = output.duration_ms,
            "runner finished"
        );
        Ok(decode_envelope("runner", &output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> SubprocessRunner {
        SubprocessRunner::new(
            CommandSpec::new("sh", Duration::from_secs(5)).with_args(["-c", script]),
        )
    }

    #[tokio::test]
    async fn missing_interpreter_is_unavailable() {
        let runner = SubprocessRunner::new(CommandSpec::new(
            "definitely-not-a-runner-binary",
            Duration::from_secs(1),
        ));
        let err = runner.run(&ModuleGraph::default()).await.unwrap_err();
        assert!(matches!(err, SandboxError::RunnerUnavailable(_)));
    }

    #[tokio::test]
    async fn decodes_rendered_markup() {
        let runner = sh(r#"cat >/dev/null; printf '%s' '{"ok":true,"result":{"html":"<p>hi</p>","css":"p{}"}}'"#);
        let out = runner.run(&ModuleGraph::default()).await.unwrap();
        assert_eq!(out.html, "<p>hi</p>");
        assert_eq!(out.css.as_deref(), Some("p{}"));
    }

    #[tokio::test]
    async fn environment_is_cleared() {
        let runner = sh(
            r#"cat >/dev/null; printf '{"ok":true,"result":{"html":"%s"}}' "${HOME:-cleared}""#,
        );
        let out = runner.run(&ModuleGraph::default()).await.unwrap();
        assert_eq!(out.html, "cleared");
    }

    #[tokio::test]
    async fn module_errors_are_evaluation_failures() {
        let runner =
            sh(r#"cat >/dev/null; printf '%s' '{"ok":false,"error":{"message":"x is not defined"}}'"#);
        let err = runner.run(&ModuleGraph::default()).await.unwrap_err();
        match err {
            SandboxError::Evaluation { message } => assert_eq!(message, "x is not defined"),
            other => panic!("expected Evaluation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn runaway_modules_time_out() {
        let runner = SubprocessRunner::new(
            CommandSpec::new("sh", Duration::from_millis(100)).with_args(["-c", "sleep 5"]),
        );
        let err = runner.run(&ModuleGraph::default()).await.unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { .. }));
    }
}
