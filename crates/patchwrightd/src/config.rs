//! Daemon configuration: command-line flags with `PATCHWRIGHT_*` fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use patchwright_core::{CommandSpec, RepairPolicy, ResolverPolicy, SandboxConfig, TtlPolicy};

#[derive(Debug, Clone, Parser)]
#[command(name = "patchwrightd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Repair-and-compile service for generated UI components", long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "PATCHWRIGHT_BIND", default_value = "127.0.0.1:8787")]
    pub bind: SocketAddr,

    /// Enable verbose output
    #[arg(short, long, env = "PATCHWRIGHT_VERBOSE")]
    pub verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "PATCHWRIGHT_LOG_JSON")]
    pub json: bool,

    /// Lint wrapper command (JSON over stdio)
    #[arg(long, env = "PATCHWRIGHT_LINT_CMD", default_value = "node tools/lint.mjs")]
    pub lint_cmd: String,

    /// Format wrapper command (JSON over stdio)
    #[arg(long, env = "PATCHWRIGHT_FORMAT_CMD", default_value = "node tools/format.mjs")]
    pub format_cmd: String,

    /// Template compiler wrapper command (JSON over stdio)
    #[arg(long, env = "PATCHWRIGHT_COMPILER_CMD", default_value = "node tools/compile.mjs")]
    pub compiler_cmd: String,

    /// Type checker command; type checking is skipped when unset
    #[arg(long, env = "PATCHWRIGHT_TYPECHECK_CMD")]
    pub typecheck_cmd: Option<String>,

    /// Interpreter for the sandbox runner; previews are not executed when unset
    #[arg(long, env = "PATCHWRIGHT_RUNNER_CMD")]
    pub runner_cmd: Option<String>,

    /// Directory whose node_modules serves runtime and allowed packages
    #[arg(long, env = "PATCHWRIGHT_MODULE_ROOT")]
    pub module_root: Option<PathBuf>,

    /// Comma separated packages the sandbox may load from the environment
    #[arg(long, env = "PATCHWRIGHT_ALLOW_PACKAGES", default_value = "")]
    pub allow_packages: String,

    /// Hard timeout for every external tool call, in seconds
    #[arg(long, env = "PATCHWRIGHT_TOOL_TIMEOUT_SECS", default_value_t = 30)]
    pub tool_timeout_secs: u64,

    /// Sandbox execution timeout, in milliseconds
    #[arg(long, env = "PATCHWRIGHT_EXEC_TIMEOUT_MS", default_value_t = 5_000)]
    pub exec_timeout_ms: u64,

    /// OpenAI-compatible endpoint for the patch generator
    #[arg(
        long,
        env = "PATCHWRIGHT_LLM_BASE_URL",
        default_value = "https://api.openai.com/v1"
    )]
    pub llm_base_url: String,

    /// Model name for the patch generator
    #[arg(long, env = "PATCHWRIGHT_LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    /// API key for the patch generator; repair only validates when unset
    #[arg(long, env = "PATCHWRIGHT_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Default repair pass budget
    #[arg(long, env = "PATCHWRIGHT_MAX_PASSES", default_value_t = 3)]
    pub max_passes: u32,

    /// Largest pass budget a request may ask for
    #[arg(long, env = "PATCHWRIGHT_PASS_CEILING", default_value_t = 10)]
    pub pass_ceiling: u32,

    /// Directory of known-good components used as the last repair fallback
    #[arg(long, env = "PATCHWRIGHT_CATALOG_DIR")]
    pub catalog_dir: Option<PathBuf>,

    /// Lifetime of runtime bundles and cached compile results, in seconds
    #[arg(long, env = "PATCHWRIGHT_BUNDLE_TTL_SECS", default_value_t = 300)]
    pub bundle_ttl_secs: u64,

    /// SurrealDB URL for project storage; an in-memory store is used when unset
    #[arg(long, env = "SURREALDB_URL")]
    pub surrealdb_url: Option<String>,

    #[arg(long, env = "SURREALDB_USERNAME")]
    pub surrealdb_username: Option<String>,

    #[arg(long, env = "SURREALDB_PASSWORD", hide_env_values = true)]
    pub surrealdb_password: Option<String>,
}

impl Config {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn command(&self, command_line: &str) -> anyhow::Result<CommandSpec> {
        CommandSpec::parse(command_line, self.tool_timeout())
            .ok_or_else(|| anyhow::anyhow!("empty tool command"))
    }

    pub fn repair_policy(&self) -> RepairPolicy {
        RepairPolicy {
            max_passes: self.max_passes,
            pass_ceiling: self.pass_ceiling,
            ..RepairPolicy::default()
        }
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            ttl: Duration::from_secs(self.bundle_ttl_secs),
            ..TtlPolicy::default()
        }
    }

    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            timeout_ms: self.exec_timeout_ms,
            ..SandboxConfig::default()
        }
    }

    pub fn resolver_policy(&self) -> ResolverPolicy {
        ResolverPolicy::default().allowing_csv(&self.allow_packages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_flags() {
        let config = Config::try_parse_from(["patchwrightd"]).unwrap();
        assert_eq!(config.bind.port(), 8787);
        assert_eq!(config.max_passes, 3);
        assert_eq!(config.repair_policy().pass_ceiling, 10);
        assert!(config.runner_cmd.is_none());
        assert_eq!(config.ttl_policy().ttl, Duration::from_secs(300));
    }

    #[test]
    fn allow_list_becomes_resolver_rules() {
        let config =
            Config::try_parse_from(["patchwrightd", "--allow-packages", "clsx, date-fns"])
                .unwrap();
        let policy = config.resolver_policy();
        assert_eq!(policy.rules.len(), 2);
        assert!(policy.is_runtime("svelte/internal"));
    }

    #[test]
    fn tool_commands_split_on_whitespace() {
        let config = Config::try_parse_from([
            "patchwrightd",
            "--compiler-cmd",
            "node tools/compile.mjs --ssr",
        ])
        .unwrap();
        let spec = config.command(&config.compiler_cmd).unwrap();
        assert_eq!(spec.program, "node");
        assert_eq!(spec.args, vec!["tools/compile.mjs", "--ssr"]);
        assert!(config.command("   ").is_err());
    }
}
