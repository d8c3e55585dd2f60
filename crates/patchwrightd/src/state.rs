//! Service wiring shared by all handlers.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use patchwright_core::{
    CommandCompiler, CommandTypeChecker, CompileConfig, CompileService, OpenAiPatchGenerator,
    RepairLoop, Sandbox, StaticCatalog, SubprocessRunner, TemplateCompiler,
    Toolchain, Validator,
};
use patchwright_state::{Credentials, MemoryProjectStore, ProjectStore, SurrealHandle, SurrealProjectStore};
use tracing::{info, warn};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub repair: Arc<RepairLoop>,
    pub compile: Arc<CompileService>,
}

impl AppState {
    pub fn new(repair: Arc<RepairLoop>, compile: Arc<CompileService>) -> Self {
        Self { repair, compile }
    }

    /// Build every collaborator named by `config`.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let toolchain = Arc::new(Toolchain::from_commands(
            config.command(&config.lint_cmd)?,
            config.command(&config.format_cmd)?,
        ));
        let compiler: Arc<dyn TemplateCompiler> =
            Arc::new(CommandCompiler::new(config.command(&config.compiler_cmd)?));
        let validator = Arc::new(Validator::new(toolchain, Some(compiler.clone())));

        let mut repair = RepairLoop::new(validator)
            .with_policy(config.repair_policy())
            .with_store(open_store(config).await?);

        match &config.llm_api_key {
            Some(key) => {
                let generator = OpenAiPatchGenerator::new(
                    Some(key.clone()),
                    &config.llm_base_url,
                    &config.llm_model,
                    config.tool_timeout(),
                )
                .context("building patch generator")?;
                repair = repair.with_generator(Arc::new(generator));
            }
            None => warn!("no LLM API key configured; repair will validate only"),
        }
        if let Some(cmd) = &config.typecheck_cmd {
            repair = repair.with_type_checker(Arc::new(CommandTypeChecker::new(
                config.command(cmd)?,
            )));
        }
        if let Some(dir) = &config.catalog_dir {
            let catalog = load_catalog(dir).await?;
            info!(dir = %dir.display(), components = catalog.len(), "catalog loaded");
            repair = repair.with_catalog(Arc::new(catalog));
        }
        let repair = Arc::new(repair);

        let sandbox = match &config.runner_cmd {
            Some(cmd) => {
                let mut runner = SubprocessRunner::new(config.command(cmd)?);
                if let Some(root) = &config.module_root {
                    runner = runner.with_module_root(root);
                }
                Sandbox::new(Some(Arc::new(runner)), config.sandbox_config())
                    .with_policy(config.resolver_policy())
            }
            None => {
                warn!("no sandbox runner configured; previews will not execute");
                Sandbox::disabled()
            }
        };

        let compile = CompileService::new(compiler)
            .with_config(CompileConfig {
                ttl: config.ttl_policy(),
                ..CompileConfig::default()
            })
            .with_sandbox(sandbox)
            .with_repair(repair.clone());

        Ok(Self::new(repair, Arc::new(compile)))
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ProjectStore>> {
    let Some(url) = &config.surrealdb_url else {
        info!("using in-memory project store");
        return Ok(Arc::new(MemoryProjectStore::new()));
    };
    let credentials = match (&config.surrealdb_username, &config.surrealdb_password) {
        (Some(username), Some(password)) => Some(Credentials {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };
    let handle = SurrealHandle::connect(url, credentials)
        .await
        .with_context(|| format!("connecting to SurrealDB at {url}"))?;
    Ok(Arc::new(SurrealProjectStore::new(handle)))
}

/// Every `*.svelte` file in `dir`, keyed by file stem.
pub async fn load_catalog(dir: &Path) -> anyhow::Result<StaticCatalog> {
    let mut catalog = StaticCatalog::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("reading catalog dir {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("svelte") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let source = tokio::fs::read_to_string(&path).await?;
        catalog.insert(stem, source);
    }
    Ok(catalog)
}
