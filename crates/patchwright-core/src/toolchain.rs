//! Shared linter/formatter handle with lazy, once-only initialisation.
//!
//! Starting the lint/format toolchain is slow, so one handle is created per
//! process and reused by every validation. A failed initialisation is cached
//! as well: later callers get the same `Unavailable` error immediately until
//! [`Toolchain::reset`] is called.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::tools::process::{call_json, CommandSpec};
use crate::tools::{CommandFormatter, CommandLinter, Formatter, Linter, ToolError};

/// Initialised lint/format collaborators.
#[derive(Clone)]
pub struct Tools {
    pub linter: Arc<dyn Linter>,
    pub formatter: Arc<dyn Formatter>,
}

type InitFn = dyn Fn() -> BoxFuture<'static, Result<Tools, ToolError>> + Send + Sync;

pub struct Toolchain {
    init: Box<InitFn>,
    state: Mutex<Option<Result<Tools, String>>>,
}

impl Toolchain {
    /// A toolchain whose initialisation runs `init` on first use.
    pub fn lazy<F>(init: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Tools, ToolError>> + Send + Sync + 'static,
    {
        Self {
            init: Box::new(init),
            state: Mutex::new(None),
        }
    }

    /// A toolchain that is ready immediately.
    pub fn ready(linter: Arc<dyn Linter>, formatter: Arc<dyn Formatter>) -> Self {
        let tools = Tools { linter, formatter };
        Self::lazy(move || {
            let tools = tools.clone();
            Box::pin(async move { Ok(tools) })
        })
    }

    /// Subprocess-backed toolchain; initialisation pings both wrappers.
    pub fn from_commands(lint: CommandSpec, format: CommandSpec) -> Self {
        Self::lazy(move || {
            let lint = lint.clone();
            let format = format.clone();
            Box::pin(async move {
                let ping = serde_json::json!({ "op": "ping" });
                call_json::<_, serde_json::Value>("lint", &lint, &ping).await?;
                call_json::<_, serde_json::Value>("format", &format, &ping).await?;
                Ok(Tools {
                    linter: Arc::new(CommandLinter::new(lint)),
                    formatter: Arc::new(CommandFormatter::new(format)),
                })
            })
        })
    }

    /// Get the shared tools, initialising them on first call.
    pub async fn get(&self) -> Result<Tools, ToolError> {
        let mut state = self.state.lock().await;
        if state.is_none() {
            let outcome = (self.init)().await.map_err(|e| e.to_string());
            match &outcome {
                Ok(_) => info!("lint/format toolchain initialised"),
                Err(reason) => warn!(%reason, "lint/format toolchain unavailable; caching failure"),
            }
            *state = Some(outcome);
        }
        match state.as_ref() {
            Some(Ok(tools)) => Ok(tools.clone()),
            Some(Err(reason)) => Err(ToolError::unavailable("toolchain", reason.clone())),
            None => Err(ToolError::unavailable("toolchain", "not initialised")),
        }
    }

    /// Drop the cached handle or failure so the next `get` initialises again.
    pub async fn reset(&self) {
        *self.state.lock().await = None;
    }
}
