//! The resolved module graph handed to a runner.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::capability::ModuleOrigin;

/// Specifier under which the entry module is registered.
pub const ENTRY_SPECIFIER: &str = "pw:entry";

/// One module of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedModule {
    pub origin: ModuleOrigin,
    /// Closed-form module text, absent for host-provided modules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Requested specifier mapped to its key in the graph.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
}

impl ResolvedModule {
    pub fn host(origin: ModuleOrigin) -> Self {
        Self {
            origin,
            code: None,
            links: BTreeMap::new(),
        }
    }

    pub fn with_code(origin: ModuleOrigin, code: impl Into<String>) -> Self {
        Self {
            origin,
            code: Some(code.into()),
            links: BTreeMap::new(),
        }
    }
}

/// Everything the runner needs to render the entry module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleGraph {
    pub entry: String,
    pub modules: BTreeMap<String, ResolvedModule>,
    /// Initial props for the first render.
    pub props: serde_json::Map<String, serde_json::Value>,
}

impl ModuleGraph {
    pub fn count(&self, origin: ModuleOrigin) -> usize {
        self.modules.values().filter(|m| m.origin == origin).count()
    }
}

/// What the runner rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMarkup {
    pub html: String,
    #[serde(default)]
    pub css: Option<String>,
    #[serde(default)]
    pub head: Option<String>,
}
