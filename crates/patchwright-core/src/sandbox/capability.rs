//! Module origins: which resolver strategy produced a module.

use serde::{Deserialize, Serialize};

/// Where a resolved module comes from.
///
/// `Runtime` and `Environment` modules are loaded by the runner from its own
/// installation; `Local` and `Stub` modules ship their code in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleOrigin {
    /// The component framework's internal runtime.
    Runtime,
    /// A dependency from the request, compiled on demand.
    Local,
    /// A package the resolver policy allows from the runner's environment.
    Environment,
    /// Synthesized inert module standing in for anything unresolved.
    Stub,
}

impl ModuleOrigin {
    /// Whether the runner loads this module from its installation.
    pub fn is_host_provided(&self) -> bool {
        matches!(self, ModuleOrigin::Runtime | ModuleOrigin::Environment)
    }
}

impl std::fmt::Display for ModuleOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleOrigin::Runtime => write!(f, "runtime"),
            ModuleOrigin::Local => write!(f, "local"),
            ModuleOrigin::Environment => write!(f, "environment"),
            ModuleOrigin::Stub => write!(f, "stub"),
        }
    }
}
