//! Known-good components used as a last-resort substitution.

use std::collections::BTreeMap;

use crate::domain::source::file_stem;

/// Source of known-good components, looked up by file stem.
pub trait ComponentCatalog: Send + Sync {
    /// Names offered to the patch generator as reusable components.
    fn names(&self) -> Vec<String>;

    /// Known-good source for a component named like `stem`.
    fn lookup(&self, stem: &str) -> Option<String>;

    /// Known-good source for the component at `path`.
    fn lookup_path(&self, path: &str) -> Option<String> {
        self.lookup(file_stem(path))
    }
}

/// In-memory catalog; lookups are case-insensitive on the name.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    components: BTreeMap<String, (String, String)>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_component(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        let name = name.into();
        self.components
            .insert(name.to_ascii_lowercase(), (name, source.into()));
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl ComponentCatalog for StaticCatalog {
    fn names(&self) -> Vec<String> {
        self.components
            .values()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn lookup(&self, stem: &str) -> Option<String> {
        self.components
            .get(&stem.to_ascii_lowercase())
            .map(|(_, source)| source.clone())
    }
}
