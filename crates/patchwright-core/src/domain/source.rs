//! Project source files and their kinds.

use serde::{Deserialize, Serialize};

/// How a file is validated, derived from its extension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Markup component (`.svelte`), compiled in both render modes.
    Component,
    Style,
    Config,
    /// Structured data (`.json`), parse-validated instead of linted.
    Data,
    Script,
}

impl FileKind {
    pub fn from_path(path: &str) -> Self {
        let file = path.rsplit('/').next().unwrap_or(path);
        let ext = file
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        let is_config = file.contains(".config.") || file.starts_with('.');
        match ext.as_str() {
            "svelte" => FileKind::Component,
            "css" | "scss" | "postcss" => FileKind::Style,
            "json" => FileKind::Data,
            "js" | "ts" | "mjs" | "cjs" if is_config => FileKind::Config,
            "js" | "ts" | "mjs" | "cjs" => FileKind::Script,
            _ if is_config => FileKind::Config,
            _ => FileKind::Script,
        }
    }

    /// Formatter parser name for this kind of file.
    pub fn formatter_parser(&self, path: &str) -> &'static str {
        match self {
            FileKind::Component => "svelte",
            FileKind::Style => "css",
            FileKind::Data => "json",
            FileKind::Script | FileKind::Config if path.ends_with(".ts") => "typescript",
            FileKind::Script | FileKind::Config => "babel",
        }
    }

    /// Whether the linter runs on this kind (data files are parse-checked instead).
    pub fn is_lintable(&self) -> bool {
        !matches!(self, FileKind::Data | FileKind::Style)
    }
}

/// A named project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
    pub kind: FileKind,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            kind: FileKind::from_path(&path),
            content: content.into(),
            path,
        }
    }

    /// File name without directories or extension (`src/lib/Card.svelte` -> `Card`).
    pub fn stem(&self) -> &str {
        file_stem(&self.path)
    }
}

/// File name without directories or extension.
pub fn file_stem(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.split('.').next().unwrap_or(file)
}
