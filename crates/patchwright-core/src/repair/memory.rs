//! Bounded per-file memory of applied fixes.
//!
//! Entries are free-text summaries, newest last. Appending past the bound
//! removes the oldest entries first, the same way the store trims on save.

use serde::{Deserialize, Serialize};

use patchwright_state::{bound_memory, MAX_MEMORY_ENTRIES};

/// Longest summary kept, in characters; longer summaries are cut.
const MAX_SUMMARY_CHARS: usize = 240;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairMemory {
    entries: Vec<String>,
}

impl RepairMemory {
    pub fn new(entries: Vec<String>) -> Self {
        Self {
            entries: bound_memory(entries),
        }
    }

    /// Append a summary, dropping blanks and exact repeats of the newest entry.
    pub fn remember(&mut self, summary: &str) {
        let summary = summary.split_whitespace().collect::<Vec<_>>().join(" ");
        if summary.is_empty() || self.entries.last() == Some(&summary) {
            return;
        }
        self.entries
            .push(crate::extract::truncate_chars(&summary, MAX_SUMMARY_CHARS));
        if self.entries.len() > MAX_MEMORY_ENTRIES {
            self.entries.remove(0);
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prompt text that keeps previously fixed defects from coming back.
    pub fn prompt_text(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        Some(format!("do not reintroduce: {}", self.entries.join("; ")))
    }
}
