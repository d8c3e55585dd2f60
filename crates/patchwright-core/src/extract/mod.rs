//! Response extraction: untrusted model text in, structured JSON out.
//!
//! [`extract`] never panics and never returns `Err`; failure is reported in
//! [`ExtractionResult::error`]. Strategies run in a fixed order and the first
//! candidate that parses (strictly, or after escape repair) wins:
//!
//! 1. strip code fences and preamble noise
//! 2. content between `<<<JSON_START>>>` / `<<<JSON_END>>>`
//! 3. truncated output with only the start delimiter
//! 4. direct parse of the cleaned text
//! 5. depth-balanced `{...}` blocks, longest first

mod escape;
mod strategy;

pub use escape::repair_escapes;
pub use strategy::{END_DELIMITER, START_DELIMITER};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::metrics::METRICS;

/// Maximum number of characters kept in [`ExtractionResult::raw_fragment`].
pub const RAW_FRAGMENT_LIMIT: usize = 4000;

/// Which strategy produced the extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    Delimited,
    TruncatedDelimited,
    Direct,
    BalancedBlock,
}

/// Outcome of one extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ExtractionStrategy>,
    /// The parsed candidate on success, the input on failure; truncated.
    pub raw_fragment: String,
}

impl ExtractionResult {
    fn success(data: Value, strategy: ExtractionStrategy, fragment: &str) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            strategy: Some(strategy),
            raw_fragment: truncate_chars(fragment, RAW_FRAGMENT_LIMIT),
        }
    }

    fn failure(error: String, raw: &str) -> Self {
        METRICS.inc_extraction_failures();
        Self {
            ok: false,
            data: None,
            error: Some(error),
            strategy: None,
            raw_fragment: truncate_chars(raw, RAW_FRAGMENT_LIMIT),
        }
    }

    /// String field of an object result, if present.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }
}

enum Attempt {
    Parsed(Value),
    /// Parsed, but the root kind is not acceptable.
    Rejected { reason: String, terminal: bool },
    Unparseable,
}

/// Extract a JSON object or array from model output.
pub fn extract(raw: &str) -> ExtractionResult {
    extract_with(raw, true)
}

/// Extract a JSON value; top-level arrays are rejected unless `allow_arrays`.
pub fn extract_with(raw: &str, allow_arrays: bool) -> ExtractionResult {
    let unfenced = strategy::strip_fences(raw);
    let cleaned = strategy::strip_preamble(&unfenced);
    let mut last_rejection: Option<String> = None;

    let mut candidates: Vec<(ExtractionStrategy, &str)> = Vec::new();
    if let Some(inner) = strategy::delimited(&unfenced) {
        candidates.push((ExtractionStrategy::Delimited, inner));
    }
    if let Some(inner) = strategy::truncated_delimited(&unfenced) {
        candidates.push((ExtractionStrategy::TruncatedDelimited, inner));
    }
    candidates.push((ExtractionStrategy::Direct, cleaned));

    for (strategy, candidate) in candidates {
        match attempt(candidate, allow_arrays) {
            Attempt::Parsed(value) => {
                debug!(?strategy, "extracted structured response");
                return ExtractionResult::success(value, strategy, candidate);
            }
            Attempt::Rejected { reason, terminal } if terminal => {
                return ExtractionResult::failure(reason, raw);
            }
            Attempt::Rejected { reason, .. } => last_rejection = Some(reason),
            Attempt::Unparseable => {}
        }
    }

    for block in strategy::balanced_blocks(cleaned) {
        if let Attempt::Parsed(value) = attempt(block, allow_arrays) {
            debug!(strategy = ?ExtractionStrategy::BalancedBlock, "extracted structured response");
            return ExtractionResult::success(value, ExtractionStrategy::BalancedBlock, block);
        }
    }

    let reason = last_rejection.unwrap_or_else(|| {
        if raw.contains('{') || raw.contains('[') {
            "no well-formed JSON object found in response".to_string()
        } else {
            "response contains no JSON-like structure".to_string()
        }
    });
    ExtractionResult::failure(reason, raw)
}

/// Parse strictly, then after escape repair, and check the root kind.
fn attempt(candidate: &str, allow_arrays: bool) -> Attempt {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return Attempt::Unparseable;
    }
    let parsed = serde_json::from_str::<Value>(candidate)
        .or_else(|_| serde_json::from_str::<Value>(&repair_escapes(candidate)));
    let Ok(value) = parsed else {
        return Attempt::Unparseable;
    };
    match value {
        Value::Object(_) => Attempt::Parsed(value),
        Value::Array(_) if allow_arrays => Attempt::Parsed(value),
        Value::Array(_) => Attempt::Rejected {
            reason: "top-level arrays are not allowed in this response".to_string(),
            terminal: true,
        },
        other => Attempt::Rejected {
            reason: format!("expected a JSON object, found {}", kind_name(&other)),
            terminal: false,
        },
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First `limit` characters of `s`, respecting char boundaries.
pub(crate) fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
