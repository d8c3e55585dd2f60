//! Interpretation of untrusted patch-generator output.
//!
//! Order of preference: a structured object (`code` or `fixedCode`, plus an
//! optional `summary`) found by the extractor, then the first fenced code
//! block, then the bare text. Blank output yields no proposal.

use crate::extract::{extract_with, ExtractionStrategy};

/// A candidate replacement for the file under repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchProposal {
    pub code: String,
    pub summary: Option<String>,
}

pub fn interpret_response(raw: &str) -> Option<PatchProposal> {
    if raw.trim().is_empty() {
        return None;
    }

    let extracted = extract_with(raw, false);
    // Objects dug out of surrounding code are braces in the source, not a reply.
    let structured = extracted.ok
        && !matches!(extracted.strategy, Some(ExtractionStrategy::BalancedBlock));
    if structured {
        let code = extracted
            .str_field("code")
            .or_else(|| extracted.str_field("fixedCode"))
            .or_else(|| extracted.str_field("fixed_code"));
        if let Some(code) = code.filter(|c| !c.trim().is_empty()) {
            return Some(PatchProposal {
                code: code.to_string(),
                summary: extracted
                    .str_field("summary")
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            });
        }
    }

    if let Some(block) = fenced_block(raw) {
        return Some(PatchProposal {
            code: block,
            summary: None,
        });
    }

    // A reply object without a code field is not source.
    if structured {
        return None;
    }
    Some(PatchProposal {
        code: raw.trim().to_string(),
        summary: None,
    })
}

/// Contents of the first ```` ``` ```` block, language tag stripped.
fn fenced_block(raw: &str) -> Option<String> {
    let open = raw.find("```")?;
    let after_tag = raw[open + 3..].find('\n')? + open + 4;
    let close = raw[after_tag..].find("```")? + after_tag;
    let block = raw[after_tag..close].trim_end_matches(|c: char| c == '\n' || c == '\r');
    (!block.trim().is_empty()).then(|| format!("{block}\n"))
}
