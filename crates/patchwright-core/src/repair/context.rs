//! Prompt context handed to the patch generator for one pass.

use crate::domain::Diagnostic;
use crate::extract::{END_DELIMITER, START_DELIMITER};

/// Everything the patch generator sees for one pass.
#[derive(Debug, Clone)]
pub struct PatchContext<'a> {
    pub filename: &'a str,
    pub source: &'a str,
    /// Error diagnostics, already capped.
    pub diagnostics: &'a [Diagnostic],
    /// "do not reintroduce: ..." line, when memory is non-empty.
    pub memory: Option<String>,
    /// Names of known-good components the patch may reuse.
    pub catalog_names: Vec<String>,
    pub pass: u32,
    pub max_passes: u32,
}

impl PatchContext<'_> {
    /// System-side instructions: output contract and ground rules.
    pub fn instructions(&self) -> String {
        format!(
            "You repair a single UI component file so that it compiles and passes lint.\n\
             Fix every listed error and change nothing else. Keep the component's public \
             props and markup structure.\n\
             Reply with one JSON object between {START_DELIMITER} and {END_DELIMITER} of the \
             form {{\"code\": \"<complete fixed file>\", \"summary\": \"<one line describing \
             the fix>\"}}. Return the whole file, not a diff."
        )
    }

    /// User-side context: diagnostics, memory, catalog hint, current source.
    pub fn render(&self) -> String {
        let mut out = format!(
            "File: {} (pass {} of {})\n\nErrors:\n",
            self.filename, self.pass, self.max_passes
        );
        for (idx, diag) in self.diagnostics.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", idx + 1, diag.summary_line()));
        }
        if let Some(memory) = &self.memory {
            out.push_str(&format!("\nPreviously fixed in this file, {memory}\n"));
        }
        if !self.catalog_names.is_empty() {
            out.push_str(&format!(
                "\nKnown-good components you may import instead of re-implementing: {}\n",
                self.catalog_names.join(", ")
            ));
        }
        out.push_str("\nCurrent source:\n```\n");
        out.push_str(self.source);
        if !self.source.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DiagnosticSource;

    #[test]
    fn render_includes_every_part() {
        let diags = vec![
            Diagnostic::error(DiagnosticSource::Compiler, "Unexpected token").at(Some(3), Some(1))
        ];
        let ctx = PatchContext {
            filename: "Card.svelte",
            source: "<div>",
            diagnostics: &diags,
            memory: Some("do not reintroduce: missing alt".into()),
            catalog_names: vec!["Button".into(), "Modal".into()],
            pass: 2,
            max_passes: 3,
        };
        let text = ctx.render();
        assert!(text.contains("pass 2 of 3"));
        assert!(text.contains("1. [compiler] at 3:1 Unexpected token"));
        assert!(text.contains("do not reintroduce: missing alt"));
        assert!(text.contains("Button, Modal"));
        assert!(text.ends_with("<div>\n```\n"));
        assert!(ctx.instructions().contains(START_DELIMITER));
    }
}
