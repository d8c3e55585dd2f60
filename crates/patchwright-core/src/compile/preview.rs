//! Labelled source preview rendered when the sandbox does not execute.

use crate::structural::escape_html;

/// Escaped `<pre><code>` block of the unexecuted source, tagged with the
/// reason execution was skipped.
pub fn fallback_html(source: &str, reason: &str) -> String {
    format!(
        "<div class=\"pw-preview-fallback\" data-preview=\"source\">\n\
         <p class=\"pw-preview-notice\">Preview not executed: {}</p>\n\
         <pre><code class=\"language-svelte\">{}</code></pre>\n\
         </div>",
        escape_html(reason),
        escape_html(source)
    )
}
