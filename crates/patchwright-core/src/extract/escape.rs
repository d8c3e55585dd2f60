//! Escape repair for almost-JSON produced by language models.
//!
//! Applied to a candidate only after a strict parse failed. The pass is
//! string-aware: it tracks whether the cursor is inside a string literal so
//! that structural fixes never touch string contents and string fixes never
//! touch structure.

/// Characters that may legally follow a backslash inside a JSON string.
const VALID_ESCAPES: &[char] = &['"', '\\', '/', 'b', 'f', 'n', 'r', 't', 'u'];

/// Repair common defects in model-written JSON.
///
/// - curly quotes become straight quotes
/// - a backslash before a non-escape character is dropped
/// - raw newlines, carriage returns and tabs inside strings are escaped
/// - trailing commas before `}` or `]` are dropped
/// - an unterminated final string is closed before the last closing bracket
pub fn repair_escapes(input: &str) -> String {
    let normalized: String = input
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect();

    let chars: Vec<char> = normalized.chars().collect();
    let mut out = String::with_capacity(normalized.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            match c {
                '\\' => match chars.get(i + 1) {
                    Some(next) if VALID_ESCAPES.contains(next) => {
                        out.push('\\');
                        out.push(*next);
                        i += 1;
                    }
                    // Stray backslash: drop it and keep the following char.
                    _ => {}
                },
                '"' => {
                    in_string = false;
                    out.push('"');
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                other => out.push(other),
            }
        } else {
            match c {
                '"' => {
                    in_string = true;
                    out.push('"');
                }
                ',' if next_significant(&chars, i + 1).is_some_and(|n| n == '}' || n == ']') => {}
                other => out.push(other),
            }
        }
        i += 1;
    }

    if in_string {
        close_dangling_string(&mut out);
    }
    out
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from.min(chars.len())..]
        .iter()
        .copied()
        .find(|c| !c.is_whitespace())
}

/// Insert a closing quote before the trailing run of `}`/`]`, or append one.
fn close_dangling_string(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    let body = &out[..trimmed_len];
    let closers = body
        .chars()
        .rev()
        .take_while(|c| *c == '}' || *c == ']')
        .count();
    // Closers are ASCII, so the char count equals the byte count.
    let insert_at = trimmed_len - closers;
    out.insert(insert_at, '"');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parses(s: &str) -> serde_json::Value {
        serde_json::from_str(&repair_escapes(s)).expect("repaired text parses")
    }

    #[test]
    fn normalizes_curly_quotes() {
        let v = parses("{\u{201C}name\u{201D}: \u{201C}Card\u{201D}}");
        assert_eq!(v["name"], "Card");
    }

    #[test]
    fn drops_stray_backslashes_but_keeps_valid_escapes() {
        let v = parses(r#"{"a": "price \$5", "b": "line\nbreak", "c": "q\"q"}"#);
        assert_eq!(v["a"], "price $5");
        assert_eq!(v["b"], "line\nbreak");
        assert_eq!(v["c"], "q\"q");
    }

    #[test]
    fn escapes_raw_newlines_in_strings() {
        let v = parses("{\"code\": \"<div>\n  hi\n</div>\"}");
        assert_eq!(v["code"], "<div>\n  hi\n</div>");
    }

    #[test]
    fn drops_trailing_commas() {
        let v = parses(r#"{"a": [1, 2, ], "b": {"c": 1,},}"#);
        assert_eq!(v["a"], serde_json::json!([1, 2]));
        assert_eq!(v["b"]["c"], 1);
    }

    #[test]
    fn trailing_comma_inside_string_is_kept() {
        let v = parses(r#"{"a": "x, }"}"#);
        assert_eq!(v["a"], "x, }");
    }

    #[test]
    fn closes_unterminated_final_string() {
        let v = parses(r#"{"summary": "fixed the import}"#);
        assert_eq!(v["summary"], "fixed the import");
    }
}
