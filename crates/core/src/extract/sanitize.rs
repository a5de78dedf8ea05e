//! Cleanup applied to all extracted text.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static HYPHEN_NEWLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<prefix>\w)-[ \t]*\r?\n[ \t]*(?P<suffix>\w)").expect("valid regex")
});

/// Joins words hyphenated across line breaks, collapses runs of whitespace
/// inside lines and squeezes blank-line runs to a single paragraph break.
pub fn sanitize_extracted_text(raw: &str) -> String {
    let raw = raw.replace('\u{0}', "");
    let joined = HYPHEN_NEWLINE.replace_all(&raw, "$prefix$suffix");

    let mut result = String::with_capacity(joined.len());
    let mut prev_was_blank = false;
    let mut first_content = true;

    for line in joined.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            prev_was_blank = true;
            continue;
        }
        if !first_content {
            result.push_str(if prev_was_blank { "\n\n" } else { "\n" });
        }
        collapse_whitespace(trimmed, &mut result);
        prev_was_blank = false;
        first_content = false;
    }

    result
}

fn collapse_whitespace(line: &str, out: &mut String) {
    let mut prev_was_space = false;
    for ch in line.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                out.push(' ');
            }
            prev_was_space = true;
        } else {
            out.push(ch);
            prev_was_space = false;
        }
    }
}
