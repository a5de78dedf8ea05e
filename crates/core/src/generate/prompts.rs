//! Prompt construction and response parsing for section generation.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::collections::HashMap;

/// Shared system prompt for every generation call.
pub const SYSTEM_PROMPT: &str = "You are an analyst who turns source material into a structured \
briefing document. Write clear, factual prose grounded only in the source. Do not invent \
figures, names or dates that the source does not contain.";

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n(.*?)\n?\s*```\s*$").expect("valid fence regex")
});

/// Prompt asking for every section in a single JSON object.
pub fn batch_prompt(source: &str, sections: &[String]) -> String {
    let list = sections
        .iter()
        .map(|s| format!("- {}", s))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Write the following sections of a briefing document based on the source material below.

Sections:
{list}

Respond with ONLY a JSON object. Each key must be one of the section names exactly as listed,
and each value must be the section's text as plain prose (no markdown headings).

Source material:
<<<
{source}
>>>"#
    )
}

/// Prompt asking for one section as plain text.
pub fn section_prompt(source: &str, section: &str, all_sections: &[String]) -> String {
    format!(
        r#"Write the "{section}" section of a briefing document based on the source material below.
The full document has these sections: {outline}.
Only write the "{section}" section. Respond with the section text only, as plain prose,
without the section heading.

Source material:
<<<
{source}
>>>"#,
        outline = all_sections.join(", ")
    )
}

/// Cuts `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_source(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Removes a surrounding markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}

/// Parses the all-sections response into `(requested name, content)` pairs.
///
/// Keys are matched case-insensitively. Requested sections with no usable
/// value map to `None`. Fails when the body is not a JSON object.
pub fn parse_sections_response(
    raw: &str,
    requested: &[String],
) -> Result<Vec<(String, Option<String>)>, String> {
    let body = strip_code_fence(raw);
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("response is not valid JSON: {}", e))?;
    let object = value
        .as_object()
        .ok_or_else(|| "response is not a JSON object".to_string())?;

    let by_key: HashMap<String, &serde_json::Value> = object
        .iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v))
        .collect();

    Ok(requested
        .iter()
        .map(|name| {
            let content = by_key
                .get(&name.trim().to_lowercase())
                .and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.trim().to_string()),
                    serde_json::Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|s| !s.is_empty());
            (name.clone(), content)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_matches_keys_case_insensitively() {
        let raw = "```json\n{\"executive summary\": \"Short.\", \"BUDGET\": \"Ten.\"}\n```";
        let parsed =
            parse_sections_response(raw, &names(&["Executive Summary", "Timeline", "Budget"]))
                .unwrap();

        assert_eq!(parsed[0], ("Executive Summary".to_string(), Some("Short.".to_string())));
        assert_eq!(parsed[1], ("Timeline".to_string(), None));
        assert_eq!(parsed[2], ("Budget".to_string(), Some("Ten.".to_string())));
    }

    #[test]
    fn test_parse_treats_blank_values_as_missing() {
        let parsed = parse_sections_response("{\"A\": \"   \", \"B\": null}", &names(&["A", "B"]))
            .unwrap();
        assert!(parsed.iter().all(|(_, c)| c.is_none()));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(parse_sections_response("[1, 2]", &names(&["A"])).is_err());
        assert!(parse_sections_response("Sure! Here is the document", &names(&["A"])).is_err());
    }

    #[test]
    fn test_truncate_source_respects_char_boundaries() {
        assert_eq!(truncate_source("héllo", 2), "hé");
        assert_eq!(truncate_source("abc", 10), "abc");
    }

    #[test]
    fn test_prompts_mention_sections() {
        let sections = names(&["Introduction", "Budget"]);
        let batch = batch_prompt("source text", &sections);
        assert!(batch.contains("- Introduction"));
        assert!(batch.contains("- Budget"));
        assert!(batch.contains("source text"));

        let single = section_prompt("source text", "Budget", &sections);
        assert!(single.contains("\"Budget\""));
        assert!(single.contains("Introduction, Budget"));
    }
}
