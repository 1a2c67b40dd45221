//! Recovery of structured JSON from free-form model output.
//!
//! Models wrap JSON in code fences, prepend chatter, leave `//` comments and
//! trailing commas, or forget to quote keys. Each strategy below is a pure
//! `&str -> Option<Value>` function; [`parse_structured`] tries them in
//! order and stops at the first success. Only objects and arrays count as
//! structured data.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    Unfenced,
    BalancedObject,
    TrailingCommaTolerant,
    BraceSpanRepair,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Unfenced => "unfenced",
            Strategy::BalancedObject => "balanced_object",
            Strategy::TrailingCommaTolerant => "trailing_comma_tolerant",
            Strategy::BraceSpanRepair => "brace_span_repair",
        }
    }
}

type StrategyFn = fn(&str) -> Option<Value>;

pub const STRATEGIES: [(Strategy, StrategyFn); 5] = [
    (Strategy::Direct, parse_direct),
    (Strategy::Unfenced, parse_unfenced),
    (Strategy::BalancedObject, parse_balanced_object),
    (Strategy::TrailingCommaTolerant, parse_trailing_comma_tolerant),
    (Strategy::BraceSpanRepair, parse_brace_span_repair),
];

pub fn parse_structured(text: &str) -> Option<Value> {
    parse_with_strategy(text).map(|(_, value)| value)
}

/// Like [`parse_structured`], also reporting which strategy succeeded.
pub fn parse_with_strategy(text: &str) -> Option<(Strategy, Value)> {
    STRATEGIES
        .iter()
        .find_map(|(strategy, parse)| parse(text).map(|value| (*strategy, value)))
}

fn structured(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

pub fn parse_direct(text: &str) -> Option<Value> {
    structured(text.trim())
}

pub fn parse_unfenced(text: &str) -> Option<Value> {
    structured(&strip_fences(text))
}

pub fn parse_balanced_object(text: &str) -> Option<Value> {
    let object = first_balanced_object(text)?;
    structured(&strip_line_comments(object))
}

pub fn parse_trailing_comma_tolerant(text: &str) -> Option<Value> {
    let object = first_balanced_object(text)?;
    structured(&strip_trailing_commas(&strip_line_comments(object)))
}

pub fn parse_brace_span_repair(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let span = &text[start..=end];
    let cleaned = strip_trailing_commas(&strip_line_comments(span));
    structured(&quote_bare_keys(&cleaned))
}

/// Removes surrounding code fences, including a language tag on the opening fence.
pub fn strip_fences(text: &str) -> String {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim().to_string()
}

/// The first `{ ... }` block whose braces balance, ignoring braces inside strings.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drops `//` comments that start outside string literals.
pub fn strip_line_comments(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;
    while let Some(ch) = chars.next() {
        if in_string {
            output.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if ch == '/' && chars.peek() == Some(&'/') {
            for next in chars.by_ref() {
                if next == '\n' {
                    output.push('\n');
                    break;
                }
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        }
        output.push(ch);
    }
    output
}

/// Removes commas that directly precede a closing bracket, outside strings.
pub fn strip_trailing_commas(text: &str) -> String {
    let chars = text.chars().collect::<Vec<_>>();
    let mut output = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in chars.iter().enumerate() {
        if in_string {
            output.push(*ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if *ch == ',' {
            let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        if *ch == '"' {
            in_string = true;
        }
        output.push(*ch);
    }
    output
}

fn bare_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_\-]*)\s*:"#).expect("valid bare key pattern")
    })
}

/// Quotes unquoted object keys, leaving string literals untouched.
pub fn quote_bare_keys(text: &str) -> String {
    let quote = |span: &str| bare_key_pattern().replace_all(span, r#"$1"$2":"#).into_owned();
    let mut output = String::with_capacity(text.len() + 16);
    let mut span_start = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => {
                    in_string = false;
                    output.push_str(&text[span_start..=idx]);
                    span_start = idx + 1;
                }
                _ => {}
            }
        } else if ch == '"' {
            output.push_str(&quote(&text[span_start..idx]));
            in_string = true;
            span_start = idx;
        }
    }
    let tail = &text[span_start..];
    if in_string {
        output.push_str(tail);
    } else {
        output.push_str(&quote(tail));
    }
    output
}

/// Convenience accessor for a non-empty string field of a parsed object.
pub fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn direct_parse_rejects_scalars() {
        assert_eq!(parse_direct(" {\"a\": 1} "), Some(json!({"a": 1})));
        assert_eq!(parse_direct("[1, 2]"), Some(json!([1, 2])));
        assert_eq!(parse_direct("42"), None);
        assert_eq!(parse_direct("\"text\""), None);
    }

    #[test]
    fn fenced_json_is_recovered_at_strategy_two() {
        let text = "```json\n{\"insight\": \"x\"}\n```";
        assert_eq!(parse_direct(text), None);
        let (strategy, value) = parse_with_strategy(text).expect("parsed");
        assert_eq!(strategy, Strategy::Unfenced);
        assert_eq!(value, json!({"insight": "x"}));
    }

    #[test]
    fn balanced_object_skips_prose_and_comments() {
        let text = "Sure! Here it is:\n{\n  \"url\": \"http://x.y\", // source\n  \"n\": {\"k\": 1}\n}\nHope that helps {";
        let (strategy, value) = parse_with_strategy(text).expect("parsed");
        assert_eq!(strategy, Strategy::BalancedObject);
        assert_eq!(value, json!({"url": "http://x.y", "n": {"k": 1}}));
    }

    #[test]
    fn trailing_commas_are_tolerated() {
        let text = "Result: {\"items\": [1, 2, 3,], \"ok\": true,}";
        let (strategy, value) = parse_with_strategy(text).expect("parsed");
        assert_eq!(strategy, Strategy::TrailingCommaTolerant);
        assert_eq!(value, json!({"items": [1, 2, 3], "ok": true}));
    }

    #[test]
    fn bare_keys_are_quoted_as_last_resort() {
        let text = "output: {insight: \"gpa is rising\", score: 3,}";
        let (strategy, value) = parse_with_strategy(text).expect("parsed");
        assert_eq!(strategy, Strategy::BraceSpanRepair);
        assert_eq!(value, json!({"insight": "gpa is rising", "score": 3}));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_key_repair() {
        let text = "{\"a\": \"unterminated { brace\", b: 2}";
        assert_eq!(parse_structured(text), Some(json!({"a": "unterminated { brace", "b": 2})));
    }

    #[test]
    fn key_like_text_inside_strings_is_left_alone() {
        let text = r#"{insight: "note, ratio: high", action: "{keep: this}"}"#;
        let (strategy, value) = parse_with_strategy(text).expect("parsed");
        assert_eq!(strategy, Strategy::BraceSpanRepair);
        assert_eq!(
            value,
            json!({"insight": "note, ratio: high", "action": "{keep: this}"})
        );
        assert_eq!(
            quote_bare_keys(r#"{a: "x \" b: y", c: 1}"#),
            r#"{"a": "x \" b: y", "c": 1}"#
        );
    }

    #[test]
    fn unrecoverable_text_yields_none() {
        assert_eq!(parse_structured("I could not analyse this column."), None);
        assert_eq!(parse_structured("} backwards {"), None);
        assert_eq!(parse_structured(""), None);
    }

    #[test]
    fn comment_markers_inside_strings_survive() {
        assert_eq!(
            strip_line_comments("{\"u\": \"a//b\"} // tail"),
            "{\"u\": \"a//b\"} "
        );
    }

    #[test]
    fn string_field_trims_and_rejects_blank() {
        let value = json!({"insight": "  rising  ", "empty": " "});
        assert_eq!(string_field(&value, "insight").as_deref(), Some("rising"));
        assert_eq!(string_field(&value, "empty"), None);
        assert_eq!(string_field(&value, "missing"), None);
    }
}
