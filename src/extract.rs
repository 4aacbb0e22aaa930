//! Tool-call extraction from rendered chat text.
//!
//! Pure functions over a text blob: find every non-overlapping
//! `<tool ...>...</tool>` block and parse it, tolerating the serialization
//! dialects models actually emit. Callers are responsible for dedup; the same
//! text can be scanned repeatedly and yields identical results.

use once_cell::sync::Lazy;
use regex::Regex;

use chatlink_protocols::Command;

static TOOL_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<tool(?:\s[^>]*)?>.*?</tool>").expect("tool block regex"));

static TOOL_HEAD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^<tool\s+name="([^"]+)"(?:\s+call_id="([^"]+)")?"#).expect("tool head regex")
});

static PARAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<parameter\s+name="([^"]+)">(.*?)</parameter>"#).expect("parameter regex")
});

/// One matched tool block.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence<'a> {
    /// The raw matched text, delimiters included. Input to content-hash
    /// dedup keys.
    pub raw: &'a str,

    /// The parsed command, or `None` when every dialect failed. An
    /// unparsable occurrence never affects its siblings.
    pub command: Option<Command>,
}

/// Extract all tool calls from `text`.
///
/// Lazy, finite, restartable; occurrences are non-overlapping and appear in
/// source order.
pub fn extract(text: &str) -> impl Iterator<Item = Occurrence<'_>> + '_ {
    TOOL_BLOCK_RE.find_iter(text).map(|m| {
        let raw = m.as_str();
        Occurrence {
            raw,
            command: parse_occurrence(raw),
        }
    })
}

/// Parse one raw block, trying each dialect in order with early exit:
/// structured tags, strict JSON payload, then quote-repaired JSON payload.
fn parse_occurrence(raw: &str) -> Option<Command> {
    if let Some(cmd) = parse_tagged(raw) {
        return Some(cmd);
    }
    let inner = strip_wrapper(raw);
    parse_json(inner).or_else(|| parse_json(&repair_quotes(inner)))
}

/// Dialect (a): `<tool name="..." call_id="...">` with nested
/// `<parameter name="...">` bodies. Parameter values stay verbatim strings.
fn parse_tagged(raw: &str) -> Option<Command> {
    let head = TOOL_HEAD_RE.captures(raw)?;
    let mut args = serde_json::Map::new();
    for param in PARAM_RE.captures_iter(raw) {
        args.insert(
            param[1].to_string(),
            serde_json::Value::String(param[2].to_string()),
        );
    }
    Some(Command {
        name: head[1].to_string(),
        args,
        call_id: head.get(2).map(|m| m.as_str().to_string()),
    })
}

/// Dialect (b): the inner payload is a JSON command object.
fn parse_json(payload: &str) -> Option<Command> {
    serde_json::from_str(payload).ok()
}

/// The payload between the opening and closing tool tags, trimmed.
fn strip_wrapper(raw: &str) -> &str {
    let start = raw.find('>').map(|i| i + 1).unwrap_or(0);
    let end = raw.rfind("</tool>").unwrap_or(raw.len());
    raw[start..end.max(start)].trim()
}

/// Dialect (c) repair pass: re-escape quotation marks that sit inside string
/// literals. A quote closes a string only when the next non-space character
/// is a structural delimiter (`:`, `,`, `}`, `]`); any other quote is model
/// output that forgot its backslash.
pub fn repair_quotes(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut result = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;

    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if escaped {
            result.push(ch);
            escaped = false;
            i += 1;
            continue;
        }
        if ch == '\\' {
            result.push(ch);
            escaped = true;
            i += 1;
            continue;
        }
        if ch == '"' {
            if !in_string {
                in_string = true;
                result.push(ch);
                i += 1;
                continue;
            }
            let mut j = i + 1;
            while j < chars.len() && chars[j] == ' ' {
                j += 1;
            }
            match chars.get(j) {
                Some(':') | Some(',') | Some('}') | Some(']') => {
                    in_string = false;
                    result.push(ch);
                }
                _ => result.push_str("\\\""),
            }
            i += 1;
            continue;
        }
        result.push(ch);
        i += 1;
    }
    result
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
