//! Recovery of a single JSON object from free-form model output.
//!
//! Models are told to answer with bare JSON but routinely wrap it in code
//! fences, prepend a sentence, or emit single quotes and trailing commas.
//! [`recover_object`] tries, in order:
//!
//! 1. strict parse of the (fence-stripped) text
//! 2. strict parse of the span from the first `{` to the last `}`
//! 3. the same span with single quotes swapped for double quotes and
//!    trailing commas removed

use serde_json::{Map, Value};

/// Extract a JSON object from model text, or `None` if nothing usable is found.
pub fn recover_object(text: &str) -> Option<Map<String, Value>> {
    let body = strip_fences(text.trim());

    if let Some(obj) = parse_object(body) {
        return Some(obj);
    }

    let span = object_span(body)?;
    if let Some(obj) = parse_object(span) {
        return Some(obj);
    }

    let fixed = strip_trailing_commas(&span.replace('\'', "\""));
    parse_object(&fixed)
}

fn parse_object(s: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Drop a surrounding ```` ``` ```` / ```` ```json ```` fence.
fn strip_fences(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Skip the language tag line, if any.
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn object_span(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

/// Remove commas that directly precede (modulo whitespace) a `}` or `]`.
fn strip_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
