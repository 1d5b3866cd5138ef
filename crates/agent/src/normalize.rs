//! Boundary normalization for untrusted text: candidate ids, money amounts,
//! and JSON embedded in completion output.

use std::sync::LazyLock;

use regex_lite::Regex;

static CANDIDATE_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bCAND-([A-Z0-9_-]+)").ok());

/// The first `CAND-XXX` id in `text`, upper-cased.
pub fn extract_candidate_id(text: &str) -> Option<String> {
    let re = CANDIDATE_ID.as_ref()?;
    let caps = re.captures(text)?;
    let suffix = caps.get(1)?.as_str().trim_end_matches(['-', '_']);
    if suffix.is_empty() {
        return None;
    }
    Some(format!("CAND-{}", suffix.to_ascii_uppercase()))
}

/// Parse a money amount: `$150k`, `150,000`, `1.5m`, `€98000`.
///
/// Zero, negative, and unparseable values are rejected.
pub fn parse_money(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | '¥' | ' ' | '_'))
        .collect();
    let cleaned = cleaned
        .trim_start_matches("usd")
        .trim_end_matches("usd")
        .to_string();

    let (number, multiplier) = if let Some(n) = cleaned.strip_suffix('k') {
        (n, 1_000.0)
    } else if let Some(n) = cleaned.strip_suffix('m') {
        (n, 1_000_000.0)
    } else {
        (cleaned.as_str(), 1.0)
    };

    let value: f64 = number.parse().ok()?;
    let value = value * multiplier;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// A money amount from a JSON value, string or number.
pub fn money_from_json(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite() && *v > 0.0),
        serde_json::Value::String(s) => parse_money(s),
        _ => None,
    }
}

/// The first balanced `{ ... }` object in `text`, parsed.
///
/// Completion output often wraps JSON in prose or code fences.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
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
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + offset + 1;
                    return serde_json::from_str(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Whether a JSON value is an explicit "nothing": null, empty, or the
/// strings "null"/"none".
pub fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s.eq_ignore_ascii_case("null") || s.eq_ignore_ascii_case("none")
        }
        _ => false,
    }
}

/// Render a JSON scalar as plain text.
pub fn json_to_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
