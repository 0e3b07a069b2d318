//! Text-API resolution: heterogeneous JSON shape extraction, plain
//! bodies, and long-text segmentation.

use crate::error::{Error, Result};
use crate::http::{self, TEXT_USER_AGENT};
use serde_json::Value;

/// Marker returned when an endpoint answers with an empty body.
pub const EMPTY_CONTENT: &str = "空内容";

/// Diagnostic-flow segmentation kicks in above this length.
pub const LONG_TEXT_THRESHOLD: usize = 1000;

/// Maximum chunk length for segmented diagnostic output.
pub const SEGMENT_MAX_LEN: usize = 1500;

fn string_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Extract display text from a JSON payload.
///
/// Well-known shapes are tried in a fixed priority order kept compatible
/// with deployed endpoints (hitokoto-style quote APIs first). Unknown
/// shapes fall back to the first non-empty string field, then to a
/// pretty-printed dump of the whole payload.
pub fn extract_text(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            if let Some(quote) = string_field(value, "hitokoto") {
                let source = string_field(value, "from").unwrap_or("未知");
                return format!("{quote}\n—— {source}");
            }
            for key in ["text", "content"] {
                if let Some(text) = string_field(value, key) {
                    return text.to_string();
                }
            }
            if let Some(data @ Value::Object(_)) = value.get("data") {
                for key in ["text", "content"] {
                    if let Some(text) = string_field(data, key) {
                        return text.to_string();
                    }
                }
            }
            if let Some(text) = string_field(value, "msg") {
                return text.to_string();
            }
            for (_, field) in map {
                if let Some(text) = field.as_str()
                    && !text.trim().is_empty()
                {
                    return text.to_string();
                }
            }
        }
        Value::Array(items) => {
            if let Some(first) = items.first() {
                return extract_text(first);
            }
        }
        _ => {}
    }
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Fetch a text endpoint and resolve its body to display text.
///
/// `Ok` may carry an empty string (endpoint answered with blank content);
/// the caller decides how to word that.
pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, TEXT_USER_AGENT)
        .send()
        .await
        .map_err(Error::from_reqwest)?;
    let status = response.status().as_u16();
    if status != 200 {
        return Err(Error::UpstreamHttp { status });
    }
    let content_type = http::content_type_of(&response);
    let body = response.text().await.map_err(Error::from_reqwest)?;
    if content_type.contains("application/json") {
        let value: Value = serde_json::from_str(&body)
            .map_err(|err| Error::MalformedResponse(err.to_string()))?;
        Ok(extract_text(&value))
    } else {
        Ok(body.trim().to_string())
    }
}

/// Split `text` into chunks of at most `max_len` characters, preferring to
/// break after the last newline, full stop, period or space inside the
/// current window. Concatenating the parts reproduces the input exactly.
pub fn split_long_text(text: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return vec![text.to_string()];
    }
    let mut parts = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + max_len).min(chars.len());
        if end < chars.len() {
            // Scan back for a break character; the break stays with the
            // left part.
            if let Some(split) = (start + 1..end)
                .rev()
                .find(|&i| matches!(chars[i], '\n' | '。' | '.' | ' '))
            {
                end = split + 1;
            }
        }
        parts.push(chars[start..end].iter().collect());
        start = end;
    }
    parts
}
