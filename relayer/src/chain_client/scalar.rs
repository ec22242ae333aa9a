//! Tolerant decoding of ledger scalars.
//!
//! Ledger RPC answers arrive as JSON numbers, decimal strings (sometimes
//! with thousands separators), or `0x`-prefixed hex. These helpers never
//! panic: anything unexpected becomes `None`.

use serde_json::Value;

fn strip_hex(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}

/// Decodes an unsigned integer scalar.
pub fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = strip_hex(s) {
                if hex.is_empty() {
                    return None;
                }
                return u64::from_str_radix(hex, 16).ok();
            }
            let digits: String = s.chars().filter(|c| *c != ',' && *c != '_').collect();
            if digits.is_empty() {
                return None;
            }
            digits.parse().ok()
        }
        _ => None,
    }
}

/// Decodes a `u32` scalar, rejecting values that do not fit.
pub fn parse_u32(value: &Value) -> Option<u32> {
    parse_u64(value).and_then(|v| u32::try_from(v).ok())
}

/// Decodes a `0x`-prefixed hex byte string. An empty `0x` is empty bytes.
pub fn parse_bytes(value: &Value) -> Option<Vec<u8>> {
    let s = value.as_str()?.trim();
    hex::decode(strip_hex(s)?).ok()
}

/// Decodes a non-empty string; hex-encoded UTF-8 is accepted too.
pub fn parse_string(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    match strip_hex(s) {
        Some(hex) => hex::decode(hex)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .filter(|s| !s.is_empty()),
        None => Some(s.to_string()),
    }
}

/// Decodes a list of `u32` scalars. Any malformed element fails the list.
pub fn parse_u32_list(value: &Value) -> Option<Vec<u32>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::Array(items) => items.iter().map(parse_u32).collect(),
        _ => None,
    }
}

/// Decodes a list of strings. Any malformed element fails the list.
pub fn parse_string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::Array(items) => items.iter().map(parse_string).collect(),
        _ => None,
    }
}
