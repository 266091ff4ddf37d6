//! Serde helpers for fields the providers serve inconsistently (ids as numbers or strings,
//! amounts as numbers or strings).
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where D: Deserializer<'de> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("expected string or number, got {other}"))),
    }
}

pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where D: Deserializer<'de> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!("expected string or number, got {other}"))),
    }
}

pub(crate) fn opt_flexible_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where D: Deserializer<'de> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => s.parse::<f64>().map(Some).map_err(de::Error::custom),
        Some(other) => Err(de::Error::custom(format!("expected numeric value, got {other}"))),
    }
}

pub(crate) fn opt_flexible_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where D: Deserializer<'de> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_i64()),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => s.parse::<i64>().map(Some).map_err(de::Error::custom),
        Some(other) => Err(de::Error::custom(format!("expected integer value, got {other}"))),
    }
}
