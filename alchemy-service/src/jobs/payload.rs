//! Typed key/value payload carried by a job.

use std::collections::BTreeMap;

use bytes::Bytes;
use thiserror::Error;

/// A single payload value.
///
/// Binary content is held as `Bytes` so cloning a payload never copies an
/// uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Bytes(Bytes),
    Text(String),
    Bool(bool),
    Int(i64),
    Json(serde_json::Value),
    Null,
}

impl PayloadValue {
    fn type_name(&self) -> &'static str {
        match self {
            PayloadValue::Bytes(_) => "bytes",
            PayloadValue::Text(_) => "string",
            PayloadValue::Bool(_) => "bool",
            PayloadValue::Int(_) => "integer",
            PayloadValue::Json(_) => "json",
            PayloadValue::Null => "null",
        }
    }
}

impl From<Bytes> for PayloadValue {
    fn from(value: Bytes) -> Self {
        PayloadValue::Bytes(value)
    }
}

impl From<Vec<u8>> for PayloadValue {
    fn from(value: Vec<u8>) -> Self {
        PayloadValue::Bytes(Bytes::from(value))
    }
}

impl From<&'static [u8]> for PayloadValue {
    fn from(value: &'static [u8]) -> Self {
        PayloadValue::Bytes(Bytes::from_static(value))
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        PayloadValue::Text(value)
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::Text(value.to_string())
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        PayloadValue::Bool(value)
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        PayloadValue::Int(value)
    }
}

impl From<serde_json::Value> for PayloadValue {
    fn from(value: serde_json::Value) -> Self {
        PayloadValue::Json(value)
    }
}

impl<T: Into<PayloadValue>> From<Option<T>> for PayloadValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PayloadValue::Null, Into::into)
    }
}

/// Payload lookup failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayloadError {
    #[error("missing required key '{key}'")]
    Missing { key: String },

    #[error("key '{key}' must be {expected}, got {actual}")]
    WrongType {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("key '{key}' has invalid value: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Mapping of string keys to values; its shape depends on the task kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload(BTreeMap<String, PayloadValue>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PayloadValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// A key counts as present only when it holds a non-null value.
    pub fn contains(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(value) if *value != PayloadValue::Null)
    }

    fn present(&self, key: &str) -> Option<&PayloadValue> {
        self.0.get(key).filter(|value| **value != PayloadValue::Null)
    }

    fn require(&self, key: &str) -> Result<&PayloadValue, PayloadError> {
        self.present(key).ok_or_else(|| PayloadError::Missing {
            key: key.to_string(),
        })
    }

    fn wrong_type(key: &str, expected: &'static str, actual: &PayloadValue) -> PayloadError {
        PayloadError::WrongType {
            key: key.to_string(),
            expected,
            actual: actual.type_name(),
        }
    }

    /// Required binary content. Text values are accepted as their UTF-8 bytes.
    pub fn bytes(&self, key: &str) -> Result<Bytes, PayloadError> {
        match self.require(key)? {
            PayloadValue::Bytes(bytes) => Ok(bytes.clone()),
            PayloadValue::Text(text) => Ok(Bytes::from(text.clone().into_bytes())),
            other => Err(Self::wrong_type(key, "bytes", other)),
        }
    }

    /// Required string.
    pub fn string(&self, key: &str) -> Result<String, PayloadError> {
        match self.require(key)? {
            PayloadValue::Text(text) => Ok(text.clone()),
            other => Err(Self::wrong_type(key, "a string", other)),
        }
    }

    /// Optional string; absent and null both yield `None`.
    pub fn opt_string(&self, key: &str) -> Result<Option<String>, PayloadError> {
        match self.present(key) {
            None => Ok(None),
            Some(PayloadValue::Text(text)) => Ok(Some(text.clone())),
            Some(other) => Err(Self::wrong_type(key, "a string", other)),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, PayloadError> {
        match self.present(key) {
            None => Ok(default),
            Some(PayloadValue::Bool(value)) => Ok(*value),
            Some(PayloadValue::Json(serde_json::Value::Bool(value))) => Ok(*value),
            Some(other) => Err(Self::wrong_type(key, "a bool", other)),
        }
    }

    pub fn int_or(&self, key: &str, default: i64) -> Result<i64, PayloadError> {
        match self.present(key) {
            None => Ok(default),
            Some(PayloadValue::Int(value)) => Ok(*value),
            Some(value @ PayloadValue::Json(json)) => json
                .as_i64()
                .ok_or_else(|| Self::wrong_type(key, "an integer", value)),
            Some(other) => Err(Self::wrong_type(key, "an integer", other)),
        }
    }

    /// Optional JSON value. Plain strings are wrapped as JSON strings.
    pub fn opt_json(&self, key: &str) -> Result<Option<serde_json::Value>, PayloadError> {
        match self.present(key) {
            None => Ok(None),
            Some(PayloadValue::Json(json)) => Ok(Some(json.clone())),
            Some(PayloadValue::Text(text)) => Ok(Some(serde_json::Value::String(text.clone()))),
            Some(other) => Err(Self::wrong_type(key, "json", other)),
        }
    }

    /// Optional map of string to string, given as a JSON object.
    pub fn string_map(&self, key: &str) -> Result<BTreeMap<String, String>, PayloadError> {
        let Some(value) = self.present(key) else {
            return Ok(BTreeMap::new());
        };
        let PayloadValue::Json(serde_json::Value::Object(object)) = value else {
            return Err(Self::wrong_type(key, "a json object", value));
        };

        object
            .iter()
            .map(|(name, value)| match value {
                serde_json::Value::String(text) => Ok((name.clone(), text.clone())),
                _ => Err(PayloadError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("entry '{name}' is not a string"),
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_lookups() {
        let payload = Payload::new()
            .with("content", b"hello".as_slice())
            .with("filename", "a.md");

        assert_eq!(payload.bytes("content").unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(payload.string("filename").unwrap(), "a.md");
        assert_eq!(
            payload.string("url"),
            Err(PayloadError::Missing {
                key: "url".to_string()
            })
        );
    }

    #[test]
    fn test_null_counts_as_missing() {
        let payload = Payload::new().with("prompt", None::<String>);
        assert!(!payload.contains("prompt"));
        assert_eq!(payload.opt_string("prompt").unwrap(), None);
        assert!(payload.string("prompt").is_err());
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let payload = Payload::new().with("diarize", "yes");
        let error = payload.bool_or("diarize", false).unwrap_err();
        assert_eq!(
            error.to_string(),
            "key 'diarize' must be a bool, got string"
        );
    }

    #[test]
    fn test_defaults_apply_when_absent() {
        let payload = Payload::new();
        assert!(payload.bool_or("extract_tables", true).unwrap());
        assert_eq!(payload.int_or("max_depth", 1).unwrap(), 1);
        assert!(payload.string_map("headers").unwrap().is_empty());
    }

    #[test]
    fn test_string_map() {
        let payload = Payload::new().with("headers", json!({"Accept": "text/html"}));
        let headers = payload.string_map("headers").unwrap();
        assert_eq!(headers.get("Accept").map(String::as_str), Some("text/html"));

        let bad = Payload::new().with("headers", json!({"Retry": 3}));
        assert!(matches!(
            bad.string_map("headers"),
            Err(PayloadError::InvalidValue { .. })
        ));
    }
}
