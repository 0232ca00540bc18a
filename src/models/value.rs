//! Parameter values and argument sets.
//!
//! A statement receives its arguments either as a [`NamedArgs`] mapping, matched
//! against `:name` tokens, or as an ordered slice of [`SqlValue`]s bound by position.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// A parameter value for parameterized statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(serialize_with = "base64_bytes::serialize", skip_deserializing)]
    Bytes(Vec<u8>),
    /// Arrays and objects, bound as JSON documents
    Json(JsonValue),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }

    /// Parse a command-line style value: JSON when it parses, a plain string otherwise.
    pub fn parse_loose(raw: &str) -> Self {
        serde_json::from_str::<JsonValue>(raw)
            .map(Self::from)
            .unwrap_or_else(|_| Self::String(raw.to_string()))
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}

impl From<JsonValue> for SqlValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(v) => Self::Bool(v),
            JsonValue::Number(n) => match n.as_i64() {
                Some(v) => Self::Int(v),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Json(JsonValue::Number(n))),
            },
            JsonValue::String(v) => Self::String(v),
            other => Self::Json(other),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Named arguments for a statement, keyed by parameter name (without the colon).
///
/// A key mapped to [`SqlValue::Null`] is present; a key that was never inserted is
/// absent, and referencing it from SQL is an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamedArgs {
    values: HashMap<String, SqlValue>,
}

impl NamedArgs {
    /// Create an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace an argument.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Look up an argument by name.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values.get(name)
    }

    /// True when the key exists, even if its value is null.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// True when the key exists and its value is not null.
    pub fn is_set(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|v| !v.is_null())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for NamedArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sql_value_types() {
        assert!(SqlValue::Null.is_null());
        assert!(!SqlValue::Bool(true).is_null());
        assert_eq!(SqlValue::Int(42).type_name(), "int");
        assert_eq!(SqlValue::from("hello").type_name(), "string");
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3)), SqlValue::Int(3));
    }

    #[test]
    fn test_sql_value_from_json() {
        assert_eq!(SqlValue::from(json!(7)), SqlValue::Int(7));
        assert_eq!(SqlValue::from(json!(1.5)), SqlValue::Float(1.5));
        assert_eq!(SqlValue::from(json!(null)), SqlValue::Null);
        assert_eq!(
            SqlValue::from(json!({"a": 1})),
            SqlValue::Json(json!({"a": 1}))
        );
    }

    #[test]
    fn test_parse_loose() {
        assert_eq!(SqlValue::parse_loose("10"), SqlValue::Int(10));
        assert_eq!(SqlValue::parse_loose("true"), SqlValue::Bool(true));
        assert_eq!(SqlValue::parse_loose("null"), SqlValue::Null);
        assert_eq!(
            SqlValue::parse_loose("alice"),
            SqlValue::String("alice".to_string())
        );
        assert_eq!(
            SqlValue::parse_loose("\"42\""),
            SqlValue::String("42".to_string())
        );
    }

    #[test]
    fn test_bytes_serialize_as_base64() {
        let value = SqlValue::Bytes(b"hi".to_vec());
        assert_eq!(serde_json::to_value(&value).unwrap(), json!("aGk="));
    }

    #[test]
    fn test_named_args_presence() {
        let args = NamedArgs::new().with("limit", 10).with("offset", SqlValue::Null);
        assert!(args.contains("limit"));
        assert!(args.is_set("limit"));
        assert!(args.contains("offset"));
        assert!(!args.is_set("offset"));
        assert!(!args.contains("missing"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_named_args_deserialize() {
        let args: NamedArgs = serde_json::from_str(r#"{"a": 1, "b": null}"#).unwrap();
        assert_eq!(args.get("a"), Some(&SqlValue::Int(1)));
        assert_eq!(args.get("b"), Some(&SqlValue::Null));
    }
}
