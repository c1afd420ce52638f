//! Core Database Backend Traits
//!
//! Backends see only schema names, flat keys and [`DatabaseValue`]s. Nested
//! groups, identifier strategies and middleware are resolved before a request
//! reaches this layer.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::backends::DatabaseBackendType;
use crate::error::OrmResult;
use crate::model::field::CodecKind;
use crate::query::QuerySpec;

/// One stored record as a flat key/value map
pub type Row = BTreeMap<String, DatabaseValue>;

/// Key under which count and bulk-write results are reported
pub const AGGREGATE_KEY: &str = "aggregate";

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    /// Case of a named enum type; lowered to text by backends without native enums
    Enum { name: String, case: String },
    Json(JsonValue),
    Array(Vec<DatabaseValue>),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            DatabaseValue::Enum { case, .. } => Some(case),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DatabaseValue::Float64(f) => Some(*f),
            DatabaseValue::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Replace native enum cases with their textual form
    pub fn lower_enum(self) -> Self {
        match self {
            DatabaseValue::Enum { case, .. } => DatabaseValue::String(case),
            DatabaseValue::Array(items) => {
                DatabaseValue::Array(items.into_iter().map(DatabaseValue::lower_enum).collect())
            }
            other => other,
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int64(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::Array(
                b.iter()
                    .map(|&x| JsonValue::Number(serde_json::Number::from(x)))
                    .collect(),
            ),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => {
                JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            DatabaseValue::Enum { case, .. } => JsonValue::String(case.clone()),
            DatabaseValue::Json(j) => j.clone(),
            DatabaseValue::Array(arr) => JsonValue::Array(arr.iter().map(|v| v.to_json()).collect()),
        }
    }

    /// Create DatabaseValue from JSON value
    ///
    /// Strings stay strings; callers that expect identifiers or timestamps
    /// decode them through the field codec.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => DatabaseValue::Null,
            JsonValue::Bool(b) => DatabaseValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DatabaseValue::Int64(i)
                } else if let Some(f) = n.as_f64() {
                    DatabaseValue::Float64(f)
                } else {
                    DatabaseValue::Null
                }
            }
            JsonValue::String(s) => DatabaseValue::String(s),
            JsonValue::Array(arr) => {
                DatabaseValue::Array(arr.into_iter().map(DatabaseValue::from_json).collect())
            }
            JsonValue::Object(_) => DatabaseValue::Json(json),
        }
    }
}

impl fmt::Display for DatabaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseValue::Null => write!(f, "NULL"),
            DatabaseValue::Bool(b) => write!(f, "{}", b),
            DatabaseValue::Int64(i) => write!(f, "{}", i),
            DatabaseValue::Float64(v) => write!(f, "{}", v),
            DatabaseValue::String(s) => write!(f, "'{}'", s),
            DatabaseValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            DatabaseValue::Uuid(u) => write!(f, "{}", u),
            DatabaseValue::DateTime(dt) => {
                write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            DatabaseValue::Enum { name, case } => write!(f, "{}::{}", name, case),
            DatabaseValue::Json(j) => write!(f, "{}", j),
            DatabaseValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int64(value as i64)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl From<Uuid> for DatabaseValue {
    fn from(value: Uuid) -> Self {
        DatabaseValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(value: DateTime<Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// Storage key and codec of one column, as seen by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub key: String,
    pub kind: CodecKind,
}

impl ColumnSpec {
    pub fn new(key: impl Into<String>, kind: CodecKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }
}

/// Semantic differences between backends that the core must respect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Single-row creates report the identifier the backend generated
    pub returns_generated_identifiers: bool,
    /// Enum cases are stored in a native enum type rather than as text
    pub native_enums: bool,
    /// Queries may join other schemas
    pub joins: bool,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            returns_generated_identifiers: true,
            native_enums: false,
            joins: true,
        }
    }
}

/// Kind of identifier-keyed write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteKind::Create => write!(f, "create"),
            WriteKind::Update => write!(f, "update"),
            WriteKind::Delete => write!(f, "delete"),
        }
    }
}

/// A single round trip that creates, updates or deletes records
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub schema: String,
    pub kind: WriteKind,
    pub identifier_key: String,
    /// Record targeted by updates and deletes
    pub identifier: Option<DatabaseValue>,
    /// Records to insert for creates, one row of assignments for updates
    pub rows: Vec<Row>,
    pub columns: Vec<ColumnSpec>,
    /// Identifier is generated by the backend and should be reported back
    pub returns_identifier: bool,
}

impl WriteRequest {
    pub fn create(schema: &str, identifier_key: &str, rows: Vec<Row>) -> Self {
        Self {
            schema: schema.to_string(),
            kind: WriteKind::Create,
            identifier_key: identifier_key.to_string(),
            identifier: None,
            rows,
            columns: Vec::new(),
            returns_identifier: false,
        }
    }

    pub fn update(schema: &str, identifier_key: &str, identifier: DatabaseValue, row: Row) -> Self {
        Self {
            schema: schema.to_string(),
            kind: WriteKind::Update,
            identifier_key: identifier_key.to_string(),
            identifier: Some(identifier),
            rows: vec![row],
            columns: Vec::new(),
            returns_identifier: false,
        }
    }

    pub fn delete(schema: &str, identifier_key: &str, identifier: DatabaseValue) -> Self {
        Self {
            schema: schema.to_string(),
            kind: WriteKind::Delete,
            identifier_key: identifier_key.to_string(),
            identifier: Some(identifier),
            rows: Vec::new(),
            columns: Vec::new(),
            returns_identifier: false,
        }
    }

    pub fn with_columns(mut self, columns: Vec<ColumnSpec>) -> Self {
        self.columns = columns;
        self
    }

    pub fn returning_identifier(mut self, returns: bool) -> Self {
        self.returns_identifier = returns;
        self
    }

    /// Codec of a column, when the request carries column metadata
    pub fn column_kind(&self, key: &str) -> Option<&CodecKind> {
        self.columns.iter().find(|c| c.key == key).map(|c| &c.kind)
    }
}

/// Result of a write round trip
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    pub affected: u64,
    /// Identifier generated for a single-row create, if the backend reports it
    pub generated_identifier: Option<DatabaseValue>,
}

/// Abstract database backend consumed by the ORM core
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Get the backend type
    fn backend_type(&self) -> DatabaseBackendType;

    /// Semantic capabilities of this backend
    fn capabilities(&self) -> BackendCapabilities;

    /// Execute a compiled query
    ///
    /// Reads return one row per record; joined columns are keyed
    /// `"<schema or alias>.<key>"`. Count, bulk update and bulk delete return a
    /// single row holding [`AGGREGATE_KEY`].
    async fn execute(&self, query: &QuerySpec) -> OrmResult<Vec<Row>>;

    /// Execute an identifier-keyed write
    async fn execute_write(&self, request: WriteRequest) -> OrmResult<WriteOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_conversion() {
        let value = DatabaseValue::from_json(serde_json::json!({"a": 1}));
        assert!(matches!(value, DatabaseValue::Json(_)));

        assert_eq!(DatabaseValue::from_json(serde_json::json!(42)), DatabaseValue::Int64(42));
        assert_eq!(DatabaseValue::from_json(serde_json::json!(1.5)), DatabaseValue::Float64(1.5));
        assert_eq!(
            DatabaseValue::from_json(serde_json::json!("Earth")),
            DatabaseValue::String("Earth".to_string())
        );

        let array = DatabaseValue::Array(vec![DatabaseValue::Int64(1), DatabaseValue::Null]);
        assert_eq!(array.to_json(), serde_json::json!([1, null]));
    }

    #[test]
    fn test_enum_lowering() {
        let value = DatabaseValue::Enum {
            name: "pet_kind".to_string(),
            case: "cat".to_string(),
        };
        assert_eq!(value.as_str(), Some("cat"));
        assert_eq!(value.lower_enum(), DatabaseValue::String("cat".to_string()));
    }

    #[test]
    fn test_option_conversion() {
        let none: Option<i64> = None;
        assert!(DatabaseValue::from(none).is_null());
        assert_eq!(DatabaseValue::from(Some("x")), DatabaseValue::String("x".to_string()));
    }

    #[test]
    fn test_write_request_builders() {
        let request = WriteRequest::delete("pets", "id", DatabaseValue::Int64(3));
        assert_eq!(request.kind, WriteKind::Delete);
        assert_eq!(request.identifier, Some(DatabaseValue::Int64(3)));
        assert!(request.rows.is_empty());

        let request = WriteRequest::create("pets", "id", vec![Row::new()])
            .with_columns(vec![ColumnSpec::new("name", CodecKind::Text)])
            .returning_identifier(true);
        assert!(request.returns_identifier);
        assert_eq!(request.column_kind("name"), Some(&CodecKind::Text));
        assert_eq!(request.column_kind("age"), None);
    }
}
