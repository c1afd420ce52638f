//! Field Metadata - codecs, timestamp encodings and per-field descriptors
//!
//! A [`FieldDescriptor`] knows the storage key of one property and how to read
//! it out of, and write it back into, a model instance. Descriptors are built
//! once per model type and shared read-only afterwards.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::backends::DatabaseValue;
use crate::error::{ModelError, ModelResult};

/// Storage codec of a field, as seen by backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    Bool,
    Int,
    Float,
    Text,
    Uuid,
    DateTime,
    /// Native enum type with the given type name
    Enum(&'static str),
    Json,
    Bytes,
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecKind::Bool => write!(f, "bool"),
            CodecKind::Int => write!(f, "int"),
            CodecKind::Float => write!(f, "float"),
            CodecKind::Text => write!(f, "text"),
            CodecKind::Uuid => write!(f, "uuid"),
            CodecKind::DateTime => write!(f, "datetime"),
            CodecKind::Enum(name) => write!(f, "enum {}", name),
            CodecKind::Json => write!(f, "json"),
            CodecKind::Bytes => write!(f, "bytes"),
        }
    }
}

/// Lifecycle moment at which the engine overwrites a timestamp field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampTrigger {
    None,
    Create,
    Update,
    Delete,
}

/// Storage encoding of a timestamp field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampFormat {
    /// Backend datetime type
    Native,
    /// RFC 3339 text with microsecond precision
    Iso8601,
    /// Fractional seconds since the Unix epoch
    UnixSeconds,
}

impl TimestampFormat {
    pub fn codec_kind(&self) -> CodecKind {
        match self {
            TimestampFormat::Native => CodecKind::DateTime,
            TimestampFormat::Iso8601 => CodecKind::Text,
            TimestampFormat::UnixSeconds => CodecKind::Float,
        }
    }

    /// Truncate to the precision every encoding can carry
    ///
    /// Applied to times the engine stamps itself; caller-set values are
    /// stored as given.
    pub fn normalize(time: DateTime<Utc>) -> DateTime<Utc> {
        time.trunc_subsecs(6)
    }

    /// Storage encoding of `time`
    ///
    /// `UnixSeconds` carries microseconds; the other formats keep the full
    /// precision of `time`.
    pub fn encode(&self, time: DateTime<Utc>) -> DatabaseValue {
        match self {
            TimestampFormat::Native => DatabaseValue::DateTime(time),
            TimestampFormat::Iso8601 => {
                DatabaseValue::String(time.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            TimestampFormat::UnixSeconds => {
                DatabaseValue::Float64(time.timestamp_micros() as f64 / 1_000_000.0)
            }
        }
    }

    /// Decode a stored timestamp; every format also accepts the other encodings
    pub fn decode(&self, value: &DatabaseValue) -> ModelResult<DateTime<Utc>> {
        match value {
            DatabaseValue::DateTime(dt) => Ok(*dt),
            DatabaseValue::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| ModelError::Serialization(format!("invalid timestamp '{}': {}", s, e))),
            DatabaseValue::Float64(seconds) => from_micros((seconds * 1_000_000.0).round() as i64),
            DatabaseValue::Int64(seconds) => from_micros(seconds.saturating_mul(1_000_000)),
            other => Err(mismatch("timestamp", other)),
        }
    }
}

fn from_micros(micros: i64) -> ModelResult<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| ModelError::Serialization(format!("timestamp out of range: {}us", micros)))
}

pub(crate) fn mismatch(expected: &str, found: &DatabaseValue) -> ModelError {
    ModelError::Serialization(format!("expected {}, found {}", expected, found))
}

/// Codec of a single field value type
pub trait FieldValue: Clone + Send + Sync + 'static {
    fn codec_kind() -> CodecKind;

    fn is_nullable() -> bool {
        false
    }

    fn encode_value(&self) -> DatabaseValue;

    fn decode_value(value: DatabaseValue) -> ModelResult<Self>;
}

impl FieldValue for String {
    fn codec_kind() -> CodecKind {
        CodecKind::Text
    }

    fn encode_value(&self) -> DatabaseValue {
        DatabaseValue::String(self.clone())
    }

    fn decode_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::String(s) => Ok(s),
            DatabaseValue::Enum { case, .. } => Ok(case),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl FieldValue for bool {
    fn codec_kind() -> CodecKind {
        CodecKind::Bool
    }

    fn encode_value(&self) -> DatabaseValue {
        DatabaseValue::Bool(*self)
    }

    fn decode_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Bool(b) => Ok(b),
            DatabaseValue::Int64(i) => Ok(i != 0),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl FieldValue for i64 {
    fn codec_kind() -> CodecKind {
        CodecKind::Int
    }

    fn encode_value(&self) -> DatabaseValue {
        DatabaseValue::Int64(*self)
    }

    fn decode_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Int64(i) => Ok(i),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl FieldValue for i32 {
    fn codec_kind() -> CodecKind {
        CodecKind::Int
    }

    fn encode_value(&self) -> DatabaseValue {
        DatabaseValue::Int64(*self as i64)
    }

    fn decode_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Int64(i) => i32::try_from(i)
                .map_err(|_| ModelError::Serialization(format!("{} does not fit in i32", i))),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl FieldValue for f64 {
    fn codec_kind() -> CodecKind {
        CodecKind::Float
    }

    fn encode_value(&self) -> DatabaseValue {
        DatabaseValue::Float64(*self)
    }

    fn decode_value(value: DatabaseValue) -> ModelResult<Self> {
        value.as_f64().ok_or_else(|| mismatch("float", &value))
    }
}

impl FieldValue for Uuid {
    fn codec_kind() -> CodecKind {
        CodecKind::Uuid
    }

    fn encode_value(&self) -> DatabaseValue {
        DatabaseValue::Uuid(*self)
    }

    fn decode_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Uuid(u) => Ok(u),
            DatabaseValue::String(s) => Uuid::parse_str(&s)
                .map_err(|e| ModelError::Serialization(format!("invalid uuid '{}': {}", s, e))),
            other => Err(mismatch("uuid", &other)),
        }
    }
}

impl FieldValue for DateTime<Utc> {
    fn codec_kind() -> CodecKind {
        CodecKind::DateTime
    }

    fn encode_value(&self) -> DatabaseValue {
        DatabaseValue::DateTime(*self)
    }

    fn decode_value(value: DatabaseValue) -> ModelResult<Self> {
        TimestampFormat::Native.decode(&value)
    }
}

impl FieldValue for JsonValue {
    fn codec_kind() -> CodecKind {
        CodecKind::Json
    }

    fn encode_value(&self) -> DatabaseValue {
        DatabaseValue::Json(self.clone())
    }

    fn decode_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Json(j) => Ok(j),
            DatabaseValue::String(s) => Ok(serde_json::from_str(&s)?),
            other => Ok(other.to_json()),
        }
    }
}

impl FieldValue for Vec<u8> {
    fn codec_kind() -> CodecKind {
        CodecKind::Bytes
    }

    fn encode_value(&self) -> DatabaseValue {
        DatabaseValue::Bytes(self.clone())
    }

    fn decode_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Bytes(b) => Ok(b),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn codec_kind() -> CodecKind {
        T::codec_kind()
    }

    fn is_nullable() -> bool {
        true
    }

    fn encode_value(&self) -> DatabaseValue {
        match self {
            Some(value) => value.encode_value(),
            None => DatabaseValue::Null,
        }
    }

    fn decode_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Null => Ok(None),
            other => T::decode_value(other).map(Some),
        }
    }
}

/// Enumeration stored as a native enum type, or as its case name where the
/// backend has no enum types
pub trait StringEnum: Sized + Clone + Send + Sync + 'static {
    /// Name of the enum type in the database
    const ENUM_NAME: &'static str;

    fn as_case(&self) -> &'static str;

    fn from_case(case: &str) -> Option<Self>;
}

impl<E: StringEnum> FieldValue for E {
    fn codec_kind() -> CodecKind {
        CodecKind::Enum(E::ENUM_NAME)
    }

    fn encode_value(&self) -> DatabaseValue {
        DatabaseValue::Enum {
            name: E::ENUM_NAME.to_string(),
            case: self.as_case().to_string(),
        }
    }

    fn decode_value(value: DatabaseValue) -> ModelResult<Self> {
        let case = match &value {
            DatabaseValue::Enum { case, .. } => case.as_str(),
            DatabaseValue::String(s) => s.as_str(),
            other => return Err(mismatch(E::ENUM_NAME, other)),
        };
        E::from_case(case).ok_or_else(|| {
            ModelError::Serialization(format!("'{}' is not a case of {}", case, E::ENUM_NAME))
        })
    }
}

/// Type-erased metadata of one flattened field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Flat storage key
    pub key: String,
    /// Dotted path through nested groups, equal to `key` for top-level fields
    pub path: String,
    pub kind: CodecKind,
    pub nullable: bool,
    pub trigger: TimestampTrigger,
    /// Set for timestamp fields
    pub format: Option<TimestampFormat>,
}

impl FieldInfo {
    pub fn is_timestamp(&self) -> bool {
        self.format.is_some()
    }

    /// Storage encoding of `time` for this field
    pub fn encode_time(&self, time: DateTime<Utc>) -> DatabaseValue {
        match self.format {
            Some(format) => format.encode(time),
            None => DatabaseValue::DateTime(time),
        }
    }

    /// Transcode a caller-supplied value into this field's storage encoding
    pub fn normalize(&self, value: DatabaseValue) -> DatabaseValue {
        match value {
            DatabaseValue::Array(items) => {
                DatabaseValue::Array(items.into_iter().map(|v| self.normalize(v)).collect())
            }
            DatabaseValue::DateTime(dt) => match self.format {
                Some(format) => format.encode(dt),
                None => DatabaseValue::DateTime(dt),
            },
            DatabaseValue::String(case) => match self.kind {
                CodecKind::Enum(name) => DatabaseValue::Enum {
                    name: name.to_string(),
                    case,
                },
                _ => DatabaseValue::String(case),
            },
            other => other,
        }
    }
}

type Reader<T> = Arc<dyn Fn(&T) -> DatabaseValue + Send + Sync>;
type Writer<T> = Arc<dyn Fn(&mut T, DatabaseValue) -> ModelResult<()> + Send + Sync>;
type Stamper<T> = Arc<dyn Fn(&mut T, Option<DateTime<Utc>>) + Send + Sync>;
type StampReader<T> = Arc<dyn Fn(&T) -> Option<DateTime<Utc>> + Send + Sync>;

#[derive(Clone)]
struct Stamp<T> {
    set: Stamper<T>,
    get: StampReader<T>,
}

/// Metadata and accessors of one storable property of `T`
pub struct FieldDescriptor<T> {
    info: FieldInfo,
    read: Reader<T>,
    write: Writer<T>,
    stamp: Option<Stamp<T>>,
}

impl<T> Clone for FieldDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            read: Arc::clone(&self.read),
            write: Arc::clone(&self.write),
            stamp: self.stamp.as_ref().map(|s| Stamp {
                set: Arc::clone(&s.set),
                get: Arc::clone(&s.get),
            }),
        }
    }
}

impl<T> fmt::Debug for FieldDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("info", &self.info)
            .finish()
    }
}

impl<T: 'static> FieldDescriptor<T> {
    /// Plain value field
    pub fn value<V: FieldValue>(key: &str, get: fn(&T) -> &V, get_mut: fn(&mut T) -> &mut V) -> Self {
        let error_key = key.to_string();
        Self {
            info: FieldInfo {
                key: key.to_string(),
                path: key.to_string(),
                kind: V::codec_kind(),
                nullable: V::is_nullable(),
                trigger: TimestampTrigger::None,
                format: None,
            },
            read: Arc::new(move |model: &T| get(model).encode_value()),
            write: Arc::new(move |model: &mut T, value: DatabaseValue| {
                *get_mut(model) = V::decode_value(value).map_err(|e| invalid(&error_key, e))?;
                Ok(())
            }),
            stamp: None,
        }
    }

    /// Optional timestamp field stored in `format`, stamped at `trigger`
    pub fn timestamp(
        key: &str,
        trigger: TimestampTrigger,
        format: TimestampFormat,
        get: fn(&T) -> &Option<DateTime<Utc>>,
        get_mut: fn(&mut T) -> &mut Option<DateTime<Utc>>,
    ) -> Self {
        let error_key = key.to_string();
        Self {
            info: FieldInfo {
                key: key.to_string(),
                path: key.to_string(),
                kind: format.codec_kind(),
                nullable: true,
                trigger,
                format: Some(format),
            },
            read: Arc::new(move |model: &T| match get(model) {
                Some(time) => format.encode(*time),
                None => DatabaseValue::Null,
            }),
            write: Arc::new(move |model: &mut T, value: DatabaseValue| {
                *get_mut(model) = match value {
                    DatabaseValue::Null => None,
                    other => Some(format.decode(&other).map_err(|e| invalid(&error_key, e))?),
                };
                Ok(())
            }),
            stamp: Some(Stamp {
                set: Arc::new(move |model: &mut T, time: Option<DateTime<Utc>>| {
                    *get_mut(model) = time.map(TimestampFormat::normalize);
                }),
                get: Arc::new(move |model: &T| *get(model)),
            }),
        }
    }

    pub fn info(&self) -> &FieldInfo {
        &self.info
    }

    pub fn key(&self) -> &str {
        &self.info.key
    }

    pub fn path(&self) -> &str {
        &self.info.path
    }

    pub fn read(&self, model: &T) -> DatabaseValue {
        (self.read)(model)
    }

    /// Decode `value` into the field; nulls on non-nullable fields are rejected
    pub fn write(&self, model: &mut T, value: DatabaseValue) -> ModelResult<()> {
        if value.is_null() && !self.info.nullable {
            return Err(ModelError::InvalidFieldValue {
                key: self.info.key.clone(),
                message: "null is not allowed".to_string(),
            });
        }
        (self.write)(model, value)
    }

    /// Overwrite a timestamp field; no-op on value fields
    pub fn stamp(&self, model: &mut T, time: Option<DateTime<Utc>>) {
        if let Some(stamp) = &self.stamp {
            (stamp.set)(model, time);
        }
    }

    /// Current value of a timestamp field
    pub fn stamped(&self, model: &T) -> Option<DateTime<Utc>> {
        self.stamp.as_ref().and_then(|s| (s.get)(model))
    }

    /// Re-root this descriptor under a group stored at `group_key` of `P`
    pub fn nest<P: 'static>(
        self,
        group_key: &str,
        get: fn(&P) -> &T,
        get_mut: fn(&mut P) -> &mut T,
    ) -> FieldDescriptor<P> {
        let read = self.read;
        let write = self.write;
        FieldDescriptor {
            info: FieldInfo {
                key: format!("{}_{}", group_key, self.info.key),
                path: format!("{}.{}", group_key, self.info.path),
                ..self.info
            },
            read: Arc::new(move |parent: &P| read(get(parent))),
            write: Arc::new(move |parent: &mut P, value: DatabaseValue| write(get_mut(parent), value)),
            stamp: self.stamp.map(|stamp| {
                let set = stamp.set;
                let stamped = stamp.get;
                Stamp {
                    set: Arc::new(move |parent: &mut P, time: Option<DateTime<Utc>>| set(get_mut(parent), time)) as Stamper<P>,
                    get: Arc::new(move |parent: &P| stamped(get(parent))) as StampReader<P>,
                }
            }),
        }
    }
}

fn invalid(key: &str, error: ModelError) -> ModelError {
    let message = match error {
        ModelError::Serialization(message) => message,
        other => other.to_string(),
    };
    ModelError::InvalidFieldValue {
        key: key.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq)]
    enum Mood {
        Calm,
        Grumpy,
    }

    impl StringEnum for Mood {
        const ENUM_NAME: &'static str = "mood";

        fn as_case(&self) -> &'static str {
            match self {
                Mood::Calm => "calm",
                Mood::Grumpy => "grumpy",
            }
        }

        fn from_case(case: &str) -> Option<Self> {
            match case {
                "calm" => Some(Mood::Calm),
                "grumpy" => Some(Mood::Grumpy),
                _ => None,
            }
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Note {
        title: String,
        stars: Option<i32>,
        seen_at: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_timestamp_formats_round_trip() {
        let time = Utc.with_ymd_and_hms(2024, 2, 29, 13, 45, 7).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);

        for format in [TimestampFormat::Native, TimestampFormat::Iso8601] {
            let encoded = format.encode(time);
            assert_eq!(format.decode(&encoded).unwrap(), time, "{:?}", format);
        }

        let encoded = TimestampFormat::UnixSeconds.encode(time);
        assert_eq!(
            TimestampFormat::UnixSeconds.decode(&encoded).unwrap(),
            TimestampFormat::normalize(time)
        );

        assert_eq!(
            TimestampFormat::Iso8601.encode(TimestampFormat::normalize(time)),
            DatabaseValue::String("2024-02-29T13:45:07.123456Z".to_string())
        );
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Sighting {
        at: DateTime<Utc>,
        seen: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_nanosecond_times_survive_the_field_codec() {
        let time = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let at = FieldDescriptor::<Sighting>::value("at", |s| &s.at, |s| &mut s.at);
        let seen = FieldDescriptor::<Sighting>::timestamp(
            "seen",
            TimestampTrigger::None,
            TimestampFormat::Native,
            |s| &s.seen,
            |s| &mut s.seen,
        );

        let sighting = Sighting {
            at: time,
            seen: Some(time),
        };
        let mut copy = Sighting::default();
        at.write(&mut copy, at.read(&sighting)).unwrap();
        seen.write(&mut copy, seen.read(&sighting)).unwrap();
        assert_eq!(copy, sighting);
        assert_eq!(<DateTime<Utc>>::decode_value(time.encode_value()).unwrap(), time);
    }

    #[test]
    fn test_unix_seconds_before_epoch() {
        let time = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap()
            + chrono::Duration::microseconds(250_000);
        let encoded = TimestampFormat::UnixSeconds.encode(time);
        assert_eq!(encoded, DatabaseValue::Float64(-0.75));
        assert_eq!(TimestampFormat::UnixSeconds.decode(&encoded).unwrap(), time);
    }

    #[test]
    fn test_enum_codec() {
        let encoded = Mood::Grumpy.encode_value();
        assert_eq!(
            encoded,
            DatabaseValue::Enum {
                name: "mood".to_string(),
                case: "grumpy".to_string()
            }
        );
        assert_eq!(Mood::decode_value(encoded).unwrap(), Mood::Grumpy);
        assert_eq!(
            Mood::decode_value(DatabaseValue::String("calm".to_string())).unwrap(),
            Mood::Calm
        );
        assert!(Mood::decode_value(DatabaseValue::String("sleepy".to_string())).is_err());
        assert_eq!(<Option<Mood>>::codec_kind(), CodecKind::Enum("mood"));
    }

    #[test]
    fn test_descriptor_reads_and_writes() {
        let title = FieldDescriptor::<Note>::value("title", |n| &n.title, |n| &mut n.title);
        let stars = FieldDescriptor::<Note>::value("stars", |n| &n.stars, |n| &mut n.stars);

        let mut note = Note::default();
        title.write(&mut note, DatabaseValue::from("Groceries")).unwrap();
        stars.write(&mut note, DatabaseValue::Null).unwrap();
        assert_eq!(note.title, "Groceries");
        assert_eq!(stars.read(&note), DatabaseValue::Null);

        let err = title.write(&mut note, DatabaseValue::Null).unwrap_err();
        assert!(matches!(err, ModelError::InvalidFieldValue { ref key, .. } if key == "title"));

        let err = stars.write(&mut note, DatabaseValue::from("five")).unwrap_err();
        assert!(matches!(err, ModelError::InvalidFieldValue { ref key, .. } if key == "stars"));
    }

    #[test]
    fn test_timestamp_descriptor_stamps_normalized_time() {
        let seen = FieldDescriptor::<Note>::timestamp(
            "seen_at",
            TimestampTrigger::Update,
            TimestampFormat::Iso8601,
            |n| &n.seen_at,
            |n| &mut n.seen_at,
        );
        assert_eq!(seen.info().kind, CodecKind::Text);

        let mut note = Note::default();
        let now = Utc::now();
        seen.stamp(&mut note, Some(now));
        assert_eq!(seen.stamped(&note), Some(TimestampFormat::normalize(now)));

        let encoded = seen.read(&note);
        let mut copy = Note::default();
        seen.write(&mut copy, encoded).unwrap();
        assert_eq!(copy.seen_at, note.seen_at);
    }

    #[test]
    fn test_normalize_transcodes_filter_values() {
        let info = FieldInfo {
            key: "deleted_at".to_string(),
            path: "deleted_at".to_string(),
            kind: CodecKind::Float,
            nullable: true,
            trigger: TimestampTrigger::Delete,
            format: Some(TimestampFormat::UnixSeconds),
        };
        let time = Utc.timestamp_opt(10, 500_000_000).unwrap();
        assert_eq!(info.normalize(DatabaseValue::DateTime(time)), DatabaseValue::Float64(10.5));

        let info = FieldInfo {
            key: "mood".to_string(),
            path: "mood".to_string(),
            kind: CodecKind::Enum("mood"),
            nullable: false,
            trigger: TimestampTrigger::None,
            format: None,
        };
        assert_eq!(
            info.normalize(DatabaseValue::Array(vec!["calm".into()])),
            DatabaseValue::Array(vec![Mood::Calm.encode_value()])
        );
    }
}
