//! Value codec: moves column values between their semantic form ([`Value`]) and the flat
//! text/integer form SQLite stores.
//!
//! Decoding always dispatches on the declared [`ColumnKind`] of the column, never on the shape
//! of the stored text, so a text column holding `"2024-01-01"` or `"[]"` stays text.

use crate::error::CodecError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use utoipa::ToSchema;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ColumnKind {
    Timestamp,
    Text,
    Integer,
    Sequence,
    Mapping,
}

/// Column affinity as declared in the table DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Text,
    Integer,
}

impl ColumnKind {
    pub fn storage(self) -> StorageKind {
        match self {
            ColumnKind::Integer => StorageKind::Integer,
            ColumnKind::Timestamp | ColumnKind::Text | ColumnKind::Sequence | ColumnKind::Mapping => StorageKind::Text,
        }
    }

    /// Value written for a non-nullable column that an insert leaves out. Timestamps take `now`.
    pub fn insert_default(self, now: NaiveDateTime) -> Value {
        match self {
            ColumnKind::Timestamp => Value::Timestamp(now),
            ColumnKind::Text => Value::Text(String::new()),
            ColumnKind::Integer => Value::Integer(0),
            ColumnKind::Sequence => Value::Sequence(Vec::new()),
            ColumnKind::Mapping => Value::Mapping(Map::new()),
        }
    }
}

impl StorageKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            StorageKind::Text => "TEXT",
            StorageKind::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Timestamp(NaiveDateTime),
    Sequence(Vec<String>),
    Mapping(Map<String, Json>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Timestamp(_) => "timestamp",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Semantic value -> storable value.
    pub fn encode(&self) -> Result<SqlValue, CodecError> {
        Ok(match self {
            Value::Null => SqlValue::Null,
            Value::Text(s) => SqlValue::Text(s.clone()),
            Value::Integer(i) => SqlValue::Integer(*i),
            Value::Timestamp(ts) => SqlValue::Text(format_timestamp(ts)),
            Value::Sequence(items) => SqlValue::Text(to_json_text(ColumnKind::Sequence, items)?),
            Value::Mapping(map) => SqlValue::Text(to_json_text(ColumnKind::Mapping, map)?),
        })
    }

    /// Storable value -> semantic value, driven by the column's declared kind.
    pub fn decode(kind: ColumnKind, stored: ValueRef<'_>) -> Result<Value, CodecError> {
        match stored {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(i) => match kind {
                ColumnKind::Integer => Ok(Value::Integer(i)),
                ColumnKind::Text => Ok(Value::Text(i.to_string())),
                _ => Err(CodecError::KindMismatch { expected: kind, found: "integer" }),
            },
            ValueRef::Real(f) => match kind {
                ColumnKind::Integer if f.fract() == 0.0 => Ok(Value::Integer(f as i64)),
                ColumnKind::Text => Ok(Value::Text(f.to_string())),
                _ => Err(CodecError::KindMismatch { expected: kind, found: "real" }),
            },
            ValueRef::Blob(_) => Err(CodecError::KindMismatch { expected: kind, found: "blob" }),
            ValueRef::Text(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::KindMismatch { expected: kind, found: "non-utf8 text" })?;
                Value::Text(text.to_string()).coerce(kind)
            }
        }
    }

    /// Converts a caller-supplied value into the representation of `kind`.
    /// Null passes through; nullability is the schema's concern.
    pub fn coerce(self, kind: ColumnKind) -> Result<Value, CodecError> {
        match (kind, self) {
            (_, Value::Null) => Ok(Value::Null),
            (ColumnKind::Text, Value::Text(s)) => Ok(Value::Text(s)),
            (ColumnKind::Text, Value::Integer(i)) => Ok(Value::Text(i.to_string())),
            (ColumnKind::Text, Value::Timestamp(ts)) => Ok(Value::Text(format_timestamp(&ts))),
            (ColumnKind::Integer, Value::Integer(i)) => Ok(Value::Integer(i)),
            (ColumnKind::Integer, Value::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| CodecError::InvalidInteger(s)),
            (ColumnKind::Timestamp, Value::Timestamp(ts)) => Ok(Value::Timestamp(ts)),
            (ColumnKind::Timestamp, Value::Text(s)) => parse_timestamp(&s).map(Value::Timestamp),
            (ColumnKind::Sequence, Value::Sequence(items)) => Ok(Value::Sequence(items)),
            (ColumnKind::Sequence, Value::Text(s)) => serde_json::from_str::<Vec<String>>(&s)
                .map(Value::Sequence)
                .map_err(|e| CodecError::InvalidJson { kind, reason: e.to_string() }),
            (ColumnKind::Mapping, Value::Mapping(map)) => Ok(Value::Mapping(map)),
            (ColumnKind::Mapping, Value::Text(s)) => serde_json::from_str::<Map<String, Json>>(&s)
                .map(Value::Mapping)
                .map_err(|e| CodecError::InvalidJson { kind, reason: e.to_string() }),
            (expected, other) => Err(CodecError::KindMismatch { expected, found: other.type_name() }),
        }
    }

    pub fn from_json(json: Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Integer(b as i64),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Text(n.to_string()),
            },
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(|item| match item {
                        Json::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Json::Object(map) => Value::Mapping(map),
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Text(s) => Json::String(s.clone()),
            Value::Integer(i) => Json::from(*i),
            Value::Timestamp(ts) => Json::String(format_timestamp(ts)),
            Value::Sequence(items) => Json::Array(items.iter().cloned().map(Json::String).collect()),
            Value::Mapping(map) => Json::Object(map.clone()),
        }
    }

    /// Native ordering between two values of the same kind; `None` when they are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Sequence(a), Value::Sequence(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let stored = self.encode().map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::Owned(stored))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::Sequence(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS[.f]`, the same with a space separator,
/// and RFC 3339 with an offset (normalized to UTC).
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, CodecError> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|dt| dt.naive_utc()))
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|_| CodecError::InvalidTimestamp(text.to_string()))
}

fn to_json_text<T: Serialize + ?Sized>(kind: ColumnKind, value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|e| CodecError::InvalidJson { kind, reason: e.to_string() })
}

fn mismatch(expected: ColumnKind, found: &Value) -> CodecError {
    CodecError::KindMismatch { expected, found: found.type_name() }
}

/// A Rust type that can live in a record column.
pub trait ColumnValue: Sized {
    const KIND: ColumnKind;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;

    /// `value` is already decoded for `Self::KIND`. Null on a non-nullable type yields the kind's default.
    fn from_value(value: Value) -> Result<Self, CodecError>;
}

macro_rules! impl_integer_column {
    ($($t:ty),*) => {
        $(
            impl ColumnValue for $t {
                const KIND: ColumnKind = ColumnKind::Integer;

                fn to_value(&self) -> Value {
                    Value::Integer(*self as i64)
                }

                fn from_value(value: Value) -> Result<Self, CodecError> {
                    match value {
                        Value::Integer(i) => <$t>::try_from(i).map_err(|_| CodecError::InvalidInteger(i.to_string())),
                        Value::Null => Ok(0),
                        other => Err(mismatch(Self::KIND, &other)),
                    }
                }
            }
        )*
    };
}

impl_integer_column!(i64, i32, i16, i8, u32);

impl ColumnValue for bool {
    const KIND: ColumnKind = ColumnKind::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(*self as i64)
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Integer(i) => Ok(i != 0),
            Value::Null => Ok(false),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl ColumnValue for String {
    const KIND: ColumnKind = ColumnKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Null => Ok(String::new()),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl ColumnValue for NaiveDateTime {
    const KIND: ColumnKind = ColumnKind::Timestamp;

    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::Null => Ok(NaiveDateTime::default()),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl ColumnValue for Vec<String> {
    const KIND: ColumnKind = ColumnKind::Sequence;

    fn to_value(&self) -> Value {
        Value::Sequence(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Sequence(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl<V: Serialize + DeserializeOwned> ColumnValue for BTreeMap<String, V> {
    const KIND: ColumnKind = ColumnKind::Mapping;

    fn to_value(&self) -> Value {
        let map = self
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Json::Null)))
            .collect();
        Value::Mapping(map)
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Mapping(map) => map
                .into_iter()
                .map(|(k, v)| {
                    serde_json::from_value::<V>(v)
                        .map(|v| (k, v))
                        .map_err(|e| CodecError::InvalidJson { kind: Self::KIND, reason: e.to_string() })
                })
                .collect(),
            Value::Null => Ok(BTreeMap::new()),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    const KIND: ColumnKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn roundtrip(kind: ColumnKind, value: Value) -> Value {
        let stored = value.encode().unwrap();
        let value_ref = ValueRef::from(&stored);
        Value::decode(kind, value_ref).unwrap()
    }

    fn ts(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, mi, s).unwrap()
    }

    #[test]
    fn timestamp_roundtrips_at_second_precision() {
        let value = Value::Timestamp(ts(2024, 5, 17, 9, 30, 12));
        assert_eq!(value.encode().unwrap(), SqlValue::Text("2024-05-17T09:30:12".into()));
        assert_eq!(roundtrip(ColumnKind::Timestamp, value.clone()), value);
    }

    #[test]
    fn timestamp_keeps_fractional_seconds() {
        let value = Value::Timestamp(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_micro_opt(0, 0, 1, 250_000).unwrap());
        assert_eq!(value.encode().unwrap(), SqlValue::Text("2024-01-01T00:00:01.250".into()));
        assert_eq!(roundtrip(ColumnKind::Timestamp, value.clone()), value);
    }

    #[test]
    fn empty_collections_roundtrip_as_json_literals() {
        assert_eq!(Value::Sequence(vec![]).encode().unwrap(), SqlValue::Text("[]".into()));
        assert_eq!(Value::Mapping(Map::new()).encode().unwrap(), SqlValue::Text("{}".into()));
        assert_eq!(roundtrip(ColumnKind::Sequence, Value::Sequence(vec![])), Value::Sequence(vec![]));
        assert_eq!(roundtrip(ColumnKind::Mapping, Value::Mapping(Map::new())), Value::Mapping(Map::new()));
    }

    #[test]
    fn non_ascii_is_stored_literally() {
        let keywords = Value::Sequence(vec!["東京湾".into(), "環境一斉調査".into()]);
        assert_eq!(keywords.encode().unwrap(), SqlValue::Text(r#"["東京湾","環境一斉調査"]"#.into()));
        assert_eq!(roundtrip(ColumnKind::Sequence, keywords.clone()), keywords);

        let text = Value::Text("環境省".into());
        assert_eq!(roundtrip(ColumnKind::Text, text.clone()), text);
    }

    #[test]
    fn text_columns_never_reinterpret_their_content() {
        let looks_like_date = Value::Text("2024-01-01".into());
        let looks_like_json = Value::Text("[\"a\"]".into());
        assert_eq!(roundtrip(ColumnKind::Text, looks_like_date.clone()), looks_like_date);
        assert_eq!(roundtrip(ColumnKind::Text, looks_like_json.clone()), looks_like_json);
    }

    #[test]
    fn null_decodes_to_null_for_every_kind() {
        for kind in [ColumnKind::Timestamp, ColumnKind::Text, ColumnKind::Integer, ColumnKind::Sequence, ColumnKind::Mapping] {
            assert_eq!(Value::decode(kind, ValueRef::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn parses_supported_timestamp_shapes() {
        let midnight = ts(2024, 1, 1, 0, 0, 0);
        assert_eq!(parse_timestamp("2024-01-01").unwrap(), midnight);
        assert_eq!(parse_timestamp("2024-01-01T00:00:00").unwrap(), midnight);
        assert_eq!(parse_timestamp("2024-01-01 00:00:00").unwrap(), midnight);
        assert_eq!(parse_timestamp("2024-01-01T09:00:00+09:00").unwrap(), midnight);
        assert_eq!(parse_timestamp("yesterday"), Err(CodecError::InvalidTimestamp("yesterday".into())));
    }

    #[test]
    fn coerce_follows_column_kind() {
        assert_eq!(Value::from("42").coerce(ColumnKind::Integer).unwrap(), Value::Integer(42));
        assert_eq!(Value::Integer(7).coerce(ColumnKind::Text).unwrap(), Value::Text("7".into()));
        assert_eq!(
            Value::from(r#"["環境","水質汚染"]"#).coerce(ColumnKind::Sequence).unwrap(),
            Value::Sequence(vec!["環境".into(), "水質汚染".into()])
        );
        assert!(matches!(Value::from("x").coerce(ColumnKind::Integer), Err(CodecError::InvalidInteger(_))));
        assert!(matches!(Value::Integer(1).coerce(ColumnKind::Sequence), Err(CodecError::KindMismatch { .. })));
        assert!(matches!(Value::from("not json").coerce(ColumnKind::Mapping), Err(CodecError::InvalidJson { .. })));
    }

    #[test]
    fn column_values_map_to_kinds() {
        let prefs: BTreeMap<String, i64> = [("補助金".to_string(), -2), ("製造業".to_string(), 1)].into_iter().collect();
        let decoded = BTreeMap::<String, i64>::from_value(prefs.to_value()).unwrap();
        assert_eq!(decoded, prefs);

        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert_eq!(String::from_value(Value::Null).unwrap(), "");
        assert_eq!(Vec::<String>::from_value(Value::Null).unwrap(), Vec::<String>::new());
        assert!(i8::from_value(Value::Integer(300)).is_err());
        assert!(<Option<i64> as ColumnValue>::NULLABLE);
        assert_eq!(<Option<i64> as ColumnValue>::KIND, ColumnKind::Integer);
    }

    #[test]
    fn json_conversion_keeps_shapes() {
        let json = serde_json::json!({"a": ["x", 1], "b": null, "c": 3, "d": "s"});
        let Value::Mapping(map) = Value::from_json(json) else { panic!("expected mapping") };
        assert_eq!(Value::from_json(map["a"].clone()), Value::Sequence(vec!["x".into(), "1".into()]));
        assert_eq!(Value::from_json(map["b"].clone()), Value::Null);
        assert_eq!(Value::from_json(map["c"].clone()), Value::Integer(3));
        assert_eq!(Value::Timestamp(ts(2024, 1, 1, 0, 0, 0)).to_json(), serde_json::json!("2024-01-01T00:00:00"));
    }

    #[test]
    fn compare_uses_native_ordering() {
        assert_eq!(Value::Integer(9).compare(&Value::Integer(10)), Some(Ordering::Less));
        assert_eq!(Value::Timestamp(ts(2024, 1, 1, 0, 0, 0)).compare(&Value::Timestamp(ts(2023, 12, 31, 0, 0, 0))), Some(Ordering::Greater));
        assert_eq!(Value::Integer(1).compare(&Value::Text("1".into())), None);
    }
}
