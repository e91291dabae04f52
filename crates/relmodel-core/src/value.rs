//! Dynamic SQL values.
//!
//! `Value` is the currency between typed entities, the query builder and the
//! driver. Every variant has a *zero* notion, which drives struct conditions,
//! primary-key presence checks and `updates_from`.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Text format timestamps are stored in.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A dynamically-typed SQL value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    BigInt(i64),
    /// 64-bit float.
    Double(f64),
    /// Text.
    Text(String),
    /// Binary blob.
    Bytes(Vec<u8>),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// Parameter list, only valid as a bound parameter. Expands to `(?, ?, ...)`.
    List(Vec<Value>),
}

impl Value {
    /// Build a `List` parameter from anything convertible into values.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Whether this is SQL NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this is the zero value of its type.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::BigInt(i) => *i == 0,
            Value::Double(f) => *f == 0.0,
            Value::Text(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Timestamp(ts) => ts.timestamp() == 0 && ts.timestamp_subsec_nanos() == 0,
            Value::List(items) => items.is_empty(),
        }
    }

    /// Short name of the variant, used in mapping errors.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::BigInt(_) => "BIGINT",
            Value::Double(_) => "DOUBLE",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::List(_) => "LIST",
        }
    }

    /// Integer view, accepting booleans.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::BigInt(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Float view, accepting integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(*f),
            Value::BigInt(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Text view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view, accepting 0/1 integers.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::BigInt(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Timestamp view, parsing stored text when needed.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    /// Number of placeholders this value occupies once bound.
    pub fn placeholder_count(&self) -> usize {
        match self {
            Value::List(items) => items.len().max(1),
            _ => 1,
        }
    }

    /// Hashable key wrapper.
    pub fn key(&self) -> ValueKey {
        ValueKey(self.clone())
    }
}

/// Parse the timestamp text forms produced by this crate or by SQLite itself.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// A `Value` usable as a hash map key.
///
/// Floats compare by bit pattern. Used to zipper preloaded rows onto their
/// parents and to deduplicate parent keys.
#[derive(Debug, Clone)]
pub struct ValueKey(pub Value);

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        key_eq(&self.0, &other.0)
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

fn key_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Double(x), Value::Double(y)) => x.to_bits() == y.to_bits(),
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| key_eq(l, r))
        }
        _ => a == b,
    }
}

fn hash_value(v: &Value, hasher: &mut impl Hasher) {
    match v {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::BigInt(i) => {
            2u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Double(f) => {
            3u8.hash(hasher);
            f.to_bits().hash(hasher);
        }
        Value::Text(s) => {
            4u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Bytes(b) => {
            5u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Timestamp(ts) => {
            6u8.hash(hasher);
            ts.hash(hasher);
        }
        Value::List(items) => {
            7u8.hash(hasher);
            items.len().hash(hasher);
            for item in items {
                hash_value(item, hasher);
            }
        }
    }
}

// ============================================================================
// Conversions into Value
// ============================================================================

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::BigInt(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::BigInt(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::BigInt(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Double(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Borrowing conversion into a `Value`; implemented for every cloneable
/// `Into<Value>` type so generated entity code can read fields by reference.
pub trait ToValue {
    /// Convert to a `Value`.
    fn to_value(&self) -> Value;
}

impl<T: Clone + Into<Value>> ToValue for T {
    fn to_value(&self) -> Value {
        self.clone().into()
    }
}

// ============================================================================
// Conversions out of Value
// ============================================================================

/// Fallible conversion from a `Value`.
///
/// NULL converts only into `Option<T>` and `Value`; every other target reports
/// a mapping error.
pub trait FromValue: Sized {
    /// Convert from a `Value`.
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch<T>(value: &Value, target: &str) -> Result<T> {
    Err(Error::Mapping(format!(
        "cannot convert {} into {}",
        value.type_name(),
        target
    )))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().map_or_else(|| mismatch(value, "bool"), Ok)
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::BigInt(i) => Ok(*i),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Double(f) if f.fract() == 0.0 => Ok(*f as i64),
            _ => mismatch(value, "i64"),
        }
    }
}

macro_rules! impl_from_value_narrow {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> Result<Self> {
                    let wide = i64::from_value(value)?;
                    <$t>::try_from(wide).map_err(|_| {
                        Error::Mapping(format!(
                            "value {} out of range for {}",
                            wide,
                            stringify!($t)
                        ))
                    })
                }
            }
        )*
    };
}

impl_from_value_narrow!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().map_or_else(|| mismatch(value, "f64"), Ok)
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            _ => mismatch(value, "String"),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            _ => mismatch(value, "Vec<u8>"),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_timestamp()
            .map_or_else(|| mismatch(value, "DateTime<Utc>"), Ok)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
