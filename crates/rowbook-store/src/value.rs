//! Runtime field values.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::context::ObjectId;

/// The in-memory value of an object field.
///
/// Encoding dispatches on this runtime type; decoding dispatches on the
/// declared [`crate::meta::FieldType`]. Integer widths collapse to `Int`
/// here — the declared type narrows on decode.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Char(char),
    Str(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    /// Currency amount in canonical string form.
    Currency(String),
    /// Enum variant name; the ordinal derives from the field's
    /// [`crate::meta::EnumType`].
    Enum(String),
    /// Reference to another object in the arena.
    Ref(ObjectId),
    List(Vec<Value>),
    /// Insertion-ordered map entries.
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<ObjectId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Literal form used inside portable identity strings and map-entry
    /// literals. `None` for value categories that cannot serve as identity
    /// components.
    pub fn identity_literal(&self) -> Option<String> {
        match self {
            Value::Int(v) => Some(v.to_string()),
            Value::Str(s) => Some(s.clone()),
            Value::Char(c) => Some(c.to_string()),
            Value::Enum(name) => Some(name.clone()),
            Value::Date(d) => Some(d.to_string()),
            Value::DateTime(dt) => Some(dt.and_utc().timestamp_millis().to_string()),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
