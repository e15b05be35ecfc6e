//! Scalar cell codec: one field value to one typed cell and back.
//!
//! Encoding dispatches on the runtime [`Value`]; decoding dispatches on the
//! declared [`FieldType`], so a blank cell under any declared type reads
//! back as `Null`. Unsupported combinations are not errors: the writer logs
//! a warning and leaves the cell absent, the reader yields `Null`.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::warn;
use rowbook_model::{Cell, CellKind};

use crate::error::{Result, StoreError};
use crate::meta::{EnumType, FieldType};
use crate::value::Value;

/// Cell kind used for a declared field type, when one exists.
pub fn cell_kind_for(field_type: &FieldType) -> Option<CellKind> {
    match field_type {
        FieldType::Bool => Some(CellKind::Boolean),
        FieldType::I8
        | FieldType::I16
        | FieldType::I32
        | FieldType::I64
        | FieldType::F32
        | FieldType::F64 => Some(CellKind::Number),
        FieldType::Char | FieldType::String | FieldType::Bytes => Some(CellKind::String),
        FieldType::Date | FieldType::DateTime | FieldType::Timestamp => Some(CellKind::Date),
        FieldType::Time => Some(CellKind::Time),
        FieldType::Currency => Some(CellKind::Currency),
        FieldType::Enum(_) => None,
        FieldType::Object | FieldType::Custom(_) => None,
    }
}

/// Write one scalar value into `cell`.
///
/// `Null` produces a typed empty cell (kind set, no payload) so the column
/// keeps its type even across null stretches. Values the cell model cannot
/// carry are logged and skipped; the cell is cleared so no stale payload
/// survives an update.
pub fn encode_scalar(cell: &mut Cell, field_type: &FieldType, enum_as_ordinal: bool, value: &Value) {
    match value {
        Value::Null => {
            match effective_kind(field_type, enum_as_ordinal) {
                Some(kind) => {
                    cell.set_kind(kind);
                    cell.clear_value();
                }
                None => *cell = Cell::default(),
            };
        }
        Value::Bool(v) => cell.set_boolean(*v),
        Value::Int(v) => cell.set_number(*v as f64),
        Value::Real(v) => cell.set_number(*v),
        Value::Char(c) => cell.set_string(c.to_string()),
        Value::Str(s) => cell.set_string(s.clone()),
        Value::Bytes(bytes) => cell.set_string(BASE64.encode(bytes)),
        Value::Date(d) => cell.set_date(midnight(*d)),
        Value::DateTime(dt) => cell.set_date(*dt),
        Value::Time(t) => cell.set_time(*t),
        Value::Currency(amount) => cell.set_currency(amount.clone()),
        Value::Enum(variant) => {
            if enum_as_ordinal {
                match field_type {
                    FieldType::Enum(en) => match en.ordinal_of(variant) {
                        Some(ordinal) => cell.set_number(ordinal as f64),
                        None => {
                            warn!("enum {} has no variant {variant}; skipping field", en.name);
                            *cell = Cell::default();
                        }
                    },
                    other => {
                        warn!("ordinal enum storage on non-enum type {other:?}; skipping field");
                        *cell = Cell::default();
                    }
                }
            } else {
                cell.set_string(variant.clone());
            }
        }
        other => {
            // References and containers go through the relation mapper, not
            // the scalar codec.
            warn!("value {other:?} has no scalar cell mapping; skipping field");
            *cell = Cell::default();
        }
    }
}

/// Read one scalar value out of `cell` according to the declared type.
/// An absent or empty cell decodes as `Null` for every type.
pub fn decode_scalar(
    cell: Option<&Cell>,
    field_type: &FieldType,
    enum_as_ordinal: bool,
) -> Result<Value> {
    let cell = match cell {
        Some(cell) if !cell.is_empty() => cell,
        _ => return Ok(Value::Null),
    };
    let value = match field_type {
        FieldType::Bool => cell.boolean().map(Value::Bool),
        FieldType::I8 | FieldType::I16 | FieldType::I32 | FieldType::I64 => {
            cell.number().map(|v| Value::Int(v as i64))
        }
        FieldType::F32 | FieldType::F64 => cell.number().map(Value::Real),
        FieldType::Char => cell.string().and_then(|s| s.chars().next()).map(Value::Char),
        FieldType::String => cell.string().map(|s| Value::Str(s.to_string())),
        FieldType::Bytes => match cell.string() {
            Some(text) => Some(Value::Bytes(BASE64.decode(text).map_err(|e| {
                StoreError::Store(format!("malformed base64 cell payload: {e}"))
            })?)),
            None => None,
        },
        FieldType::Date => cell.date().map(|dt| Value::Date(dt.date())),
        FieldType::DateTime | FieldType::Timestamp => cell.date().map(Value::DateTime),
        FieldType::Time => cell.time().map(Value::Time),
        FieldType::Currency => cell.currency().map(|s| Value::Currency(s.to_string())),
        FieldType::Enum(en) => decode_enum(cell, en, enum_as_ordinal)?,
        FieldType::Object | FieldType::Custom(_) => {
            warn!("declared type {field_type:?} reached the scalar codec; yielding null");
            None
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

fn decode_enum(cell: &Cell, en: &EnumType, as_ordinal: bool) -> Result<Option<Value>> {
    if as_ordinal {
        let Some(number) = cell.number() else {
            return Ok(None);
        };
        let ordinal = number as usize;
        let variant = en.variant_at(ordinal).ok_or_else(|| {
            StoreError::Store(format!("enum {} has no variant at ordinal {ordinal}", en.name))
        })?;
        Ok(Some(Value::Enum(variant.to_string())))
    } else {
        Ok(cell.string().map(|s| Value::Enum(s.to_string())))
    }
}

fn effective_kind(field_type: &FieldType, enum_as_ordinal: bool) -> Option<CellKind> {
    match field_type {
        FieldType::Enum(_) => Some(if enum_as_ordinal {
            CellKind::Number
        } else {
            CellKind::String
        }),
        other => cell_kind_for(other),
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Converts between one application value and a fixed set of adjacent
/// columns. Registered by name; fields opt in via `FieldType::Custom`.
pub trait CellConverter {
    /// Declared type of each column the converter occupies, in order.
    fn columns(&self) -> &[FieldType];

    /// Split a value into one scalar per column. Must return exactly
    /// `columns().len()` values (`Null` entries for a null input).
    fn encode(&self, value: &Value) -> Result<Vec<Value>>;

    /// Reassemble the value from the per-column scalars.
    fn decode(&self, parts: &[Value]) -> Result<Value>;
}

/// Name-indexed converter registry, owned by the store.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Box<dyn CellConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, converter: Box<dyn CellConverter>) {
        self.converters.insert(name.into(), converter);
    }

    pub fn get(&self, name: &str) -> Result<&dyn CellConverter> {
        self.converters
            .get(name)
            .map(Box::as_ref)
            .ok_or_else(|| StoreError::UnknownConverter {
                name: name.to_string(),
            })
    }
}
