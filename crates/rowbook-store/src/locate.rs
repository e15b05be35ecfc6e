//! Row location: full scans matching stored cells against object values.
//!
//! No index is maintained; every lookup walks the sheet's rows in order and
//! short-circuits on the first match. Insert-uniqueness checks, update,
//! delete, and fetch each pay this cost independently.

use rowbook_model::{Cell, Sheet};

use crate::context::{Key, ObjectArena, ObjectId};
use crate::error::{Result, StoreError};
use crate::layout::ColumnLayout;
use crate::meta::{FieldMeta, FieldType, IdentityKind, MetaRegistry, Relation};
use crate::value::Value;

/// Which field values to match against: the object's current values, or its
/// pre-update snapshot (for nondurable rows whose fields were already
/// mutated in memory before the row is located).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueSource {
    Current,
    Original,
}

/// Find the row holding `object`, or `NotFound`.
pub fn find_row(
    sheet: &Sheet,
    arena: &ObjectArena,
    registry: &MetaRegistry,
    layout: &ColumnLayout,
    object: ObjectId,
    source: ValueSource,
) -> Result<usize> {
    let class = arena.record(object).class;
    let meta = registry.class(class);

    let checks = match meta.identity {
        IdentityKind::Application => pk_checks(arena, registry, layout, object, source)?,
        IdentityKind::Datastore => {
            let position = layout.datastore_id_position().ok_or_else(|| {
                StoreError::Store(format!("class {} has no surrogate id column", meta.name))
            })?;
            let key = arena.record(object).datastore_key.as_ref().ok_or_else(|| {
                StoreError::Store(format!(
                    "object of class {} has no datastore key to locate by",
                    meta.name
                ))
            })?;
            let value = match key {
                Key::Int(n) => Value::Int(*n),
                Key::Str(s) => Value::Str(s.clone()),
            };
            vec![(position, value)]
        }
        IdentityKind::Nondurable => nondurable_checks(arena, registry, layout, object, source),
    };

    if let Some(index) = row_matching(sheet, &checks) {
        return Ok(index);
    }

    let identity = match meta.identity {
        IdentityKind::Nondurable => format!("(nondurable {})", meta.name),
        _ => arena.portable_identity(registry, object)?,
    };
    Err(StoreError::NotFound {
        sheet: sheet.name().to_string(),
        identity,
    })
}

/// First data row satisfying every column/value check, if any.
pub(crate) fn row_matching(sheet: &Sheet, checks: &[(usize, Value)]) -> Option<usize> {
    sheet
        .data_rows()
        .find(|(_, row)| {
            checks
                .iter()
                .all(|(position, value)| cell_matches_value(row.cell(*position), value))
        })
        .map(|(index, _)| index)
}

/// Column/value pairs for an application-identity match, resolving embedded
/// primary-key components recursively into their own columns.
fn pk_checks(
    arena: &ObjectArena,
    registry: &MetaRegistry,
    layout: &ColumnLayout,
    object: ObjectId,
    source: ValueSource,
) -> Result<Vec<(usize, Value)>> {
    let class = arena.record(object).class;
    let meta = registry.class(class);
    let mut checks = Vec::new();
    for ordinal in meta.pk_ordinals() {
        let field = &meta.fields[ordinal];
        match field.relation {
            Relation::One {
                class: emb_class,
                embedded: true,
                owner_field,
            } => {
                let value = field_value(arena, object, ordinal, source);
                let Some(embedded) = value.as_ref_id() else {
                    return Err(StoreError::Store(format!(
                        "embedded key member {}.{} is unset",
                        meta.name, field.name
                    )));
                };
                collect_embedded_checks(
                    arena,
                    registry,
                    layout,
                    emb_class,
                    owner_field,
                    embedded,
                    source,
                    &mut vec![ordinal],
                    &mut checks,
                )?;
            }
            _ => {
                let value = field_value(arena, object, ordinal, source);
                checks.push((layout.position(ordinal), comparable(field, value)));
            }
        }
    }
    Ok(checks)
}

#[allow(clippy::too_many_arguments)]
fn collect_embedded_checks(
    arena: &ObjectArena,
    registry: &MetaRegistry,
    layout: &ColumnLayout,
    class: crate::meta::ClassId,
    owner_field: Option<usize>,
    object: ObjectId,
    source: ValueSource,
    path: &mut Vec<usize>,
    checks: &mut Vec<(usize, Value)>,
) -> Result<()> {
    let meta = registry.class(class);
    for (ordinal, field) in meta.fields.iter().enumerate() {
        if !field.persistent || owner_field == Some(ordinal) {
            continue;
        }
        path.push(ordinal);
        match field.relation {
            Relation::One {
                class: nested,
                embedded: true,
                owner_field: nested_owner,
            } => {
                let value = field_value(arena, object, ordinal, source);
                if let Some(nested_id) = value.as_ref_id() {
                    collect_embedded_checks(
                        arena, registry, layout, nested, nested_owner, nested_id, source, path,
                        checks,
                    )?;
                }
            }
            _ => {
                if let Some(positions) = layout.embedded_positions(path) {
                    let value = field_value(arena, object, ordinal, source);
                    checks.push((positions[0], comparable(field, value)));
                }
            }
        }
        path.pop();
    }
    Ok(())
}

/// Column/value pairs for a nondurable match: every non-relation persistent
/// field participates.
fn nondurable_checks(
    arena: &ObjectArena,
    registry: &MetaRegistry,
    layout: &ColumnLayout,
    object: ObjectId,
    source: ValueSource,
) -> Vec<(usize, Value)> {
    let class = arena.record(object).class;
    let meta = registry.class(class);
    meta.fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.persistent && matches!(f.relation, Relation::None))
        .map(|(ordinal, field)| {
            let value = field_value(arena, object, ordinal, source);
            (layout.position(ordinal), comparable(field, value))
        })
        .collect()
}

fn field_value<'a>(
    arena: &'a ObjectArena,
    object: ObjectId,
    ordinal: usize,
    source: ValueSource,
) -> &'a Value {
    match source {
        ValueSource::Current => arena.field(object, ordinal),
        ValueSource::Original => arena.original_field(object, ordinal),
    }
}

/// Reduce a field value to the form it takes in a stored cell, so the
/// comparison below sees like against like.
pub(crate) fn comparable(field: &FieldMeta, value: &Value) -> Value {
    match value {
        Value::Enum(variant) => {
            if field.enum_as_ordinal {
                if let FieldType::Enum(en) = &field.field_type {
                    if let Some(ordinal) = en.ordinal_of(variant) {
                        return Value::Int(ordinal as i64);
                    }
                }
            }
            Value::Str(variant.clone())
        }
        other => other.clone(),
    }
}

/// Exact match between a stored cell and a runtime value: the cell's kind
/// must agree with the value's type family, numbers compare after the
/// integer's truncation to the stored double, strings compare exactly, and
/// dates/times compare to the millisecond.
pub fn cell_matches_value(cell: Option<&Cell>, value: &Value) -> bool {
    let Some(cell) = cell else {
        return value.is_null();
    };
    match value {
        Value::Null => cell.is_empty(),
        Value::Bool(b) => cell.boolean() == Some(*b),
        Value::Int(v) => cell.number() == Some(*v as f64),
        Value::Real(v) => cell.number() == Some(*v),
        Value::Char(c) => {
            cell.string().map(|s| s.chars().collect::<Vec<_>>()) == Some(vec![*c])
        }
        Value::Str(s) => cell.string() == Some(s.as_str()),
        Value::Bytes(bytes) => {
            use base64::Engine;
            cell.string()
                .map(|s| base64::engine::general_purpose::STANDARD.encode(bytes) == s)
                .unwrap_or(false)
        }
        Value::Date(d) => cell.date() == Some(d.and_time(chrono::NaiveTime::MIN)),
        Value::DateTime(dt) => cell
            .date()
            .map(|stored| stored.and_utc().timestamp_millis() == dt.and_utc().timestamp_millis())
            .unwrap_or(false),
        Value::Time(t) => cell.time() == Some(*t),
        Value::Currency(s) => cell.currency() == Some(s.as_str()),
        Value::Enum(variant) => cell.string() == Some(variant.as_str()),
        Value::Ref(_) | Value::List(_) | Value::Map(_) => false,
    }
}
