//! Embedded-member flattening.
//!
//! An embedded member stores no reference literal; its fields spread into
//! the owner's row at the columns the layout assigned along the member
//! chain. This module walks the chain and yields leaf slots (path, record,
//! field ordinal); the store encodes or decodes each slot like a top-level
//! field at the path's columns. The designated owner back-reference member
//! never appears as a leaf: on write it is ignored (after pointing it back
//! at the owner when it drifted), on read it is populated from the live
//! owner.

use crate::context::{ObjectArena, ObjectId};
use crate::error::{Result, StoreError};
use crate::meta::{ClassId, FieldMeta, MetaRegistry, Relation};
use crate::value::Value;

/// One flattened leaf of an embedded member chain.
pub struct LeafSlot {
    /// Member-ordinal chain from the owning class down to the leaf, as used
    /// by [`crate::layout::ColumnLayout::embedded_positions`].
    pub path: Vec<usize>,
    /// Record holding the leaf field; `None` when an ancestor embedded
    /// value is null (the leaf columns store typed nulls).
    pub object: Option<ObjectId>,
    /// Field ordinal of the leaf within its own class.
    pub ordinal: usize,
    /// Metadata of the leaf field.
    pub field: FieldMeta,
}

/// Enumerate the leaves of the embedded member at `field_ordinal` on
/// `owner`, for writing. Fixes up drifted owner back-references as a side
/// effect.
pub fn write_leaves(
    arena: &mut ObjectArena,
    registry: &MetaRegistry,
    owner: ObjectId,
    field_ordinal: usize,
) -> Result<Vec<LeafSlot>> {
    let owner_meta = registry.class(arena.record(owner).class);
    let field = &owner_meta.fields[field_ordinal];
    let Relation::One {
        class,
        embedded: true,
        owner_field,
    } = field.relation
    else {
        return Err(StoreError::Store(format!(
            "field {}.{} is not an embedded member",
            owner_meta.name, field.name
        )));
    };

    let embedded = match arena.field(owner, field_ordinal) {
        Value::Ref(id) => Some(*id),
        Value::Null => None,
        other => {
            return Err(StoreError::Store(format!(
                "embedded member {}.{} holds non-reference value {other:?}",
                owner_meta.name, field.name
            )))
        }
    };

    let mut leaves = Vec::new();
    collect_write(
        arena,
        registry,
        class,
        owner_field,
        owner,
        embedded,
        &mut vec![field_ordinal],
        &mut leaves,
    )?;
    Ok(leaves)
}

#[allow(clippy::too_many_arguments)]
fn collect_write(
    arena: &mut ObjectArena,
    registry: &MetaRegistry,
    class: ClassId,
    owner_field: Option<usize>,
    owner: ObjectId,
    embedded: Option<ObjectId>,
    path: &mut Vec<usize>,
    leaves: &mut Vec<LeafSlot>,
) -> Result<()> {
    if let (Some(embedded), Some(back)) = (embedded, owner_field) {
        if arena.field(embedded, back) != &Value::Ref(owner) {
            arena.set_field(embedded, back, Value::Ref(owner));
        }
    }
    let nfields = registry.class(class).fields.len();
    for ordinal in 0..nfields {
        let meta = registry.class(class);
        let field = &meta.fields[ordinal];
        if !field.persistent || owner_field == Some(ordinal) {
            continue;
        }
        path.push(ordinal);
        if let Relation::One {
            class: nested,
            embedded: true,
            owner_field: nested_owner,
        } = field.relation
        {
            let nested_id = match embedded {
                Some(id) => match arena.field(id, ordinal) {
                    Value::Ref(n) => Some(*n),
                    _ => None,
                },
                None => None,
            };
            // A null intermediate still yields leaves so its columns are
            // written as typed nulls.
            if let Some(id) = embedded {
                collect_write(arena, registry, nested, nested_owner, id, nested_id, path, leaves)?;
            } else {
                collect_write(arena, registry, nested, nested_owner, owner, None, path, leaves)?;
            }
        } else {
            leaves.push(LeafSlot {
                path: path.clone(),
                object: embedded,
                ordinal,
                field: field.clone(),
            });
        }
        path.pop();
    }
    Ok(())
}

/// Build fresh records for the embedded member chain at `field_ordinal` on
/// `owner` and enumerate the leaves to decode into them. The owner's field
/// is pointed at the new record and every back-reference at its live owner.
pub fn build_tree(
    arena: &mut ObjectArena,
    registry: &MetaRegistry,
    owner: ObjectId,
    field_ordinal: usize,
) -> Result<Vec<LeafSlot>> {
    let owner_meta = registry.class(arena.record(owner).class);
    let field = &owner_meta.fields[field_ordinal];
    let Relation::One {
        class,
        embedded: true,
        owner_field,
    } = field.relation
    else {
        return Err(StoreError::Store(format!(
            "field {}.{} is not an embedded member",
            owner_meta.name, field.name
        )));
    };

    let mut leaves = Vec::new();
    build_into(
        arena,
        registry,
        class,
        owner_field,
        owner,
        field_ordinal,
        &mut vec![field_ordinal],
        &mut leaves,
    )?;
    Ok(leaves)
}

#[allow(clippy::too_many_arguments)]
fn build_into(
    arena: &mut ObjectArena,
    registry: &MetaRegistry,
    class: ClassId,
    owner_field: Option<usize>,
    owner: ObjectId,
    owner_ordinal: usize,
    path: &mut Vec<usize>,
    leaves: &mut Vec<LeafSlot>,
) -> Result<()> {
    let embedded = arena.alloc_blank(registry, class);
    arena.set_field(owner, owner_ordinal, Value::Ref(embedded));
    if let Some(back) = owner_field {
        arena.set_field(embedded, back, Value::Ref(owner));
    }

    let nfields = registry.class(class).fields.len();
    for ordinal in 0..nfields {
        let meta = registry.class(class);
        let field = &meta.fields[ordinal];
        if !field.persistent || owner_field == Some(ordinal) {
            continue;
        }
        path.push(ordinal);
        if let Relation::One {
            class: nested,
            embedded: true,
            owner_field: nested_owner,
        } = field.relation
        {
            build_into(arena, registry, nested, nested_owner, embedded, ordinal, path, leaves)?;
        } else {
            leaves.push(LeafSlot {
                path: path.clone(),
                object: Some(embedded),
                ordinal,
                field: field.clone(),
            });
        }
        path.pop();
    }
    Ok(())
}
