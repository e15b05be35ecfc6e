//! The persistence context: an arena of live object records.
//!
//! Objects are addressed by slot index ([`ObjectId`]) rather than by live
//! references, so an embedded record's owner is a lookup key instead of a
//! back-pointer and decode never builds reference cycles. The arena also
//! owns the identity index used to resolve portable identity strings back
//! into objects.

use std::collections::HashMap;

use crate::error::{Result, StoreError};
use crate::meta::{ClassId, IdentityKind, MetaRegistry};
use crate::value::Value;

/// Slot index of a record in the [`ObjectArena`].
pub type ObjectId = usize;

/// Surrogate key of a datastore-identity object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Int(v) => write!(f, "{v}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

/// One live object: class, current field values, and persistence state.
#[derive(Clone, Debug)]
pub struct Record {
    pub class: ClassId,
    pub fields: Vec<Value>,
    /// Pre-update snapshot of the field values, taken before in-memory
    /// mutation so nondurable row location can still match the stored row.
    pub snapshot: Option<Vec<Value>>,
    /// Set when a decoded multi-valued field dropped stale references; the
    /// owner needs a rewrite on its next store.
    pub dirty: bool,
    /// Whether this object has (or is in the middle of getting) a row.
    pub persisted: bool,
    /// Surrogate key, for datastore-identity classes.
    pub datastore_key: Option<Key>,
    /// Transactional version last written for this object.
    pub version: Option<Value>,
}

/// Arena of records plus the identity index.
#[derive(Default)]
pub struct ObjectArena {
    records: Vec<Record>,
    by_identity: HashMap<(ClassId, String), ObjectId>,
}

impl ObjectArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a record with the given field values.
    pub fn alloc(&mut self, class: ClassId, fields: Vec<Value>) -> ObjectId {
        let id = self.records.len();
        self.records.push(Record {
            class,
            fields,
            snapshot: None,
            dirty: false,
            persisted: false,
            datastore_key: None,
            version: None,
        });
        id
    }

    /// Allocate a record with every field `Null` (used when materializing
    /// rows before their fields are decoded).
    pub fn alloc_blank(&mut self, registry: &MetaRegistry, class: ClassId) -> ObjectId {
        let nfields = registry.class(class).fields.len();
        self.alloc(class, vec![Value::Null; nfields])
    }

    pub fn record(&self, id: ObjectId) -> &Record {
        &self.records[id]
    }

    pub fn record_mut(&mut self, id: ObjectId) -> &mut Record {
        &mut self.records[id]
    }

    pub fn field(&self, id: ObjectId, ordinal: usize) -> &Value {
        &self.records[id].fields[ordinal]
    }

    pub fn set_field(&mut self, id: ObjectId, ordinal: usize, value: Value) {
        self.records[id].fields[ordinal] = value;
    }

    /// Field value as of the pre-update snapshot, falling back to the
    /// current value when no snapshot exists (matching the locator's
    /// "original value" mode).
    pub fn original_field(&self, id: ObjectId, ordinal: usize) -> &Value {
        let record = &self.records[id];
        match &record.snapshot {
            Some(snapshot) => &snapshot[ordinal],
            None => &record.fields[ordinal],
        }
    }

    /// Capture the current field values as the pre-update snapshot.
    pub fn save_original(&mut self, id: ObjectId) {
        let fields = self.records[id].fields.clone();
        self.records[id].snapshot = Some(fields);
    }

    pub fn mark_dirty(&mut self, id: ObjectId) {
        self.records[id].dirty = true;
    }

    pub fn is_dirty(&self, id: ObjectId) -> bool {
        self.records[id].dirty
    }

    pub fn set_datastore_key(&mut self, id: ObjectId, key: Key) {
        self.records[id].datastore_key = Some(key);
    }

    /// Portable identity string for an object: `<class-name>:<key>`, with
    /// composite application keys joined by `;`. Errors if the class is
    /// nondurable (no stored identity) or the key material is unusable.
    pub fn portable_identity(&self, registry: &MetaRegistry, id: ObjectId) -> Result<String> {
        let record = &self.records[id];
        let meta = registry.class(record.class);
        match meta.identity {
            IdentityKind::Datastore => {
                let key = record.datastore_key.as_ref().ok_or_else(|| {
                    StoreError::Store(format!(
                        "object of class {} has no datastore key assigned",
                        meta.name
                    ))
                })?;
                Ok(format!("{}:{}", meta.name, key))
            }
            IdentityKind::Application => {
                let mut parts = Vec::new();
                for ordinal in meta.pk_ordinals() {
                    let literal =
                        record.fields[ordinal].identity_literal().ok_or_else(|| {
                            StoreError::Store(format!(
                                "primary-key field {}.{} holds a value unusable as identity",
                                meta.name, meta.fields[ordinal].name
                            ))
                        })?;
                    parts.push(literal);
                }
                Ok(format!("{}:{}", meta.name, parts.join(";")))
            }
            IdentityKind::Nondurable => Err(StoreError::Store(format!(
                "class {} is nondurable and has no portable identity",
                meta.name
            ))),
        }
    }

    /// Compute and index the object's identity so later resolution by
    /// portable string finds it.
    pub fn bind_identity(&mut self, registry: &MetaRegistry, id: ObjectId) -> Result<String> {
        let identity = self.portable_identity(registry, id)?;
        let class = self.records[id].class;
        self.by_identity.insert((class, identity.clone()), id);
        Ok(identity)
    }

    /// Resolve a portable identity string to a live object, if present.
    pub fn resolve(&self, class: ClassId, identity: &str) -> Option<ObjectId> {
        self.by_identity.get(&(class, identity.to_owned())).copied()
    }

    /// Drop the identity index entry for a deleted object.
    pub fn unbind_identity(&mut self, class: ClassId, identity: &str) {
        self.by_identity.remove(&(class, identity.to_owned()));
    }

    /// Find-or-create hook for datastore identity, used when materializing
    /// decoded rows. A freshly created record starts blank and persisted.
    pub fn find_or_create_datastore(
        &mut self,
        registry: &MetaRegistry,
        class: ClassId,
        key: Key,
    ) -> ObjectId {
        let identity = format!("{}:{}", registry.class(class).name, key);
        if let Some(id) = self.resolve(class, &identity) {
            return id;
        }
        let id = self.alloc_blank(registry, class);
        self.records[id].datastore_key = Some(key);
        self.records[id].persisted = true;
        self.by_identity.insert((class, identity), id);
        id
    }

    /// Find-or-create hook for application identity: `pk_values` pairs each
    /// primary-key ordinal with its decoded value.
    pub fn find_or_create_application(
        &mut self,
        registry: &MetaRegistry,
        class: ClassId,
        pk_values: Vec<(usize, Value)>,
    ) -> Result<ObjectId> {
        let meta = registry.class(class);
        let mut parts = Vec::new();
        for (ordinal, value) in &pk_values {
            let literal = value.identity_literal().ok_or_else(|| {
                StoreError::Store(format!(
                    "decoded primary-key field {}.{} is unusable as identity",
                    meta.name, meta.fields[*ordinal].name
                ))
            })?;
            parts.push(literal);
        }
        let identity = format!("{}:{}", meta.name, parts.join(";"));
        if let Some(id) = self.resolve(class, &identity) {
            return Ok(id);
        }
        let id = self.alloc_blank(registry, class);
        for (ordinal, value) in pk_values {
            self.records[id].fields[ordinal] = value;
        }
        self.records[id].persisted = true;
        self.by_identity.insert((class, identity), id);
        Ok(id)
    }

    /// Nondurable rows have no stored key; each materialization yields a
    /// fresh record.
    pub fn create_nondurable(&mut self, registry: &MetaRegistry, class: ClassId) -> ObjectId {
        let id = self.alloc_blank(registry, class);
        self.records[id].persisted = true;
        id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
