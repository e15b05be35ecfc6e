//! Class and field metadata consumed by the mapping engine.
//!
//! Metadata is registered up front in a [`MetaRegistry`] and addressed by
//! [`ClassId`] / field ordinal, mirroring how the engine's collaborators
//! expose schema information. Declaration order of fields is significant:
//! default column positions derive from it, and inherited fields are
//! expected to be listed first ("complete table per class" layout, where
//! each concrete class's sheet holds all inherited fields too).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Index of a class within the [`MetaRegistry`].
pub type ClassId = usize;

/// How a class's rows are uniquely addressed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityKind {
    /// One or more designated primary-key fields (possibly nested into an
    /// embedded key object).
    Application,
    /// A single opaque surrogate key held in a reserved column.
    Datastore,
    /// No stored key; full-value equality stands in for identity.
    Nondurable,
}

/// How the optimistic version stamp evolves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionStrategy {
    /// Seed 1, then +1 per update.
    Sequential,
    /// Wall-clock milliseconds; no monotonicity guarantee.
    Timestamp,
}

/// Per-class version configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSpec {
    pub strategy: VersionStrategy,
    /// Ordinal of the object field holding the version, or `None` for a
    /// surrogate version column.
    pub field: Option<usize>,
}

/// A named enum type: variant names in ordinal order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumType {
    pub fn new(name: impl Into<String>, variants: Vec<String>) -> Self {
        Self {
            name: name.into(),
            variants,
        }
    }

    pub fn ordinal_of(&self, variant: &str) -> Option<usize> {
        self.variants.iter().position(|v| v == variant)
    }

    pub fn variant_at(&self, ordinal: usize) -> Option<&str> {
        self.variants.get(ordinal).map(String::as_str)
    }
}

/// Declared type of a persistent field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Char,
    String,
    Bytes,
    /// Calendar date (no time of day).
    Date,
    /// Date and time of day.
    DateTime,
    /// Time of day only.
    Time,
    /// Date-time additionally usable as a version value.
    Timestamp,
    Currency,
    Enum(EnumType),
    /// Reference to another persistent class; the relation details live in
    /// [`FieldMeta::relation`].
    Object,
    /// A type handled by a registered [`crate::codec::CellConverter`].
    Custom(String),
}

/// Key or value slot of a map member: either a persistent class (stored by
/// identity) or one of the supported literal types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MapComponent {
    Class(ClassId),
    String,
    Enum(EnumType),
}

/// Relationship carried by a field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Relation {
    None,
    /// Single-valued reference.
    One {
        class: ClassId,
        embedded: bool,
        /// For embedded members: ordinal of the member inside the embedded
        /// class that points back at the owner. Consumes no column.
        owner_field: Option<usize>,
    },
    /// Ordered or unordered collection of references.
    Collection {
        element: ClassId,
        embedded: bool,
        /// Explicit ordering clause, e.g. `"name asc"`. `"#PK"` means
        /// order-by-primary-key, which preserves stored order on decode.
        ordering: Option<String>,
    },
    /// Fixed-order array of references.
    Array { element: ClassId, embedded: bool },
    Map {
        key: MapComponent,
        value: MapComponent,
        embedded: bool,
    },
}

impl Relation {
    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            Relation::Collection { .. } | Relation::Array { .. } | Relation::Map { .. }
        )
    }

    pub fn is_embedded(&self) -> bool {
        match self {
            Relation::None => false,
            Relation::One { embedded, .. }
            | Relation::Collection { embedded, .. }
            | Relation::Array { embedded, .. }
            | Relation::Map { embedded, .. } => *embedded,
        }
    }
}

/// Metadata for one persistent field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    pub field_type: FieldType,
    pub relation: Relation,
    /// Explicit 0-based column position; used verbatim when present.
    pub column_position: Option<usize>,
    /// Explicit column name; a name that parses as an integer doubles as a
    /// position (legacy convention).
    pub column_name: Option<String>,
    pub primary_key: bool,
    /// Non-persistent fields are skipped by every store/fetch path.
    pub persistent: bool,
    /// Enums persist as ordinal numbers when set, variant names otherwise.
    pub enum_as_ordinal: bool,
}

impl FieldMeta {
    /// A plain persistent scalar field with default column assignment.
    pub fn scalar(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            relation: Relation::None,
            column_position: None,
            column_name: None,
            primary_key: false,
            persistent: true,
            enum_as_ordinal: false,
        }
    }

    /// A single-valued reference to another persistent class.
    pub fn reference(name: impl Into<String>, class: ClassId) -> Self {
        Self {
            relation: Relation::One {
                class,
                embedded: false,
                owner_field: None,
            },
            ..Self::scalar(name, FieldType::Object)
        }
    }

    /// A single-valued embedded member of another persistent class.
    pub fn embedded(name: impl Into<String>, class: ClassId, owner_field: Option<usize>) -> Self {
        Self {
            relation: Relation::One {
                class,
                embedded: true,
                owner_field,
            },
            ..Self::scalar(name, FieldType::Object)
        }
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.column_position = Some(position);
        self
    }

    pub fn with_column_name(mut self, name: impl Into<String>) -> Self {
        self.column_name = Some(name.into());
        self
    }

    pub fn pk(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Metadata for one persistent class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassMeta {
    pub name: String,
    /// Sheet name holding this class's rows.
    pub table_name: String,
    pub identity: IdentityKind,
    /// All persistent fields in declaration order, inherited fields first.
    pub fields: Vec<FieldMeta>,
    pub version: Option<VersionSpec>,
    /// Direct and transitive subclasses; their sheets are included in
    /// subclass-aware candidate scans.
    pub subclasses: Vec<ClassId>,
}

impl ClassMeta {
    pub fn new(name: impl Into<String>, identity: IdentityKind, fields: Vec<FieldMeta>) -> Self {
        let name = name.into();
        Self {
            table_name: name.clone(),
            name,
            identity,
            fields,
            version: None,
            subclasses: Vec::new(),
        }
    }

    pub fn with_table_name(mut self, table: impl Into<String>) -> Self {
        self.table_name = table.into();
        self
    }

    pub fn with_version(mut self, version: VersionSpec) -> Self {
        self.version = Some(version);
        self
    }

    pub fn field(&self, ordinal: usize) -> Option<&FieldMeta> {
        self.fields.get(ordinal)
    }

    /// Ordinals of the primary-key fields, in declaration order.
    pub fn pk_ordinals(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(i, _)| i)
            .collect()
    }

    /// Ordinals of every persistent field.
    pub fn persistent_ordinals(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.persistent)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Registry of class metadata, addressed by [`ClassId`].
#[derive(Default)]
pub struct MetaRegistry {
    classes: Vec<ClassMeta>,
    by_name: HashMap<String, ClassId>,
}

impl MetaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class, returning its id. Replaces nothing: registering a
    /// duplicate name returns the existing id unchanged.
    pub fn register(&mut self, meta: ClassMeta) -> ClassId {
        if let Some(&id) = self.by_name.get(&meta.name) {
            return id;
        }
        let id = self.classes.len();
        self.by_name.insert(meta.name.clone(), id);
        self.classes.push(meta);
        id
    }

    pub fn class(&self, id: ClassId) -> &ClassMeta {
        &self.classes[id]
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Record `sub` as a subclass of `base` for candidate scans.
    pub fn add_subclass(&mut self, base: ClassId, sub: ClassId) {
        self.classes[base].subclasses.push(sub);
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
