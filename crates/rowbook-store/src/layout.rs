//! Column layout planning: assigns every persistent field (and the
//! surrogate identity/version roles) a stable 0-based column position.
//!
//! Rules, in precedence order for each field:
//! 1. an explicit column position is used verbatim;
//! 2. an explicit column name that parses as an integer is used as the
//!    position (legacy convention);
//! 3. otherwise the field's ordinal among all persistent fields.
//!
//! Embedded members consume no column themselves; their leaves are
//! path-addressed through the owning member chain and allocated after all
//! directly-assigned positions so sibling embeddings of the same type never
//! alias. The surrogate datastore-id column sits immediately after the last
//! field position, the surrogate version column after that. Claiming an
//! already-held position fails fast with a collision error.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::codec::ConverterRegistry;
use crate::error::{Result, StoreError};
use crate::meta::{ClassId, ClassMeta, FieldType, IdentityKind, MetaRegistry, Relation};

/// Column name given to the surrogate datastore-identity column.
pub const DATASTORE_ID_COLUMN: &str = "ID";
/// Column name given to the surrogate version column.
pub const VERSION_COLUMN: &str = "VERSION";

/// Immutable column plan for one class.
#[derive(Clone, Debug)]
pub struct ColumnLayout {
    /// Adjacent column positions per field ordinal (empty for embedded
    /// members and non-persistent fields).
    field_columns: Vec<Vec<usize>>,
    /// Flattened embedded leaves: member-ordinal path -> adjacent positions.
    embedded: HashMap<Vec<usize>, Vec<usize>>,
    datastore_id: Option<usize>,
    version: Option<usize>,
    /// position -> column name, for header rows and diagnostics.
    names: BTreeMap<usize, String>,
}

impl ColumnLayout {
    /// Plan the layout for `class`. Fails fast on any position collision.
    pub fn build(
        registry: &MetaRegistry,
        class: ClassId,
        converters: &ConverterRegistry,
    ) -> Result<ColumnLayout> {
        let meta = registry.class(class);
        let mut plan = Planner {
            registry,
            converters,
            names: BTreeMap::new(),
        };

        let mut field_columns = vec![Vec::new(); meta.fields.len()];
        let mut embedded = HashMap::new();

        // Directly assigned fields first; embedded flattening afterwards so
        // leaves land in the free space above every explicit/ordinal slot.
        for (ordinal, field) in meta.fields.iter().enumerate() {
            if !field.persistent {
                continue;
            }
            if let Relation::One { embedded: true, .. } = field.relation {
                continue;
            }
            let width = plan.column_span(field)?;
            let start = explicit_position(field).unwrap_or(ordinal);
            plan.claim(start, width, &field.name)?;
            field_columns[ordinal] = (start..start + width).collect();
        }

        for (ordinal, field) in meta.fields.iter().enumerate() {
            if !field.persistent {
                continue;
            }
            if let Relation::One {
                class: emb_class,
                embedded: true,
                owner_field,
            } = field.relation
            {
                plan.flatten_embedded(
                    emb_class,
                    owner_field,
                    &mut vec![ordinal],
                    &field.name,
                    &mut embedded,
                )?;
            }
        }

        let datastore_id = if meta.identity == IdentityKind::Datastore {
            let pos = plan.next_free();
            plan.claim(pos, 1, DATASTORE_ID_COLUMN)?;
            Some(pos)
        } else {
            None
        };

        let version = match &meta.version {
            Some(spec) if spec.field.is_none() => {
                let pos = plan.next_free();
                plan.claim(pos, 1, VERSION_COLUMN)?;
                Some(pos)
            }
            _ => None,
        };

        Ok(ColumnLayout {
            field_columns,
            embedded,
            datastore_id,
            version,
            names: plan.into_names(),
        })
    }

    /// First (or only) column of a field.
    pub fn position(&self, ordinal: usize) -> usize {
        self.field_columns[ordinal][0]
    }

    /// All adjacent columns of a field (more than one for multi-column
    /// converters).
    pub fn positions(&self, ordinal: usize) -> &[usize] {
        &self.field_columns[ordinal]
    }

    /// Columns of a flattened embedded leaf, addressed by the member chain
    /// from the owning class down to the leaf.
    pub fn embedded_positions(&self, path: &[usize]) -> Option<&[usize]> {
        self.embedded.get(path).map(Vec::as_slice)
    }

    pub fn datastore_id_position(&self) -> Option<usize> {
        self.datastore_id
    }

    pub fn version_position(&self) -> Option<usize> {
        self.version
    }

    /// position -> column name, ordered by position.
    pub fn column_names(&self) -> &BTreeMap<usize, String> {
        &self.names
    }

    /// Total column span (highest assigned position + 1).
    pub fn width(&self) -> usize {
        self.names.keys().next_back().map_or(0, |p| p + 1)
    }
}

fn explicit_position(field: &crate::meta::FieldMeta) -> Option<usize> {
    if let Some(pos) = field.column_position {
        return Some(pos);
    }
    field
        .column_name
        .as_deref()
        .and_then(|name| name.parse::<usize>().ok())
}

struct Planner<'a> {
    registry: &'a MetaRegistry,
    converters: &'a ConverterRegistry,
    /// position -> column name; claiming a held position fails fast.
    names: BTreeMap<usize, String>,
}

impl Planner<'_> {
    fn column_span(&self, field: &crate::meta::FieldMeta) -> Result<usize> {
        match &field.field_type {
            FieldType::Custom(name) => {
                let converter = self.converters.get(name)?;
                Ok(converter.columns().len())
            }
            _ => Ok(1),
        }
    }

    fn claim(&mut self, start: usize, width: usize, name: &str) -> Result<()> {
        for offset in 0..width {
            let column_name = if width == 1 {
                name.to_string()
            } else {
                format!("{name}#{offset}")
            };
            let position = start + offset;
            if let Some(existing) = self.names.insert(position, column_name.clone()) {
                return Err(StoreError::ColumnCollision {
                    position,
                    first: existing,
                    second: column_name,
                });
            }
        }
        Ok(())
    }

    fn next_free(&self) -> usize {
        self.names.keys().next_back().map_or(0, |p| p + 1)
    }

    fn flatten_embedded(
        &mut self,
        class: ClassId,
        owner_field: Option<usize>,
        path: &mut Vec<usize>,
        prefix: &str,
        out: &mut HashMap<Vec<usize>, Vec<usize>>,
    ) -> Result<()> {
        let meta: &ClassMeta = self.registry.class(class);
        for (ordinal, field) in meta.fields.iter().enumerate() {
            if !field.persistent {
                continue;
            }
            // The owner back-reference is populated from the live owner on
            // read and ignored on write; it never consumes a column.
            if owner_field == Some(ordinal) {
                continue;
            }
            let name = format!("{prefix}.{}", field.name);
            path.push(ordinal);
            match field.relation {
                Relation::One {
                    class: nested,
                    embedded: true,
                    owner_field: nested_owner,
                } => {
                    self.flatten_embedded(nested, nested_owner, path, &name, out)?;
                }
                _ => {
                    let width = self.column_span(field)?;
                    let start = explicit_position(field).unwrap_or_else(|| self.next_free());
                    self.claim(start, width, &name)?;
                    out.insert(path.clone(), (start..start + width).collect());
                }
            }
            path.pop();
        }
        Ok(())
    }

    fn into_names(self) -> BTreeMap<usize, String> {
        self.names
    }
}

/// Read-through cache of per-class layouts, owned by the store and handed
/// by reference into the mapping paths (no ambient global state).
#[derive(Default)]
pub struct SchemaCache {
    layouts: HashMap<ClassId, Rc<ColumnLayout>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached layout for `class`, building (and fail-fast validating)
    /// it on first use.
    pub fn layout(
        &mut self,
        registry: &MetaRegistry,
        converters: &ConverterRegistry,
        class: ClassId,
    ) -> Result<Rc<ColumnLayout>> {
        if let Some(layout) = self.layouts.get(&class) {
            return Ok(Rc::clone(layout));
        }
        let layout = Rc::new(ColumnLayout::build(registry, class, converters)?);
        self.layouts.insert(class, Rc::clone(&layout));
        Ok(layout)
    }
}
