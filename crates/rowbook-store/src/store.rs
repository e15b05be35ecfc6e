//! The store facade: insert/update/delete/fetch/locate against one sheet
//! per class, plus bulk candidate materialization for query evaluation.
//!
//! Writes are staged before any cell is touched: relation fields cascade
//! persists and reduce to literal strings first, so by the time the row is
//! mutated every write is a plain scalar at a known column. There is no
//! rollback; a failure partway through applying a row leaves it partially
//! written and the outer connection decides whether to keep the document.

use std::rc::Rc;

use log::{debug, warn};
use rowbook_model::{Document, Row};

use crate::codec::{self, CellConverter, ConverterRegistry};
use crate::context::{Key, ObjectArena, ObjectId};
use crate::embed;
use crate::error::{Result, StoreError};
use crate::generator::IncrementGenerator;
use crate::layout::{ColumnLayout, SchemaCache};
use crate::locate::{self, ValueSource};
use crate::meta::{ClassId, FieldMeta, FieldType, IdentityKind, MetaRegistry, Relation};
use crate::relation::{self, ParsedIdentity};
use crate::schema;
use crate::value::Value;
use crate::version;

/// One pending scalar write.
struct StagedCell {
    position: usize,
    field_type: FieldType,
    enum_as_ordinal: bool,
    value: Value,
}

/// Row-mapping engine over one in-memory document.
pub struct SheetStore {
    registry: MetaRegistry,
    arena: ObjectArena,
    converters: ConverterRegistry,
    cache: SchemaCache,
    generator: IncrementGenerator,
}

impl SheetStore {
    pub fn new(registry: MetaRegistry) -> Self {
        Self {
            registry,
            arena: ObjectArena::new(),
            converters: ConverterRegistry::new(),
            cache: SchemaCache::new(),
            generator: IncrementGenerator::default(),
        }
    }

    pub fn with_generator(mut self, generator: IncrementGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn registry(&self) -> &MetaRegistry {
        &self.registry
    }

    pub fn arena(&self) -> &ObjectArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut ObjectArena {
        &mut self.arena
    }

    /// Register a multi-column converter under the name fields refer to via
    /// `FieldType::Custom`.
    pub fn register_converter(&mut self, name: impl Into<String>, converter: Box<dyn CellConverter>) {
        self.converters.register(name, converter);
    }

    /// Allocate a new unpersisted object.
    pub fn new_object(&mut self, class: ClassId, fields: Vec<Value>) -> ObjectId {
        self.arena.alloc(class, fields)
    }

    fn layout(&mut self, class: ClassId) -> Result<Rc<ColumnLayout>> {
        self.cache.layout(&self.registry, &self.converters, class)
    }

    /// Create the class's sheet (with header row) if it does not exist yet.
    pub fn ensure_schema(&mut self, doc: &mut Document, class: ClassId) -> Result<()> {
        let layout = self.layout(class)?;
        let table = self.registry.class(class).table_name.clone();
        schema::ensure_sheet(doc, &table, &layout)?;
        Ok(())
    }

    /// Drop the class's sheet, returning whether it existed.
    pub fn drop_schema(&mut self, doc: &mut Document, class: ClassId) -> bool {
        let table = self.registry.class(class).table_name.clone();
        schema::delete_sheet(doc, &table)
    }

    /// Persist a new object as an appended row. Duplicate identities are
    /// rejected before anything is written.
    pub fn insert(&mut self, doc: &mut Document, object: ObjectId) -> Result<()> {
        let class = self.arena.record(object).class;
        let meta = self.registry.class(class);
        let table = meta.table_name.clone();
        let class_name = meta.name.clone();
        let identity_kind = meta.identity;
        let version_spec = meta.version.clone();
        let ordinals = meta.persistent_ordinals();
        let layout = self.layout(class)?;

        if identity_kind == IdentityKind::Datastore
            && self.arena.record(object).datastore_key.is_none()
        {
            let key = self.generator.next(doc, &class_name)?;
            self.arena.set_datastore_key(object, Key::Int(key));
        }

        schema::ensure_sheet(doc, &table, &layout)?;

        if identity_kind != IdentityKind::Nondurable {
            let sheet = doc
                .sheet(&table)
                .ok_or_else(|| StoreError::Store(format!("sheet {table} missing after creation")))?;
            match locate::find_row(sheet, &self.arena, &self.registry, &layout, object, ValueSource::Current)
            {
                Ok(_) => {
                    let identity = self.arena.portable_identity(&self.registry, object)?;
                    return Err(StoreError::DuplicateIdentity {
                        sheet: table,
                        identity,
                    });
                }
                Err(StoreError::NotFound { .. }) => {}
                Err(other) => return Err(other),
            }
            self.arena.bind_identity(&self.registry, object)?;
        }

        // Marked before staging so a reference cycle back to this object
        // does not recurse into a second insert.
        self.arena.record_mut(object).persisted = true;

        let stamp = version_spec.as_ref().map(|spec| version::seed(spec.strategy));
        if let (Some(spec), Some(stamp)) = (&version_spec, &stamp) {
            if let Some(ordinal) = spec.field {
                self.arena.set_field(object, ordinal, stamp.clone());
            }
        }

        let mut staged = self.stage_fields(doc, object, &ordinals)?;
        if let Some(position) = layout.datastore_id_position() {
            let key = self.arena.record(object).datastore_key.clone().ok_or_else(|| {
                StoreError::Store(format!("no datastore key for {class_name} at insert"))
            })?;
            let (field_type, value) = match key {
                Key::Int(n) => (FieldType::I64, Value::Int(n)),
                Key::Str(s) => (FieldType::String, Value::Str(s)),
            };
            staged.push(StagedCell {
                position,
                field_type,
                enum_as_ordinal: false,
                value,
            });
        }
        if let (Some(position), Some(spec), Some(stamp)) =
            (layout.version_position(), &version_spec, &stamp)
        {
            staged.push(StagedCell {
                position,
                field_type: version::value_type(spec.strategy),
                enum_as_ordinal: false,
                value: stamp.clone(),
            });
        }

        let sheet = doc
            .sheet_mut(&table)
            .ok_or_else(|| StoreError::Store(format!("sheet {table} missing at append")))?;
        let index = sheet.append_row();
        let row = sheet
            .row_mut(index)
            .ok_or_else(|| StoreError::Store("appended row missing".into()))?;
        apply_staged(row, &staged);

        self.arena.record_mut(object).version = stamp;
        debug!("inserted {class_name} at row {index} of sheet {table}");
        Ok(())
    }

    /// Rewrite the changed fields of an already-persisted object. A
    /// versioned class additionally recomputes and rewrites its stamp even
    /// when the caller did not list the version field.
    pub fn update(&mut self, doc: &mut Document, object: ObjectId, fields: &[usize]) -> Result<()> {
        let class = self.arena.record(object).class;
        let meta = self.registry.class(class);
        let table = meta.table_name.clone();
        let identity_kind = meta.identity;
        let version_spec = meta.version.clone();
        let layout = self.layout(class)?;

        let mut ordinals = fields.to_vec();
        let mut stamp = None;
        if let Some(spec) = &version_spec {
            let next = version::next(spec.strategy, self.arena.record(object).version.as_ref());
            if let Some(ordinal) = spec.field {
                self.arena.set_field(object, ordinal, next.clone());
                if !ordinals.contains(&ordinal) {
                    ordinals.push(ordinal);
                }
            }
            stamp = Some(next);
        }

        let mut staged = self.stage_fields(doc, object, &ordinals)?;
        if let (Some(position), Some(spec), Some(stamp)) =
            (layout.version_position(), &version_spec, &stamp)
        {
            staged.push(StagedCell {
                position,
                field_type: version::value_type(spec.strategy),
                enum_as_ordinal: false,
                value: stamp.clone(),
            });
        }

        let source = locate_source(identity_kind);
        let sheet = doc
            .sheet(&table)
            .ok_or_else(|| StoreError::Store(format!("sheet {table} missing during update")))?;
        let index =
            locate::find_row(sheet, &self.arena, &self.registry, &layout, object, source).map_err(
                |err| match err {
                    // A vanished row during update is a fault of the store
                    // state, not a plain not-found the caller can absorb.
                    StoreError::NotFound { sheet, identity } => StoreError::Store(format!(
                        "row for {identity} disappeared from sheet {sheet} during update"
                    )),
                    other => other,
                },
            )?;

        let row = doc
            .sheet_mut(&table)
            .and_then(|sheet| sheet.row_mut(index))
            .ok_or_else(|| StoreError::Store("located row missing at rewrite".into()))?;
        apply_staged(row, &staged);

        let record = self.arena.record_mut(object);
        if stamp.is_some() {
            record.version = stamp;
        }
        record.snapshot = None;
        record.dirty = false;
        debug!("updated row {index} of sheet {table}");
        Ok(())
    }

    /// Remove the object's row. Missing rows surface as `NotFound`.
    pub fn delete(&mut self, doc: &mut Document, object: ObjectId) -> Result<()> {
        let class = self.arena.record(object).class;
        let meta = self.registry.class(class);
        let table = meta.table_name.clone();
        let identity_kind = meta.identity;
        let layout = self.layout(class)?;

        let sheet = doc.sheet(&table).ok_or_else(|| StoreError::NotFound {
            sheet: table.clone(),
            identity: self.describe(object),
        })?;
        let source = locate_source(identity_kind);
        let index = locate::find_row(sheet, &self.arena, &self.registry, &layout, object, source)?;

        doc.sheet_mut(&table)
            .map(|sheet| sheet.remove_row(index))
            .unwrap_or(false);

        if identity_kind != IdentityKind::Nondurable {
            let identity = self.arena.portable_identity(&self.registry, object)?;
            self.arena.unbind_identity(class, &identity);
        }
        let record = self.arena.record_mut(object);
        record.persisted = false;
        record.snapshot = None;
        debug!("deleted row {index} from sheet {table}");
        Ok(())
    }

    /// Load the requested fields of a persisted object from its row.
    pub fn fetch(&mut self, doc: &Document, object: ObjectId, fields: &[usize]) -> Result<()> {
        let class = self.arena.record(object).class;
        let table = self.registry.class(class).table_name.clone();
        let identity_kind = self.registry.class(class).identity;
        let layout = self.layout(class)?;

        let sheet = doc.sheet(&table).ok_or_else(|| StoreError::NotFound {
            sheet: table.clone(),
            identity: self.describe(object),
        })?;
        let source = locate_source(identity_kind);
        let index = locate::find_row(sheet, &self.arena, &self.registry, &layout, object, source)?;
        let row = sheet
            .row(index)
            .cloned()
            .ok_or_else(|| StoreError::Store("located row missing at fetch".into()))?;

        self.decode_row_into(doc, &table, &row, &layout, object, fields)
    }

    /// Whether the object currently has a row.
    pub fn exists(&mut self, doc: &Document, object: ObjectId) -> Result<bool> {
        let class = self.arena.record(object).class;
        let table = self.registry.class(class).table_name.clone();
        let identity_kind = self.registry.class(class).identity;
        let layout = self.layout(class)?;

        let Some(sheet) = doc.sheet(&table) else {
            return Ok(false);
        };
        let source = locate_source(identity_kind);
        match locate::find_row(sheet, &self.arena, &self.registry, &layout, object, source) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }

    /// Materialize every data row of the class's sheet (and, when asked,
    /// its subclass sheets) as decoded objects for in-memory query
    /// evaluation.
    pub fn candidates(
        &mut self,
        doc: &Document,
        class: ClassId,
        include_subclasses: bool,
    ) -> Result<Vec<ObjectId>> {
        let mut classes = vec![class];
        if include_subclasses {
            classes.extend(self.registry.class(class).subclasses.iter().copied());
        }

        let mut out = Vec::new();
        for candidate_class in classes {
            let layout = self.layout(candidate_class)?;
            let meta = self.registry.class(candidate_class);
            let table = meta.table_name.clone();
            let identity_kind = meta.identity;
            let pk_ordinals = meta.pk_ordinals();
            let ordinals = meta.persistent_ordinals();

            let Some(sheet) = doc.sheet(&table) else {
                continue;
            };
            let indices: Vec<usize> = sheet.data_rows().map(|(index, _)| index).collect();
            for index in indices {
                let row = sheet
                    .row(index)
                    .cloned()
                    .ok_or_else(|| StoreError::Store("data row vanished mid-scan".into()))?;
                let object = match identity_kind {
                    IdentityKind::Datastore => {
                        let position = layout.datastore_id_position().ok_or_else(|| {
                            StoreError::Store(format!("sheet {table} lacks a surrogate id column"))
                        })?;
                        let key = match row.cell(position) {
                            Some(cell) if cell.number().is_some() => {
                                Key::Int(cell.number().unwrap_or_default() as i64)
                            }
                            Some(cell) if cell.string().is_some() => {
                                Key::Str(cell.string().unwrap_or_default().to_string())
                            }
                            _ => {
                                warn!("row {index} of {table} has no surrogate key; skipping");
                                continue;
                            }
                        };
                        self.arena
                            .find_or_create_datastore(&self.registry, candidate_class, key)
                    }
                    IdentityKind::Application => {
                        let mut pk_values = Vec::with_capacity(pk_ordinals.len());
                        for &ordinal in &pk_ordinals {
                            let field = self.registry.class(candidate_class).fields[ordinal].clone();
                            let value = codec::decode_scalar(
                                row.cell(layout.position(ordinal)),
                                &field.field_type,
                                field.enum_as_ordinal,
                            )?;
                            pk_values.push((ordinal, value));
                        }
                        self.arena
                            .find_or_create_application(&self.registry, candidate_class, pk_values)?
                    }
                    IdentityKind::Nondurable => {
                        self.arena.create_nondurable(&self.registry, candidate_class)
                    }
                };
                self.decode_row_into(doc, &table, &row, &layout, object, &ordinals)?;
                out.push(object);
            }
        }
        Ok(out)
    }

    // ---- write path ----

    /// Reduce the given fields of `object` to scalar column writes,
    /// cascading persists of reachable unpersisted references.
    fn stage_fields(
        &mut self,
        doc: &mut Document,
        object: ObjectId,
        ordinals: &[usize],
    ) -> Result<Vec<StagedCell>> {
        let class = self.arena.record(object).class;
        let layout = self.layout(class)?;
        let mut staged = Vec::new();
        for &ordinal in ordinals {
            let field = self.registry.class(class).fields[ordinal].clone();
            if !field.persistent {
                continue;
            }
            if let Relation::One { embedded: true, .. } = field.relation {
                let leaves = embed::write_leaves(&mut self.arena, &self.registry, object, ordinal)?;
                for leaf in leaves {
                    let Some(positions) = layout.embedded_positions(&leaf.path) else {
                        continue;
                    };
                    let positions = positions.to_vec();
                    let value = match leaf.object {
                        Some(id) => self.arena.field(id, leaf.ordinal).clone(),
                        None => Value::Null,
                    };
                    self.stage_one(doc, &leaf.field, &positions, value, &mut staged)?;
                }
            } else {
                let positions = layout.positions(ordinal).to_vec();
                let value = self.arena.field(object, ordinal).clone();
                self.stage_one(doc, &field, &positions, value, &mut staged)?;
            }
        }
        Ok(staged)
    }

    fn stage_one(
        &mut self,
        doc: &mut Document,
        field: &FieldMeta,
        positions: &[usize],
        value: Value,
        staged: &mut Vec<StagedCell>,
    ) -> Result<()> {
        match &field.relation {
            Relation::None => match &field.field_type {
                FieldType::Custom(name) => {
                    let converter = self.converters.get(name)?;
                    let columns = converter.columns().to_vec();
                    let parts = converter.encode(&value)?;
                    if parts.len() != positions.len() || columns.len() != positions.len() {
                        return Err(StoreError::Store(format!(
                            "converter {name} produced {} parts for {} columns",
                            parts.len(),
                            positions.len()
                        )));
                    }
                    for ((position, column_type), part) in
                        positions.iter().zip(columns).zip(parts)
                    {
                        staged.push(StagedCell {
                            position: *position,
                            field_type: column_type,
                            enum_as_ordinal: false,
                            value: part,
                        });
                    }
                }
                _ => staged.push(StagedCell {
                    position: positions[0],
                    field_type: field.field_type.clone(),
                    enum_as_ordinal: field.enum_as_ordinal,
                    value,
                }),
            },
            Relation::One { embedded: true, .. } => {
                return Err(StoreError::Store(format!(
                    "embedded member {} reached scalar staging",
                    field.name
                )));
            }
            Relation::One { embedded: false, .. } => {
                let literal = match value {
                    Value::Null => Value::Null,
                    Value::Ref(target) => {
                        self.ensure_persisted(doc, target)?;
                        Value::Str(relation::encode_single(&self.arena, &self.registry, target)?)
                    }
                    other => {
                        warn!(
                            "reference field {} holds non-reference value {other:?}; skipping",
                            field.name
                        );
                        Value::Null
                    }
                };
                staged.push(string_cell(positions[0], literal));
            }
            Relation::Collection { embedded: true, .. }
            | Relation::Array { embedded: true, .. }
            | Relation::Map { embedded: true, .. } => {
                return Err(StoreError::EmbeddedMultiValued {
                    field: field.name.clone(),
                });
            }
            Relation::Collection { embedded: false, .. } | Relation::Array { embedded: false, .. } => {
                let literal = match value {
                    Value::Null => Value::Null,
                    Value::List(items) => {
                        let mut ids = Vec::with_capacity(items.len());
                        for item in items {
                            match item {
                                Value::Ref(target) => {
                                    self.ensure_persisted(doc, target)?;
                                    ids.push(target);
                                }
                                other => warn!(
                                    "element {other:?} of {} is not a reference; skipping",
                                    field.name
                                ),
                            }
                        }
                        Value::Str(relation::encode_elements(&self.arena, &self.registry, &ids)?)
                    }
                    other => {
                        warn!(
                            "multi-valued field {} holds non-list value {other:?}; skipping",
                            field.name
                        );
                        Value::Null
                    }
                };
                staged.push(string_cell(positions[0], literal));
            }
            Relation::Map {
                key,
                value: value_component,
                embedded: false,
            } => {
                let literal = match value {
                    Value::Null => Value::Null,
                    Value::Map(entries) => {
                        for (k, v) in &entries {
                            if let Value::Ref(target) = k {
                                self.ensure_persisted(doc, *target)?;
                            }
                            if let Value::Ref(target) = v {
                                self.ensure_persisted(doc, *target)?;
                            }
                        }
                        Value::Str(relation::encode_map(
                            &self.arena,
                            &self.registry,
                            &field.name,
                            key,
                            value_component,
                            &entries,
                        )?)
                    }
                    other => {
                        warn!(
                            "map field {} holds non-map value {other:?}; skipping",
                            field.name
                        );
                        Value::Null
                    }
                };
                staged.push(string_cell(positions[0], literal));
            }
        }
        Ok(())
    }

    fn ensure_persisted(&mut self, doc: &mut Document, target: ObjectId) -> Result<()> {
        if !self.arena.record(target).persisted {
            self.insert(doc, target)?;
        }
        Ok(())
    }

    // ---- read path ----

    fn decode_row_into(
        &mut self,
        doc: &Document,
        sheet_name: &str,
        row: &Row,
        layout: &ColumnLayout,
        object: ObjectId,
        ordinals: &[usize],
    ) -> Result<()> {
        let class = self.arena.record(object).class;
        for &ordinal in ordinals {
            let field = self.registry.class(class).fields[ordinal].clone();
            if !field.persistent {
                continue;
            }
            if let Relation::One { embedded: true, .. } = field.relation {
                let leaves = embed::build_tree(&mut self.arena, &self.registry, object, ordinal)?;
                for leaf in leaves {
                    let Some(positions) = layout.embedded_positions(&leaf.path) else {
                        continue;
                    };
                    let positions = positions.to_vec();
                    let value =
                        self.decode_one(doc, sheet_name, &leaf.field, &positions, row, object)?;
                    if let Some(target) = leaf.object {
                        self.arena.set_field(target, leaf.ordinal, value);
                    }
                }
            } else {
                let positions = layout.positions(ordinal).to_vec();
                let value = self.decode_one(doc, sheet_name, &field, &positions, row, object)?;
                self.arena.set_field(object, ordinal, value);
            }
        }

        let version_spec = self.registry.class(class).version.clone();
        if let (Some(spec), Some(position)) = (&version_spec, layout.version_position()) {
            let stamp = codec::decode_scalar(
                row.cell(position),
                &version::value_type(spec.strategy),
                false,
            )?;
            self.arena.record_mut(object).version =
                (!stamp.is_null()).then_some(stamp);
        }
        Ok(())
    }

    fn decode_one(
        &mut self,
        doc: &Document,
        sheet_name: &str,
        field: &FieldMeta,
        positions: &[usize],
        row: &Row,
        owner: ObjectId,
    ) -> Result<Value> {
        match &field.relation {
            Relation::None => match &field.field_type {
                FieldType::Custom(name) => {
                    let columns = self.converters.get(name)?.columns().to_vec();
                    let mut parts = Vec::with_capacity(positions.len());
                    for (position, column_type) in positions.iter().zip(&columns) {
                        parts.push(codec::decode_scalar(row.cell(*position), column_type, false)?);
                    }
                    if parts.iter().all(Value::is_null) {
                        return Ok(Value::Null);
                    }
                    self.converters.get(name)?.decode(&parts)
                }
                ty => codec::decode_scalar(row.cell(positions[0]), ty, field.enum_as_ordinal),
            },
            Relation::One { embedded: true, .. } => Err(StoreError::Store(format!(
                "embedded member {} reached scalar decoding",
                field.name
            ))),
            Relation::One { embedded: false, .. } => {
                let Some(text) = cell_text(row, positions[0]) else {
                    return Ok(Value::Null);
                };
                let mut resolver = |identity: &str| self.resolve_identity(doc, identity);
                match relation::decode_single(&mut resolver, sheet_name, &text, true)? {
                    Some(id) => Ok(Value::Ref(id)),
                    None => Ok(Value::Null),
                }
            }
            Relation::Collection {
                element,
                embedded: false,
                ordering,
            } => {
                let Some(text) = cell_text(row, positions[0]) else {
                    return Ok(Value::Null);
                };
                let decoded = {
                    let mut resolver = |identity: &str| self.resolve_identity(doc, identity);
                    relation::decode_elements(&mut resolver, &text)?
                };
                if decoded.dropped {
                    self.arena.mark_dirty(owner);
                }
                let mut elements = decoded.elements;
                if let Some(ordering) = ordering {
                    self.hydrate_ordering_fields(doc, *element, ordering, &elements)?;
                    relation::sort_by_ordering(
                        &self.arena,
                        &self.registry,
                        *element,
                        ordering,
                        &mut elements,
                    );
                }
                Ok(Value::List(elements.into_iter().map(Value::Ref).collect()))
            }
            Relation::Array { embedded: false, .. } => {
                let Some(text) = cell_text(row, positions[0]) else {
                    return Ok(Value::Null);
                };
                let decoded = {
                    let mut resolver = |identity: &str| self.resolve_identity(doc, identity);
                    relation::decode_elements(&mut resolver, &text)?
                };
                if decoded.dropped {
                    self.arena.mark_dirty(owner);
                }
                Ok(Value::List(
                    decoded.elements.into_iter().map(Value::Ref).collect(),
                ))
            }
            Relation::Map {
                key,
                value: value_component,
                embedded: false,
            } => {
                let Some(text) = cell_text(row, positions[0]) else {
                    return Ok(Value::Null);
                };
                let decoded = {
                    let mut resolver = |identity: &str| self.resolve_identity(doc, identity);
                    relation::decode_map(&mut resolver, &field.name, key, value_component, &text)?
                };
                if decoded.dropped {
                    self.arena.mark_dirty(owner);
                }
                Ok(Value::Map(decoded.entries))
            }
            // Multi-valued embedded members have no columns; reads yield
            // null without complaint (writes reject them).
            Relation::Collection { embedded: true, .. }
            | Relation::Array { embedded: true, .. }
            | Relation::Map { embedded: true, .. } => Ok(Value::Null),
        }
    }

    /// Resolve a portable identity to a live object, checking that its row
    /// still exists. `None` means the reference is stale.
    fn resolve_identity(&mut self, doc: &Document, identity: &str) -> Result<Option<ObjectId>> {
        match relation::parse_identity(&self.registry, identity)? {
            ParsedIdentity::Datastore(class, key) => {
                let layout = self.layout(class)?;
                let table = self.registry.class(class).table_name.clone();
                let Some(sheet) = doc.sheet(&table) else {
                    return Ok(None);
                };
                let position = layout.datastore_id_position().ok_or_else(|| {
                    StoreError::Store(format!("sheet {table} lacks a surrogate id column"))
                })?;
                let probe = match &key {
                    Key::Int(n) => Value::Int(*n),
                    Key::Str(s) => Value::Str(s.clone()),
                };
                if locate::row_matching(sheet, &[(position, probe)]).is_none() {
                    return Ok(None);
                }
                Ok(Some(self.arena.find_or_create_datastore(
                    &self.registry,
                    class,
                    key,
                )))
            }
            ParsedIdentity::Application(class, pk_values) => {
                let layout = self.layout(class)?;
                let table = self.registry.class(class).table_name.clone();
                let Some(sheet) = doc.sheet(&table) else {
                    return Ok(None);
                };
                let mut checks = Vec::with_capacity(pk_values.len());
                for (ordinal, value) in &pk_values {
                    let field = &self.registry.class(class).fields[*ordinal];
                    checks.push((layout.position(*ordinal), locate::comparable(field, value)));
                }
                if locate::row_matching(sheet, &checks).is_none() {
                    return Ok(None);
                }
                Ok(Some(self.arena.find_or_create_application(
                    &self.registry,
                    class,
                    pk_values,
                )?))
            }
        }
    }

    /// Load the scalar fields an ordering clause names into resolved list
    /// elements. Resolution populates only key fields, so without this pass
    /// a clause over a non-key field would compare nulls and leave the
    /// stored order in place.
    fn hydrate_ordering_fields(
        &mut self,
        doc: &Document,
        class: ClassId,
        ordering: &str,
        elements: &[ObjectId],
    ) -> Result<()> {
        let ordinals = relation::ordering_ordinals(self.registry.class(class), ordering);
        if ordinals.is_empty() {
            return Ok(());
        }
        let layout = self.layout(class)?;
        let table = self.registry.class(class).table_name.clone();
        let Some(sheet) = doc.sheet(&table) else {
            return Ok(());
        };
        for &element in elements {
            let index = match locate::find_row(
                sheet,
                &self.arena,
                &self.registry,
                &layout,
                element,
                ValueSource::Current,
            ) {
                Ok(index) => index,
                // Resolution just confirmed the row; a miss here means an
                // out-of-band removal and the element stays key-only.
                Err(StoreError::NotFound { .. }) => continue,
                Err(err) => return Err(err),
            };
            let Some(row) = sheet.row(index) else {
                continue;
            };
            for &ordinal in &ordinals {
                let field = &self.registry.class(class).fields[ordinal];
                if !matches!(field.relation, Relation::None)
                    || matches!(field.field_type, FieldType::Custom(_))
                {
                    continue;
                }
                let value = codec::decode_scalar(
                    row.cell(layout.position(ordinal)),
                    &field.field_type,
                    field.enum_as_ordinal,
                )?;
                self.arena.set_field(element, ordinal, value);
            }
        }
        Ok(())
    }

    fn describe(&self, object: ObjectId) -> String {
        let class = self.arena.record(object).class;
        self.arena
            .portable_identity(&self.registry, object)
            .unwrap_or_else(|_| format!("(nondurable {})", self.registry.class(class).name))
    }
}

/// Locate by snapshot values for nondurable classes, whose rows can only be
/// matched against what was stored before in-memory mutation.
fn locate_source(identity: IdentityKind) -> ValueSource {
    match identity {
        IdentityKind::Nondurable => ValueSource::Original,
        _ => ValueSource::Current,
    }
}

fn string_cell(position: usize, value: Value) -> StagedCell {
    StagedCell {
        position,
        field_type: FieldType::String,
        enum_as_ordinal: false,
        value,
    }
}

fn cell_text(row: &Row, position: usize) -> Option<String> {
    row.cell(position)
        .and_then(|cell| cell.string())
        .map(str::to_string)
}

fn apply_staged(row: &mut Row, staged: &[StagedCell]) {
    for cell in staged {
        codec::encode_scalar(
            row.cell_mut(cell.position),
            &cell.field_type,
            cell.enum_as_ordinal,
            &cell.value,
        );
    }
}
