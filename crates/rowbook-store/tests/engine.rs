//! End-to-end mapping behavior over an in-memory document: one store
//! writes, a second store with identical metadata reads the same document
//! back, the way separate logical connections would.

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rowbook_model::Document;
use rowbook_store::{
    CellConverter, ClassId, ClassMeta, ColumnLayout, ConverterRegistry, EnumType, FieldMeta,
    FieldType, IdentityKind, MapComponent, MetaRegistry, Relation, Result, SheetStore, StoreError,
    Value, VersionSpec, VersionStrategy,
};

fn person_registry() -> (MetaRegistry, ClassId) {
    let mut registry = MetaRegistry::new();
    let grade = EnumType::new("Grade", vec!["A".into(), "B".into(), "C".into()]);
    let person = registry.register(ClassMeta::new(
        "Person",
        IdentityKind::Application,
        vec![
            FieldMeta::scalar("id", FieldType::I64).pk(),
            FieldMeta::scalar("name", FieldType::String),
            FieldMeta::scalar("score", FieldType::F64),
            FieldMeta::scalar("active", FieldType::Bool),
            FieldMeta::scalar("joined", FieldType::Date),
            FieldMeta::scalar("avatar", FieldType::Bytes),
            FieldMeta::scalar("grade", FieldType::Enum(grade)),
        ],
    ));
    (registry, person)
}

fn sample_person(store: &mut SheetStore, person: ClassId, id: i64, name: &str) -> rowbook_store::ObjectId {
    store.new_object(
        person,
        vec![
            Value::Int(id),
            Value::Str(name.into()),
            Value::Real(7.5),
            Value::Bool(true),
            Value::Date(NaiveDate::from_ymd_opt(2023, 5, 17).unwrap()),
            Value::Bytes(vec![0xde, 0xad]),
            Value::Enum("B".into()),
        ],
    )
}

#[test]
fn scalar_fields_round_trip_through_the_document() {
    let (registry, person) = person_registry();
    let mut writer = SheetStore::new(registry);
    let mut doc = Document::new();
    let object = sample_person(&mut writer, person, 1, "ada");
    writer.insert(&mut doc, object).unwrap();

    let (registry, person) = person_registry();
    let mut reader = SheetStore::new(registry);
    let loaded = reader.candidates(&doc, person, false).unwrap();
    assert_eq!(loaded.len(), 1);
    let id = loaded[0];
    assert_eq!(reader.arena().field(id, 0), &Value::Int(1));
    assert_eq!(reader.arena().field(id, 1), &Value::Str("ada".into()));
    assert_eq!(reader.arena().field(id, 2), &Value::Real(7.5));
    assert_eq!(reader.arena().field(id, 3), &Value::Bool(true));
    assert_eq!(
        reader.arena().field(id, 4),
        &Value::Date(NaiveDate::from_ymd_opt(2023, 5, 17).unwrap())
    );
    assert_eq!(reader.arena().field(id, 5), &Value::Bytes(vec![0xde, 0xad]));
    assert_eq!(reader.arena().field(id, 6), &Value::Enum("B".into()));
}

#[test]
fn null_fields_stay_null() {
    let (registry, person) = person_registry();
    let mut writer = SheetStore::new(registry);
    let mut doc = Document::new();
    let object = writer.new_object(
        person,
        vec![
            Value::Int(2),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ],
    );
    writer.insert(&mut doc, object).unwrap();

    let (registry, person) = person_registry();
    let mut reader = SheetStore::new(registry);
    let loaded = reader.candidates(&doc, person, false).unwrap();
    let id = loaded[0];
    for ordinal in 1..=6 {
        assert_eq!(reader.arena().field(id, ordinal), &Value::Null);
    }
}

#[test]
fn duplicate_identity_is_rejected_without_a_second_row() {
    let (registry, person) = person_registry();
    let mut store = SheetStore::new(registry);
    let mut doc = Document::new();
    let first = sample_person(&mut store, person, 1, "ada");
    store.insert(&mut doc, first).unwrap();

    let second = sample_person(&mut store, person, 1, "impostor");
    let err = store.insert(&mut doc, second).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateIdentity { .. }));
    assert_eq!(doc.sheet("Person").unwrap().data_row_count(), 1);
}

#[test]
fn locate_after_insert_and_delete() {
    let (registry, person) = person_registry();
    let mut store = SheetStore::new(registry);
    let mut doc = Document::new();
    let object = sample_person(&mut store, person, 1, "ada");

    store.insert(&mut doc, object).unwrap();
    assert!(store.exists(&doc, object).unwrap());
    assert_eq!(doc.sheet("Person").unwrap().data_row_count(), 1);

    store.delete(&mut doc, object).unwrap();
    assert!(!store.exists(&doc, object).unwrap());
    assert_eq!(doc.sheet("Person").unwrap().data_row_count(), 0);
    assert!(matches!(
        store.fetch(&doc, object, &[1]),
        Err(StoreError::NotFound { .. })
    ));
}

#[test]
fn sequential_versions_advance_one_two_three_four() {
    let mut registry = MetaRegistry::new();
    let class = registry.register(
        ClassMeta::new(
            "Versioned",
            IdentityKind::Application,
            vec![
                FieldMeta::scalar("id", FieldType::I64).pk(),
                FieldMeta::scalar("body", FieldType::String),
            ],
        )
        .with_version(VersionSpec {
            strategy: VersionStrategy::Sequential,
            field: None,
        }),
    );
    let mut store = SheetStore::new(registry);
    let mut doc = Document::new();
    let object = store.new_object(class, vec![Value::Int(1), Value::Str("a".into())]);

    store.insert(&mut doc, object).unwrap();
    assert_eq!(store.arena().record(object).version, Some(Value::Int(1)));

    for expected in [2i64, 3, 4] {
        store.arena_mut().set_field(object, 1, Value::Str(format!("v{expected}")));
        store.update(&mut doc, object, &[1]).unwrap();
        assert_eq!(
            store.arena().record(object).version,
            Some(Value::Int(expected))
        );
    }

    // The surrogate version column carries the final stamp.
    let layout = ColumnLayout::build(store.registry(), class, &ConverterRegistry::new()).unwrap();
    let sheet = doc.sheet("Versioned").unwrap();
    let (_, row) = sheet.data_rows().next().unwrap();
    let position = layout.version_position().unwrap();
    assert_eq!(row.cell(position).and_then(|c| c.number()), Some(4.0));
}

fn team_registry() -> (MetaRegistry, ClassId, ClassId) {
    let (mut registry, person) = person_registry();
    let mut members = FieldMeta::scalar("members", FieldType::Object);
    members.relation = Relation::Collection {
        element: person,
        embedded: false,
        ordering: None,
    };
    let team = registry.register(ClassMeta::new(
        "Team",
        IdentityKind::Application,
        vec![FieldMeta::scalar("id", FieldType::I64).pk(), members],
    ));
    (registry, person, team)
}

#[test]
fn collection_encodes_a_comma_joined_literal_and_round_trips() {
    let (registry, person, team) = team_registry();
    let mut writer = SheetStore::new(registry);
    let mut doc = Document::new();
    let a = sample_person(&mut writer, person, 1, "a");
    let b = sample_person(&mut writer, person, 2, "b");
    let squad = writer.new_object(
        team,
        vec![Value::Int(10), Value::List(vec![Value::Ref(a), Value::Ref(b)])],
    );
    // Members were never inserted explicitly; the insert cascades.
    writer.insert(&mut doc, squad).unwrap();
    assert_eq!(doc.sheet("Person").unwrap().data_row_count(), 2);

    let sheet = doc.sheet("Team").unwrap();
    let (_, row) = sheet.data_rows().next().unwrap();
    assert_eq!(
        row.cell(1).and_then(|c| c.string()),
        Some("[Person:1,Person:2]")
    );

    let (registry, _person, team) = team_registry();
    let mut reader = SheetStore::new(registry);
    let loaded = reader.candidates(&doc, team, false).unwrap();
    let squad = loaded[0];
    let Value::List(members) = reader.arena().field(squad, 1).clone() else {
        panic!("members did not decode as a list");
    };
    assert_eq!(members.len(), 2);
    let first = members[0].as_ref_id().unwrap();
    let second = members[1].as_ref_id().unwrap();
    assert_eq!(reader.arena().field(first, 0), &Value::Int(1));
    assert_eq!(reader.arena().field(second, 0), &Value::Int(2));
}

#[test]
fn stale_collection_reference_is_dropped_and_owner_marked_dirty() {
    let (registry, person, team) = team_registry();
    let mut writer = SheetStore::new(registry);
    let mut doc = Document::new();
    let a = sample_person(&mut writer, person, 1, "a");
    let b = sample_person(&mut writer, person, 2, "b");
    let squad = writer.new_object(
        team,
        vec![Value::Int(10), Value::List(vec![Value::Ref(a), Value::Ref(b)])],
    );
    writer.insert(&mut doc, squad).unwrap();
    // Out-of-band delete of member b leaves a stale id in the literal.
    writer.delete(&mut doc, b).unwrap();

    let (registry, _person, team) = team_registry();
    let mut reader = SheetStore::new(registry);
    let loaded = reader.candidates(&doc, team, false).unwrap();
    let squad = loaded[0];
    let Value::List(members) = reader.arena().field(squad, 1).clone() else {
        panic!("members did not decode as a list");
    };
    assert_eq!(members.len(), 1);
    let survivor = members[0].as_ref_id().unwrap();
    assert_eq!(reader.arena().field(survivor, 0), &Value::Int(1));
    assert!(reader.arena().is_dirty(squad));
}

#[test]
fn ordered_collections_resort_on_decode() {
    let (mut registry, person) = person_registry();
    let mut members = FieldMeta::scalar("members", FieldType::Object);
    members.relation = Relation::Collection {
        element: person,
        embedded: false,
        ordering: Some("id asc".into()),
    };
    let team = registry.register(ClassMeta::new(
        "Team",
        IdentityKind::Application,
        vec![FieldMeta::scalar("id", FieldType::I64).pk(), members],
    ));

    let mut writer = SheetStore::new(registry);
    let mut doc = Document::new();
    let a = sample_person(&mut writer, person, 1, "a");
    let b = sample_person(&mut writer, person, 2, "b");
    // Stored out of order on purpose.
    let squad = writer.new_object(
        team,
        vec![Value::Int(10), Value::List(vec![Value::Ref(b), Value::Ref(a)])],
    );
    writer.insert(&mut doc, squad).unwrap();

    let (mut registry, _) = person_registry();
    let person2 = registry.class_by_name("Person").unwrap();
    let mut members = FieldMeta::scalar("members", FieldType::Object);
    members.relation = Relation::Collection {
        element: person2,
        embedded: false,
        ordering: Some("id asc".into()),
    };
    let team = registry.register(ClassMeta::new(
        "Team",
        IdentityKind::Application,
        vec![FieldMeta::scalar("id", FieldType::I64).pk(), members],
    ));
    let mut reader = SheetStore::new(registry);
    let loaded = reader.candidates(&doc, team, false).unwrap();
    let Value::List(members) = reader.arena().field(loaded[0], 1).clone() else {
        panic!("members did not decode as a list");
    };
    let ids: Vec<i64> = members
        .iter()
        .map(|m| {
            reader
                .arena()
                .field(m.as_ref_id().unwrap(), 0)
                .as_int()
                .unwrap()
        })
        .collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn ordering_by_a_non_key_field_loads_it_before_sorting() {
    fn registry_with_team() -> (MetaRegistry, ClassId, ClassId) {
        let (mut registry, person) = person_registry();
        let mut members = FieldMeta::scalar("members", FieldType::Object);
        members.relation = Relation::Collection {
            element: person,
            embedded: false,
            ordering: Some("name desc".into()),
        };
        let team = registry.register(ClassMeta::new(
            "Team",
            IdentityKind::Application,
            vec![FieldMeta::scalar("id", FieldType::I64).pk(), members],
        ));
        (registry, person, team)
    }

    let (registry, person, team) = registry_with_team();
    let mut writer = SheetStore::new(registry);
    let mut doc = Document::new();
    let a = sample_person(&mut writer, person, 1, "alpha");
    let z = sample_person(&mut writer, person, 2, "zulu");
    // Stored ascending; the clause demands descending by name, which only
    // the members' rows know (name is not part of their identity).
    let squad = writer.new_object(
        team,
        vec![Value::Int(10), Value::List(vec![Value::Ref(a), Value::Ref(z)])],
    );
    writer.insert(&mut doc, squad).unwrap();

    let (registry, _, team) = registry_with_team();
    let mut reader = SheetStore::new(registry);
    let loaded = reader.candidates(&doc, team, false).unwrap();
    let Value::List(members) = reader.arena().field(loaded[0], 1).clone() else {
        panic!("members did not decode as a list");
    };
    let names: Vec<Value> = members
        .iter()
        .map(|m| reader.arena().field(m.as_ref_id().unwrap(), 1).clone())
        .collect();
    assert_eq!(
        names,
        vec![Value::Str("zulu".into()), Value::Str("alpha".into())]
    );
}

fn lookup_registry() -> (MetaRegistry, ClassId, ClassId, ClassId) {
    let mut registry = MetaRegistry::new();
    let word = registry.register(ClassMeta::new(
        "Word",
        IdentityKind::Application,
        vec![FieldMeta::scalar("text", FieldType::String).pk()],
    ));
    let meaning = registry.register(ClassMeta::new(
        "Meaning",
        IdentityKind::Application,
        vec![FieldMeta::scalar("text", FieldType::String).pk()],
    ));
    let mut entries = FieldMeta::scalar("entries", FieldType::Object);
    entries.relation = Relation::Map {
        key: MapComponent::Class(word),
        value: MapComponent::Class(meaning),
        embedded: false,
    };
    let lexicon = registry.register(ClassMeta::new(
        "Lexicon",
        IdentityKind::Application,
        vec![FieldMeta::scalar("id", FieldType::I64).pk(), entries],
    ));
    (registry, word, meaning, lexicon)
}

#[test]
fn map_encodes_alternating_bracket_groups_and_round_trips() {
    let (registry, word, meaning, lexicon) = lookup_registry();
    let mut writer = SheetStore::new(registry);
    let mut doc = Document::new();
    let k = writer.new_object(word, vec![Value::Str("k1".into())]);
    let v = writer.new_object(meaning, vec![Value::Str("v1".into())]);
    let lex = writer.new_object(
        lexicon,
        vec![Value::Int(1), Value::Map(vec![(Value::Ref(k), Value::Ref(v))])],
    );
    writer.insert(&mut doc, lex).unwrap();

    let (_, row) = doc.sheet("Lexicon").unwrap().data_rows().next().unwrap();
    assert_eq!(
        row.cell(1).and_then(|c| c.string()),
        Some("[[Word:k1],[Meaning:v1]]")
    );

    let (registry, _, _, lexicon) = lookup_registry();
    let mut reader = SheetStore::new(registry);
    let loaded = reader.candidates(&doc, lexicon, false).unwrap();
    let Value::Map(entries) = reader.arena().field(loaded[0], 1).clone() else {
        panic!("entries did not decode as a map");
    };
    assert_eq!(entries.len(), 1);
    let (key, value) = &entries[0];
    assert_eq!(
        reader.arena().field(key.as_ref_id().unwrap(), 0),
        &Value::Str("k1".into())
    );
    assert_eq!(
        reader.arena().field(value.as_ref_id().unwrap(), 0),
        &Value::Str("v1".into())
    );
}

fn shape_registry() -> (MetaRegistry, ClassId, ClassId) {
    let mut registry = MetaRegistry::new();
    let point = registry.register(ClassMeta::new(
        "Point",
        IdentityKind::Nondurable,
        vec![
            FieldMeta::scalar("x", FieldType::I64),
            FieldMeta::scalar("y", FieldType::I64),
        ],
    ));
    let shape = registry.register(ClassMeta::new(
        "Shape",
        IdentityKind::Application,
        vec![
            FieldMeta::scalar("id", FieldType::I64).pk(),
            FieldMeta::embedded("origin", point, None),
            FieldMeta::embedded("extent", point, None),
        ],
    ));
    (registry, point, shape)
}

#[test]
fn embedded_members_flatten_into_distinct_columns() {
    let (registry, point, shape) = shape_registry();
    let mut writer = SheetStore::new(registry);
    let mut doc = Document::new();
    let origin = writer.new_object(point, vec![Value::Int(1), Value::Int(2)]);
    let extent = writer.new_object(point, vec![Value::Int(30), Value::Int(40)]);
    let object = writer.new_object(
        shape,
        vec![Value::Int(7), Value::Ref(origin), Value::Ref(extent)],
    );
    writer.insert(&mut doc, object).unwrap();

    let (_, row) = doc.sheet("Shape").unwrap().data_rows().next().unwrap();
    let numbers: Vec<Option<f64>> = (0..5).map(|i| row.cell(i).and_then(|c| c.number())).collect();
    assert_eq!(
        numbers,
        vec![Some(7.0), Some(1.0), Some(2.0), Some(30.0), Some(40.0)]
    );

    let (registry, _point, shape) = shape_registry();
    let mut reader = SheetStore::new(registry);
    let loaded = reader.candidates(&doc, shape, false).unwrap();
    let object = loaded[0];
    let origin = reader.arena().field(object, 1).as_ref_id().unwrap();
    let extent = reader.arena().field(object, 2).as_ref_id().unwrap();
    assert_eq!(reader.arena().field(origin, 0), &Value::Int(1));
    assert_eq!(reader.arena().field(origin, 1), &Value::Int(2));
    assert_eq!(reader.arena().field(extent, 0), &Value::Int(30));
    assert_eq!(reader.arena().field(extent, 1), &Value::Int(40));
}

#[test]
fn embedded_owner_backref_is_populated_on_read() {
    let mut registry = MetaRegistry::new();
    let engine = registry.register(ClassMeta::new(
        "Engine",
        IdentityKind::Nondurable,
        vec![
            FieldMeta::scalar("car", FieldType::Object),
            FieldMeta::scalar("power", FieldType::I64),
        ],
    ));
    let car = registry.register(ClassMeta::new(
        "Car",
        IdentityKind::Application,
        vec![
            FieldMeta::scalar("id", FieldType::I64).pk(),
            FieldMeta::embedded("engine", engine, Some(0)),
        ],
    ));
    let mut writer = SheetStore::new(registry);
    let mut doc = Document::new();
    let e = writer.new_object(engine, vec![Value::Null, Value::Int(90)]);
    let c = writer.new_object(car, vec![Value::Int(1), Value::Ref(e)]);
    writer.insert(&mut doc, c).unwrap();

    // The back-reference consumed no column: id + power only.
    let (_, row) = doc.sheet("Car").unwrap().data_rows().next().unwrap();
    assert_eq!(row.cell(1).and_then(|cell| cell.number()), Some(90.0));

    let mut registry = MetaRegistry::new();
    let engine = registry.register(ClassMeta::new(
        "Engine",
        IdentityKind::Nondurable,
        vec![
            FieldMeta::scalar("car", FieldType::Object),
            FieldMeta::scalar("power", FieldType::I64),
        ],
    ));
    let car2 = registry.register(ClassMeta::new(
        "Car",
        IdentityKind::Application,
        vec![
            FieldMeta::scalar("id", FieldType::I64).pk(),
            FieldMeta::embedded("engine", engine, Some(0)),
        ],
    ));
    let mut reader = SheetStore::new(registry);
    let loaded = reader.candidates(&doc, car2, false).unwrap();
    let c = loaded[0];
    let e = reader.arena().field(c, 1).as_ref_id().unwrap();
    assert_eq!(reader.arena().field(e, 0), &Value::Ref(c));
    assert_eq!(reader.arena().field(e, 1), &Value::Int(90));
}

#[test]
fn header_row_is_invisible_to_data_operations() {
    let (registry, person) = person_registry();
    let mut store = SheetStore::new(registry);
    let mut doc = Document::new();
    for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
        let object = sample_person(&mut store, person, id, name);
        store.insert(&mut doc, object).unwrap();
    }

    let sheet = doc.sheet("Person").unwrap();
    assert_eq!(sheet.row_count(), 4);
    assert_eq!(sheet.data_row_count(), 3);

    let (registry, person) = person_registry();
    let mut reader = SheetStore::new(registry);
    assert_eq!(reader.candidates(&doc, person, false).unwrap().len(), 3);
}

#[test]
fn datastore_identity_draws_surrogate_keys_from_the_generator() {
    let mut registry = MetaRegistry::new();
    let class = registry.register(ClassMeta::new(
        "Note",
        IdentityKind::Datastore,
        vec![FieldMeta::scalar("body", FieldType::String)],
    ));
    let mut store = SheetStore::new(registry);
    let mut doc = Document::new();
    let first = store.new_object(class, vec![Value::Str("one".into())]);
    let second = store.new_object(class, vec![Value::Str("two".into())]);
    store.insert(&mut doc, first).unwrap();
    store.insert(&mut doc, second).unwrap();

    let layout = ColumnLayout::build(store.registry(), class, &ConverterRegistry::new()).unwrap();
    let position = layout.datastore_id_position().unwrap();
    let keys: Vec<f64> = doc
        .sheet("Note")
        .unwrap()
        .data_rows()
        .filter_map(|(_, row)| row.cell(position).and_then(|c| c.number()))
        .collect();
    assert_eq!(keys, vec![1.0, 2.0]);
    assert!(store.exists(&doc, first).unwrap());
}

#[test]
fn update_rewrites_only_the_changed_cells() {
    let (registry, person) = person_registry();
    let mut store = SheetStore::new(registry);
    let mut doc = Document::new();
    let object = sample_person(&mut store, person, 1, "ada");
    store.insert(&mut doc, object).unwrap();

    store.arena_mut().set_field(object, 1, Value::Str("grace".into()));
    store.update(&mut doc, object, &[1]).unwrap();

    let (_, row) = doc.sheet("Person").unwrap().data_rows().next().unwrap();
    assert_eq!(row.cell(1).and_then(|c| c.string()), Some("grace"));
    assert_eq!(row.cell(2).and_then(|c| c.number()), Some(7.5));
}

#[test]
fn nondurable_updates_locate_by_snapshot() {
    let mut registry = MetaRegistry::new();
    let class = registry.register(ClassMeta::new(
        "Tally",
        IdentityKind::Nondurable,
        vec![
            FieldMeta::scalar("word", FieldType::String),
            FieldMeta::scalar("count", FieldType::I64),
        ],
    ));
    let mut store = SheetStore::new(registry);
    let mut doc = Document::new();
    let object = store.new_object(class, vec![Value::Str("hi".into()), Value::Int(1)]);
    store.insert(&mut doc, object).unwrap();

    store.arena_mut().save_original(object);
    store.arena_mut().set_field(object, 1, Value::Int(2));
    store.update(&mut doc, object, &[1]).unwrap();

    let (_, row) = doc.sheet("Tally").unwrap().data_rows().next().unwrap();
    assert_eq!(row.cell(1).and_then(|c| c.number()), Some(2.0));
}

#[test]
fn subclass_sheets_join_candidate_scans() {
    let mut registry = MetaRegistry::new();
    let base = registry.register(ClassMeta::new(
        "Animal",
        IdentityKind::Application,
        vec![FieldMeta::scalar("id", FieldType::I64).pk()],
    ));
    let sub = registry.register(ClassMeta::new(
        "Dog",
        IdentityKind::Application,
        vec![FieldMeta::scalar("id", FieldType::I64).pk()],
    ));
    registry.add_subclass(base, sub);

    let mut store = SheetStore::new(registry);
    let mut doc = Document::new();
    let a = store.new_object(base, vec![Value::Int(1)]);
    let d = store.new_object(sub, vec![Value::Int(2)]);
    store.insert(&mut doc, a).unwrap();
    store.insert(&mut doc, d).unwrap();

    assert_eq!(store.candidates(&doc, base, false).unwrap().len(), 1);
    assert_eq!(store.candidates(&doc, base, true).unwrap().len(), 2);
}

/// Splits a currency amount like `12.30 EUR` across a number column and a
/// code column.
struct MoneyConverter {
    columns: Vec<FieldType>,
}

impl MoneyConverter {
    fn new() -> Self {
        Self {
            columns: vec![FieldType::F64, FieldType::String],
        }
    }
}

impl CellConverter for MoneyConverter {
    fn columns(&self) -> &[FieldType] {
        &self.columns
    }

    fn encode(&self, value: &Value) -> Result<Vec<Value>> {
        match value {
            Value::Null => Ok(vec![Value::Null, Value::Null]),
            Value::Currency(text) => {
                let (amount, code) = text.split_once(' ').ok_or_else(|| {
                    StoreError::Store(format!("malformed currency literal {text:?}"))
                })?;
                let amount: f64 = amount
                    .parse()
                    .map_err(|e| StoreError::Store(format!("bad currency amount: {e}")))?;
                Ok(vec![Value::Real(amount), Value::Str(code.to_string())])
            }
            other => Err(StoreError::Store(format!(
                "money converter got non-currency value {other:?}"
            ))),
        }
    }

    fn decode(&self, parts: &[Value]) -> Result<Value> {
        match parts {
            [Value::Real(amount), Value::Str(code)] => {
                Ok(Value::Currency(format!("{amount:.2} {code}")))
            }
            _ => Err(StoreError::Store(format!(
                "money converter got mismatched parts {parts:?}"
            ))),
        }
    }
}

#[test]
fn custom_converter_spans_adjacent_columns() {
    let mut registry = MetaRegistry::new();
    let class = registry.register(ClassMeta::new(
        "Invoice",
        IdentityKind::Application,
        vec![
            FieldMeta::scalar("id", FieldType::I64).pk(),
            FieldMeta::scalar("total", FieldType::Custom("money".into())),
        ],
    ));
    let mut writer = SheetStore::new(registry);
    writer.register_converter("money", Box::new(MoneyConverter::new()));
    let mut doc = Document::new();
    let object = writer.new_object(
        class,
        vec![Value::Int(1), Value::Currency("12.30 EUR".into())],
    );
    writer.insert(&mut doc, object).unwrap();

    let (_, row) = doc.sheet("Invoice").unwrap().data_rows().next().unwrap();
    assert_eq!(row.cell(1).and_then(|c| c.number()), Some(12.30));
    assert_eq!(row.cell(2).and_then(|c| c.string()), Some("EUR"));

    let mut registry = MetaRegistry::new();
    let class = registry.register(ClassMeta::new(
        "Invoice",
        IdentityKind::Application,
        vec![
            FieldMeta::scalar("id", FieldType::I64).pk(),
            FieldMeta::scalar("total", FieldType::Custom("money".into())),
        ],
    ));
    let mut reader = SheetStore::new(registry);
    reader.register_converter("money", Box::new(MoneyConverter::new()));
    let loaded = reader.candidates(&doc, class, false).unwrap();
    assert_eq!(
        reader.arena().field(loaded[0], 1),
        &Value::Currency("12.30 EUR".into())
    );
}

#[test]
fn embedded_multi_valued_members_fail_at_write_time() {
    let mut registry = MetaRegistry::new();
    let item = registry.register(ClassMeta::new(
        "Item",
        IdentityKind::Application,
        vec![FieldMeta::scalar("id", FieldType::I64).pk()],
    ));
    let mut bag = FieldMeta::scalar("bag", FieldType::Object);
    bag.relation = Relation::Collection {
        element: item,
        embedded: true,
        ordering: None,
    };
    let holder = registry.register(ClassMeta::new(
        "Holder",
        IdentityKind::Application,
        vec![FieldMeta::scalar("id", FieldType::I64).pk(), bag],
    ));
    let mut store = SheetStore::new(registry);
    let mut doc = Document::new();
    let object = store.new_object(holder, vec![Value::Int(1), Value::List(vec![])]);
    let err = store.insert(&mut doc, object).unwrap_err();
    assert!(matches!(err, StoreError::EmbeddedMultiValued { .. }));
}
