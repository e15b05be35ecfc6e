//! Relation literals: references stored as bracketed identity strings.
//!
//! A single reference persists as `"[<identity>]"`, a collection or array
//! as `"[id1,id2,...]"`, and a map as `"[[k1],[v1],[k2],[v2],...]"` where
//! each component is an identity (persistent key/value types) or a plain
//! literal (String, Enum variant name). Identity strings never contain a
//! comma (composite key parts are `;`-joined), so splitting on commas is
//! unambiguous.
//!
//! Decoding resolves identities through a caller-supplied resolver. Outside
//! of strict single-reference resolution, an identity with no surviving row
//! is dropped and the owner is marked dirty so its next store rewrites the
//! literal without the stale entry.

use crate::context::{Key, ObjectArena, ObjectId};
use crate::error::{Result, StoreError};
use crate::meta::{ClassId, ClassMeta, FieldType, MapComponent, MetaRegistry};
use crate::value::Value;

/// Resolves a portable identity string to a live object, or `None` when the
/// identity no longer has a row (stale reference).
pub trait IdentityResolver {
    fn resolve(&mut self, identity: &str) -> Result<Option<ObjectId>>;
}

impl<F> IdentityResolver for F
where
    F: FnMut(&str) -> Result<Option<ObjectId>>,
{
    fn resolve(&mut self, identity: &str) -> Result<Option<ObjectId>> {
        self(identity)
    }
}

/// `"[<identity>]"` for one reference.
pub fn encode_single(arena: &ObjectArena, registry: &MetaRegistry, target: ObjectId) -> Result<String> {
    Ok(format!("[{}]", arena.portable_identity(registry, target)?))
}

/// `"[id1,id2,...]"` for a collection or array, in element order.
pub fn encode_elements(
    arena: &ObjectArena,
    registry: &MetaRegistry,
    elements: &[ObjectId],
) -> Result<String> {
    let mut ids = Vec::with_capacity(elements.len());
    for &element in elements {
        ids.push(arena.portable_identity(registry, element)?);
    }
    Ok(format!("[{}]", ids.join(",")))
}

/// `"[[k1],[v1],...]"` for a map, in entry order.
pub fn encode_map(
    arena: &ObjectArena,
    registry: &MetaRegistry,
    field_name: &str,
    key: &MapComponent,
    value: &MapComponent,
    entries: &[(Value, Value)],
) -> Result<String> {
    let mut parts = Vec::with_capacity(entries.len() * 2);
    for (k, v) in entries {
        parts.push(format!("[{}]", component_literal(arena, registry, field_name, "key", key, k)?));
        parts.push(format!(
            "[{}]",
            component_literal(arena, registry, field_name, "value", value, v)?
        ));
    }
    Ok(format!("[{}]", parts.join(",")))
}

fn component_literal(
    arena: &ObjectArena,
    registry: &MetaRegistry,
    field_name: &str,
    side: &'static str,
    component: &MapComponent,
    value: &Value,
) -> Result<String> {
    match (component, value) {
        (MapComponent::Class(_), Value::Ref(id)) => arena.portable_identity(registry, *id),
        (MapComponent::String, Value::Str(s)) => Ok(s.clone()),
        (MapComponent::Enum(_), Value::Enum(variant)) => Ok(variant.clone()),
        (_, other) => Err(StoreError::UnsupportedMapComponent {
            field: field_name.to_string(),
            side,
            detail: format!("value {other:?} does not match the declared {side} type"),
        }),
    }
}

/// Decode one reference literal. With `strict` set an unresolvable identity
/// is an error; otherwise it yields `None` (the caller drops the value).
pub fn decode_single(
    resolver: &mut dyn IdentityResolver,
    sheet: &str,
    literal: &str,
    strict: bool,
) -> Result<Option<ObjectId>> {
    let identity = strip_brackets(literal)?;
    match resolver.resolve(identity)? {
        Some(id) => Ok(Some(id)),
        None if strict => Err(StoreError::NotFound {
            sheet: sheet.to_string(),
            identity: identity.to_string(),
        }),
        None => Ok(None),
    }
}

/// Decoded multi-valued literal plus whether any stale entries were dropped.
pub struct DecodedElements {
    pub elements: Vec<ObjectId>,
    pub dropped: bool,
}

/// Decode a collection/array literal, dropping stale identities.
pub fn decode_elements(
    resolver: &mut dyn IdentityResolver,
    literal: &str,
) -> Result<DecodedElements> {
    let inner = strip_brackets(literal)?;
    let mut elements = Vec::new();
    let mut dropped = false;
    for identity in split_top_level(inner) {
        match resolver.resolve(identity)? {
            Some(id) => elements.push(id),
            None => dropped = true,
        }
    }
    Ok(DecodedElements { elements, dropped })
}

/// Decoded map literal plus whether any stale entries were dropped.
pub struct DecodedMap {
    pub entries: Vec<(Value, Value)>,
    pub dropped: bool,
}

/// Decode a map literal. Entries with a stale key or value identity are
/// dropped whole; malformed component groups are a hard error.
pub fn decode_map(
    resolver: &mut dyn IdentityResolver,
    field_name: &str,
    key: &MapComponent,
    value: &MapComponent,
    literal: &str,
) -> Result<DecodedMap> {
    let inner = strip_brackets(literal)?;
    let groups: Vec<&str> = split_top_level(inner).collect();
    if groups.len() % 2 != 0 {
        return Err(StoreError::Store(format!(
            "map literal for {field_name} has an odd number of component groups"
        )));
    }
    let mut entries = Vec::with_capacity(groups.len() / 2);
    let mut dropped = false;
    for pair in groups.chunks_exact(2) {
        let k = decode_component(resolver, field_name, "key", key, pair[0])?;
        let v = decode_component(resolver, field_name, "value", value, pair[1])?;
        match (k, v) {
            (Some(k), Some(v)) => entries.push((k, v)),
            _ => dropped = true,
        }
    }
    Ok(DecodedMap { entries, dropped })
}

fn decode_component(
    resolver: &mut dyn IdentityResolver,
    field_name: &str,
    side: &'static str,
    component: &MapComponent,
    group: &str,
) -> Result<Option<Value>> {
    let literal = strip_brackets(group).map_err(|_| StoreError::UnsupportedMapComponent {
        field: field_name.to_string(),
        side,
        detail: format!("component group {group:?} is not bracketed"),
    })?;
    match component {
        MapComponent::Class(_) => Ok(resolver.resolve(literal)?.map(Value::Ref)),
        MapComponent::String => Ok(Some(Value::Str(literal.to_string()))),
        MapComponent::Enum(en) => {
            if en.ordinal_of(literal).is_none() {
                return Err(StoreError::UnsupportedMapComponent {
                    field: field_name.to_string(),
                    side,
                    detail: format!("enum {} has no variant {literal}", en.name),
                });
            }
            Ok(Some(Value::Enum(literal.to_string())))
        }
    }
}

/// Parsed portable identity: the class plus the key material needed by the
/// find-or-create hooks.
pub enum ParsedIdentity {
    Datastore(ClassId, Key),
    Application(ClassId, Vec<(usize, Value)>),
}

/// Parse `<class-name>:<key>` back into class and key parts.
pub fn parse_identity(registry: &MetaRegistry, identity: &str) -> Result<ParsedIdentity> {
    let (class_name, key) = identity.split_once(':').ok_or_else(|| {
        StoreError::Store(format!("malformed identity string {identity:?}"))
    })?;
    let class = registry.class_by_name(class_name).ok_or_else(|| {
        StoreError::Store(format!("identity {identity:?} names an unknown class"))
    })?;
    let meta = registry.class(class);
    match meta.identity {
        crate::meta::IdentityKind::Datastore => {
            let key = match key.parse::<i64>() {
                Ok(n) => Key::Int(n),
                Err(_) => Key::Str(key.to_string()),
            };
            Ok(ParsedIdentity::Datastore(class, key))
        }
        crate::meta::IdentityKind::Application => {
            let ordinals = meta.pk_ordinals();
            let parts: Vec<&str> = key.split(';').collect();
            if parts.len() != ordinals.len() {
                return Err(StoreError::Store(format!(
                    "identity {identity:?} has {} key parts, class {} declares {}",
                    parts.len(),
                    meta.name,
                    ordinals.len()
                )));
            }
            let mut pk_values = Vec::with_capacity(ordinals.len());
            for (ordinal, part) in ordinals.into_iter().zip(parts) {
                let value = key_part_value(&meta.fields[ordinal].field_type, part)?;
                pk_values.push((ordinal, value));
            }
            Ok(ParsedIdentity::Application(class, pk_values))
        }
        crate::meta::IdentityKind::Nondurable => Err(StoreError::Store(format!(
            "identity {identity:?} refers to a nondurable class"
        ))),
    }
}

fn key_part_value(field_type: &FieldType, part: &str) -> Result<Value> {
    let parse_err = |detail: &str| StoreError::Store(format!("bad identity key part {part:?}: {detail}"));
    match field_type {
        FieldType::I8 | FieldType::I16 | FieldType::I32 | FieldType::I64 => part
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| parse_err(&e.to_string())),
        FieldType::String => Ok(Value::Str(part.to_string())),
        FieldType::Char => part
            .chars()
            .next()
            .map(Value::Char)
            .ok_or_else(|| parse_err("empty char key")),
        FieldType::Enum(_) => Ok(Value::Enum(part.to_string())),
        FieldType::Date => part
            .parse()
            .map(Value::Date)
            .map_err(|e: chrono::ParseError| parse_err(&e.to_string())),
        FieldType::DateTime | FieldType::Timestamp => {
            let millis = part.parse::<i64>().map_err(|e| parse_err(&e.to_string()))?;
            chrono::DateTime::from_timestamp_millis(millis)
                .map(|dt| Value::DateTime(dt.naive_utc()))
                .ok_or_else(|| parse_err("epoch millis out of range"))
        }
        other => Err(parse_err(&format!("type {other:?} cannot form a key"))),
    }
}

/// Field ordinals an ordering clause names, in clause order. `"#PK"` names
/// no fields; the stored order already satisfies it. Freshly resolved
/// elements carry only their key fields, so these are the ordinals a caller
/// must load before sorting.
pub fn ordering_ordinals(meta: &ClassMeta, ordering: &str) -> Vec<usize> {
    if ordering.trim() == "#PK" {
        return Vec::new();
    }
    ordering
        .split(',')
        .filter_map(|clause| {
            let field_name = clause.split_whitespace().next()?;
            meta.fields.iter().position(|f| f.name == field_name)
        })
        .collect()
}

/// Re-sort decoded list elements per an explicit ordering clause such as
/// `"name asc, age desc"`. The `"#PK"` clause means order-by-primary-key,
/// which the stored order already satisfies.
pub fn sort_by_ordering(
    arena: &ObjectArena,
    registry: &MetaRegistry,
    element_class: ClassId,
    ordering: &str,
    elements: &mut [ObjectId],
) {
    if ordering.trim() == "#PK" {
        return;
    }
    let meta = registry.class(element_class);
    let clauses: Vec<(usize, bool)> = ordering
        .split(',')
        .filter_map(|clause| {
            let mut words = clause.split_whitespace();
            let field_name = words.next()?;
            let descending = matches!(words.next(), Some(w) if w.eq_ignore_ascii_case("desc"));
            let ordinal = meta.fields.iter().position(|f| f.name == field_name)?;
            Some((ordinal, descending))
        })
        .collect();
    if clauses.is_empty() {
        return;
    }
    elements.sort_by(|&a, &b| {
        for &(ordinal, descending) in &clauses {
            let cmp = compare_values(arena.field(a, ordinal), arena.field(b, ordinal));
            if cmp != std::cmp::Ordering::Equal {
                return if descending { cmp.reverse() } else { cmp };
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// Total order over comparable field values; `Null` sorts first and values
/// of different categories compare by category.
fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Real(x), Value::Real(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Int(x), Value::Real(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Real(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal),
        (Value::Char(x), Value::Char(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Enum(x), Value::Enum(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        (Value::Time(x), Value::Time(y)) => x.cmp(y),
        (Value::Currency(x), Value::Currency(y)) => x.cmp(y),
        _ => category_rank(a).cmp(&category_rank(b)),
    }
}

fn category_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Real(_) => 2,
        Value::Char(_) | Value::Str(_) | Value::Enum(_) => 3,
        Value::Date(_) | Value::DateTime(_) | Value::Time(_) => 4,
        Value::Currency(_) => 5,
        Value::Bytes(_) => 6,
        Value::Ref(_) => 7,
        Value::List(_) => 8,
        Value::Map(_) => 9,
    }
}

fn strip_brackets(literal: &str) -> Result<&str> {
    literal
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| StoreError::Store(format!("malformed bracketed literal {literal:?}")))
}

/// Split on commas that are not inside nested brackets. An empty inner
/// string yields no items.
fn split_top_level(inner: &str) -> impl Iterator<Item = &str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in inner.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < inner.len() {
        items.push(&inner[start..]);
    }
    items.into_iter()
}
