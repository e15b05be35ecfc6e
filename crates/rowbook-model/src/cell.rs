use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// The six primitive value kinds a cell can carry.
///
/// The kind is a tag recorded on the cell independently of the value slot:
/// a cell may have a kind but no usable value (that is how `null` is
/// represented for Date/Time columns, since the medium has no native null).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Boolean,
    /// IEEE-754 double precision number.
    Number,
    String,
    /// Calendar date-time, stored to millisecond precision.
    Date,
    /// Time of day only; the date part is never meaningful.
    Time,
    /// Currency amount in canonical string form.
    Currency,
}

/// Value slot of a [`Cell`]. Private: readers go through the typed getters,
/// which check the recorded kind before extracting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
enum Payload {
    #[default]
    Empty,
    Boolean(bool),
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
    Time(NaiveTime),
}

/// A single tagged cell.
///
/// Invariant: the kind must be set before (or together with) the value. All
/// typed setters record both; [`Cell::set_kind`] alone leaves the value slot
/// empty, which readers observe as an absent value. Getters return `None`
/// whenever the recorded kind does not match the requested accessor, so a
/// reader can never extract a value under the wrong kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Cell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<CellKind>,
    #[serde(default, skip_serializing_if = "payload_is_empty")]
    value: Payload,
}

fn payload_is_empty(p: &Payload) -> bool {
    matches!(p, Payload::Empty)
}

impl Cell {
    /// Create a cell with no kind and no value.
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded kind tag, if any.
    pub fn kind(&self) -> Option<CellKind> {
        self.kind
    }

    /// Set the kind tag without providing a value.
    ///
    /// If the current value slot is inconsistent with the new kind it is
    /// cleared; this is the representation of a typed null.
    pub fn set_kind(&mut self, kind: CellKind) {
        if !payload_matches(&self.value, kind) {
            self.value = Payload::Empty;
        }
        self.kind = Some(kind);
    }

    /// Whether the value slot is absent (regardless of kind).
    pub fn is_empty(&self) -> bool {
        matches!(self.value, Payload::Empty)
    }

    /// Clear the value slot, keeping the kind tag.
    pub fn clear_value(&mut self) {
        self.value = Payload::Empty;
    }

    pub fn set_boolean(&mut self, value: bool) {
        self.kind = Some(CellKind::Boolean);
        self.value = Payload::Boolean(value);
    }

    pub fn boolean(&self) -> Option<bool> {
        match (self.kind, &self.value) {
            (Some(CellKind::Boolean), Payload::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn set_number(&mut self, value: f64) {
        self.kind = Some(CellKind::Number);
        self.value = Payload::Number(value);
    }

    pub fn number(&self) -> Option<f64> {
        match (self.kind, &self.value) {
            (Some(CellKind::Number), Payload::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn set_string(&mut self, value: impl Into<String>) {
        self.kind = Some(CellKind::String);
        self.value = Payload::Text(value.into());
    }

    pub fn string(&self) -> Option<&str> {
        match (self.kind, &self.value) {
            (Some(CellKind::String), Payload::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn set_date(&mut self, value: NaiveDateTime) {
        self.kind = Some(CellKind::Date);
        self.value = Payload::Date(value);
    }

    pub fn date(&self) -> Option<NaiveDateTime> {
        match (self.kind, &self.value) {
            (Some(CellKind::Date), Payload::Date(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn set_time(&mut self, value: NaiveTime) {
        self.kind = Some(CellKind::Time);
        self.value = Payload::Time(value);
    }

    pub fn time(&self) -> Option<NaiveTime> {
        match (self.kind, &self.value) {
            (Some(CellKind::Time), Payload::Time(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn set_currency(&mut self, value: impl Into<String>) {
        self.kind = Some(CellKind::Currency);
        self.value = Payload::Text(value.into());
    }

    pub fn currency(&self) -> Option<&str> {
        match (self.kind, &self.value) {
            (Some(CellKind::Currency), Payload::Text(s)) => Some(s),
            _ => None,
        }
    }
}

fn payload_matches(payload: &Payload, kind: CellKind) -> bool {
    match payload {
        Payload::Empty => true,
        Payload::Boolean(_) => kind == CellKind::Boolean,
        Payload::Number(_) => kind == CellKind::Number,
        Payload::Text(_) => matches!(kind, CellKind::String | CellKind::Currency),
        Payload::Date(_) => kind == CellKind::Date,
        Payload::Time(_) => kind == CellKind::Time,
    }
}
