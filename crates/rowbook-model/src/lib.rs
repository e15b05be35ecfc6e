//! `rowbook-model` defines the in-memory grid-document data structures.
//!
//! A [`Document`] holds named [`Sheet`]s; each sheet is an ordered list of
//! [`Row`]s; each row is a growable list of [`Cell`]s tagged with one of six
//! primitive [`CellKind`]s. The crate is intentionally self-contained so it
//! can be reused by:
//! - the object-to-row mapping engine (`rowbook-store`)
//! - import/export layers via `serde` (JSON-safe schema)

mod cell;
mod document;
mod row;
mod sheet;

pub use cell::{Cell, CellKind};
pub use document::Document;
pub use row::Row;
pub use sheet::{Sheet, HEADER_STYLE_NAME};

/// Current serialization schema version, embedded into [`Document`].
pub const SCHEMA_VERSION: u32 = 1;
