//! `rowbook-store` maps structured objects onto rows of a `rowbook-model`
//! grid document.
//!
//! Each persistent class owns one sheet; each object becomes one row with
//! fields encoded into typed cells at planned column positions. On top of
//! that sit relation literals (references stored as bracketed identity
//! strings), embedded-member flattening, row location by identity, version
//! stamping, and bulk candidate materialization for query evaluation.
//!
//! Everything runs synchronously on the caller's thread against a document
//! held fully in memory; callers serialize mutating access themselves.

pub mod codec;
pub mod context;
pub mod embed;
mod error;
pub mod generator;
pub mod layout;
pub mod locate;
pub mod meta;
pub mod relation;
pub mod schema;
mod store;
mod value;
pub mod version;

pub use codec::{CellConverter, ConverterRegistry};
pub use context::{Key, ObjectArena, ObjectId, Record};
pub use error::{Result, StoreError};
pub use generator::IncrementGenerator;
pub use layout::{ColumnLayout, SchemaCache};
pub use meta::{
    ClassId, ClassMeta, EnumType, FieldMeta, FieldType, IdentityKind, MapComponent, MetaRegistry,
    Relation, VersionSpec, VersionStrategy,
};
pub use store::SheetStore;
pub use value::Value;
