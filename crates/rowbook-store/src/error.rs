use thiserror::Error;

/// Errors surfaced by the mapping engine.
///
/// Unsupported scalar mappings are not an error variant: the engine logs a
/// warning and persists the field as absent.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The row locator found no match for the object's identity.
    #[error("no row found for identity {identity} in sheet {sheet}")]
    NotFound { sheet: String, identity: String },

    /// An insert's identity already resolves to an existing row.
    #[error("object with identity {identity} already exists in sheet {sheet}")]
    DuplicateIdentity { sheet: String, identity: String },

    /// Two columns resolved to the same position while building the layout.
    #[error("column position {position} assigned to both \"{first}\" and \"{second}\"")]
    ColumnCollision {
        position: usize,
        first: String,
        second: String,
    },

    /// Multi-valued embedded members have no column representation.
    #[error("embedded multi-valued member {field} is not supported")]
    EmbeddedMultiValued { field: String },

    /// A map key or value literal type that cannot be reconstructed.
    #[error("unsupported map {side} type for {field}: {detail}")]
    UnsupportedMapComponent {
        field: String,
        /// `"key"` or `"value"`.
        side: &'static str,
        detail: String,
    },

    /// A field names a converter that was never registered.
    #[error("no converter registered under name \"{name}\"")]
    UnknownConverter { name: String },

    /// Failure reported by the grid document or the persistence context.
    /// Always fatal to the current operation; never retried internally.
    #[error("storage fault: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
