//! Error types for rendering and manifest parsing.

/// Result type alias for scaffold operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A relation field has no target collection.
    #[error("{resource}.{field}: relation has no target")]
    MissingTarget { resource: String, field: String },

    /// Serializing generated data failed.
    #[error("failed to serialize generated source: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A manifest could not be read back.
    #[error("invalid plugin manifest: {0}")]
    InvalidManifest(String),
}
