use thiserror::Error;

/// Errors produced by the session state layer.
#[derive(Error, Debug)]
pub enum StateError {
    /// The loaded snapshot is missing a schema-declared field. Fatal for
    /// that load; the container must not proceed with a partial snapshot.
    #[error("state validation failed: missing field `{0}`")]
    Validation(String),

    /// A persisted value could not be decoded into its declared type.
    #[error("failed to decode persisted field `{field}`: {source}")]
    Decode {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization of an in-memory field failed.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The durable store backend reported an error.
    #[error("durable store error: {0}")]
    Store(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StateError>;
