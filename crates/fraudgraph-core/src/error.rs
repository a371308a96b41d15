use thiserror::Error;

/// Top-level error type for shared fraudgraph types.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown attribute kind: {0}")]
    UnknownAttributeKind(String),

    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),

    #[error("Invalid {kind} {id}: {reason}")]
    InvalidEntity {
        kind: String,
        id: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
