//! Error types for the fraudgraph-resolve crate.

use thiserror::Error;

use fraudgraph_core::{AttributeKind, EntityKind};
use fraudgraph_store::StoreError;

use crate::types::GraphResponse;

/// A basis paired with entity kinds it cannot link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("{basis} cannot link {a} and {b}")]
    KindMismatch {
        basis: String,
        a: EntityKind,
        b: EntityKind,
    },

    #[error("{0} is not a user attribute")]
    NotUserAttribute(AttributeKind),
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Resolution cancelled after discovering {} nodes", .partial.nodes.len())]
    Cancelled { partial: Box<GraphResponse> },

    #[error(
        "Resolution timed out after {after_ms}ms with {} nodes discovered",
        .partial.nodes.len()
    )]
    TimedOut {
        after_ms: u64,
        partial: Box<GraphResponse>,
    },

    #[error("Entity store error: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),
}

impl ResolveError {
    /// Whether retrying (possibly with a larger budget) can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolveError::StoreUnavailable(_)
                | ResolveError::Cancelled { .. }
                | ResolveError::TimedOut { .. }
        )
    }

    /// The graph discovered before an interruption, if any.
    pub fn partial(&self) -> Option<&GraphResponse> {
        match self {
            ResolveError::Cancelled { partial } | ResolveError::TimedOut { partial, .. } => {
                Some(partial)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
