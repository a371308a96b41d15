//! fraudgraph-resolve: Relationship-graph resolution for fraud investigation.
//!
//! Given a seed user or transaction, expands outward through initiator
//! links, counterparties and shared identifying attributes (IP, device,
//! email, phone, address, payment token), bounded by depth and node
//! budgets, and returns the graph in the shape the investigation viewer
//! renders.

pub mod assemble;
pub mod classify;
pub mod error;
pub mod expand;
pub mod interrupt;
pub mod types;

pub use error::{ClassifyError, ResolveError};
pub use types::{
    GraphNode, GraphRelationship, GraphResponse, RelationshipType, ResolveRequest, SeedRef,
};

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use fraudgraph_core::{EntityRef, ResolverConfig};
use fraudgraph_index::AttributeIndex;
use fraudgraph_store::EntityStore;

use crate::assemble::assemble;
use crate::expand::{ExpandError, Expander, ExpansionLimits};
use crate::interrupt::{Interrupt, Interruption};

/// The relationship resolution engine.
///
/// Cheap to share: the store and index sit behind `Arc`s and every request
/// owns its own traversal state.
pub struct ResolutionEngine<S> {
    store: Arc<S>,
    index: Arc<AttributeIndex>,
    config: ResolverConfig,
}

impl<S: EntityStore> ResolutionEngine<S> {
    /// Create an engine with the default resolver configuration.
    pub fn new(store: Arc<S>, index: Arc<AttributeIndex>) -> Self {
        Self {
            store,
            index,
            config: ResolverConfig::default(),
        }
    }

    /// Set a custom resolver configuration.
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<AttributeIndex> {
        &self.index
    }

    /// Resolve the graph around a user.
    pub async fn resolve_user(&self, id: &str) -> error::Result<GraphResponse> {
        self.resolve(ResolveRequest::user(id)).await
    }

    /// Resolve the graph around a transaction.
    pub async fn resolve_transaction(&self, id: &str) -> error::Result<GraphResponse> {
        self.resolve(ResolveRequest::transaction(id)).await
    }

    /// Resolve with the configured deadline and no external cancellation.
    pub async fn resolve(&self, request: ResolveRequest) -> error::Result<GraphResponse> {
        self.resolve_with_cancel(request, CancellationToken::new()).await
    }

    /// Resolve, stopping early if `token` is cancelled or the configured
    /// deadline passes. Interrupted requests return the partial graph
    /// inside the error.
    pub async fn resolve_with_cancel(
        &self,
        request: ResolveRequest,
        token: CancellationToken,
    ) -> error::Result<GraphResponse> {
        let limits = self.limits(&request)?;
        let seed = request.seed();
        let timeout =
            (self.config.timeout_ms > 0).then(|| Duration::from_millis(self.config.timeout_ms));
        let interrupt = Interrupt::new(token, timeout);

        let span = tracing::info_span!(
            "resolve",
            request_id = %Uuid::new_v4(),
            seed = %seed,
            max_depth = limits.max_depth,
            max_nodes = limits.max_nodes,
        );
        self.run(seed, limits, interrupt).instrument(span).await
    }

    async fn run(
        &self,
        seed: EntityRef,
        limits: ExpansionLimits,
        interrupt: Interrupt,
    ) -> error::Result<GraphResponse> {
        let start = std::time::Instant::now();

        // One snapshot for the whole request; later index writes are not seen.
        let snapshot = self.index.snapshot();
        let expander = Expander::new(self.store.as_ref(), &snapshot, limits, &interrupt);

        match expander.expand(&seed).await {
            Ok(expansion) => {
                let response = assemble(
                    &seed,
                    &expansion.entities,
                    &expansion.relationships,
                    expansion.truncated,
                );
                tracing::info!(
                    nodes = response.nodes.len(),
                    relationships = response.relationships.len(),
                    depth_reached = expansion.depth_reached,
                    truncated = response.truncated,
                    index_generation = snapshot.generation(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Resolution complete"
                );
                Ok(response)
            }
            Err(ExpandError::Interrupted { reason, partial }) => {
                let partial = Box::new(assemble(
                    &seed,
                    &partial.entities,
                    &partial.relationships,
                    true,
                ));
                tracing::warn!(
                    nodes = partial.nodes.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    ?reason,
                    "Resolution interrupted"
                );
                Err(match reason {
                    Interruption::Cancelled => ResolveError::Cancelled { partial },
                    Interruption::TimedOut { after } => ResolveError::TimedOut {
                        after_ms: after.as_millis() as u64,
                        partial,
                    },
                })
            }
            Err(ExpandError::NotFound(missing)) => Err(ResolveError::NotFound {
                kind: missing.kind(),
                id: missing.id().to_string(),
            }),
            Err(ExpandError::Store(e)) => {
                tracing::error!(error = %e, "Entity store failed during resolution");
                Err(e.into())
            }
            Err(ExpandError::Classify(e)) => Err(e.into()),
        }
    }

    /// Apply config defaults and validate the request budgets.
    fn limits(&self, request: &ResolveRequest) -> error::Result<ExpansionLimits> {
        if request.seed_id.trim().is_empty() {
            return Err(ResolveError::InvalidRequest(
                "seed id must not be empty".into(),
            ));
        }

        let max_depth = request.max_depth.unwrap_or(self.config.default_max_depth);
        if max_depth == 0 {
            return Err(ResolveError::InvalidRequest("max_depth must be >= 1".into()));
        }

        let requested = request.max_nodes.unwrap_or(self.config.default_max_nodes);
        if requested == 0 {
            return Err(ResolveError::InvalidRequest("max_nodes must be >= 1".into()));
        }
        let max_nodes = requested.min(self.config.hard_max_nodes);
        if max_nodes < requested {
            tracing::warn!(
                requested,
                hard_max_nodes = self.config.hard_max_nodes,
                "Node budget clamped"
            );
        }

        Ok(ExpansionLimits {
            max_depth,
            max_nodes,
        })
    }
}
