//! Keeps the attribute index in step with the entity store.
//!
//! A background tokio task drains the store's change feed and applies the
//! events in batches. If the task falls behind the broadcast buffer it
//! rebuilds from a full store scan instead of guessing what it missed.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;

use fraudgraph_core::StoreEvent;
use fraudgraph_store::{ChangeFeed, EntityStore, StoreError};

use crate::index::AttributeIndex;

/// Rebuild `index` from a full scan of `store`. Returns the new generation.
pub async fn rebuild_from_store<S: EntityStore>(
    index: &AttributeIndex,
    store: &S,
) -> Result<u64, StoreError> {
    let users = store.all_users().await?;
    let transactions = store.all_transactions().await?;
    Ok(index.rebuild(&users, &transactions))
}

/// Handle to the background index maintenance task.
pub struct IndexMaintainer {
    handle: JoinHandle<()>,
}

impl IndexMaintainer {
    /// Subscribe to `store`, build the index from a full scan, then keep it
    /// updated in the background.
    ///
    /// Subscribing before the scan means no write is missed; writes that
    /// land in both the scan and the feed are re-applied harmlessly.
    pub async fn start<S>(index: Arc<AttributeIndex>, store: Arc<S>) -> Result<Self, StoreError>
    where
        S: EntityStore + ChangeFeed + 'static,
    {
        let receiver = store.subscribe();
        rebuild_from_store(&index, store.as_ref()).await?;
        Ok(Self::spawn(index, store, receiver))
    }

    /// Spawn the maintenance loop on an existing subscription.
    pub fn spawn<S>(
        index: Arc<AttributeIndex>,
        store: Arc<S>,
        receiver: broadcast::Receiver<StoreEvent>,
    ) -> Self
    where
        S: EntityStore + 'static,
    {
        let handle = tokio::spawn(async move {
            run_maintenance_loop(index, store, receiver).await;
        });
        Self { handle }
    }

    /// Whether the loop has exited (store dropped or task aborted).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the loop and wait for it.
    pub async fn shutdown(self) {
        self.handle.abort();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "Index maintenance task panicked");
            }
        }
    }
}

async fn run_maintenance_loop<S: EntityStore>(
    index: Arc<AttributeIndex>,
    store: Arc<S>,
    mut receiver: broadcast::Receiver<StoreEvent>,
) {
    tracing::info!(generation = index.generation(), "Index maintainer started");

    loop {
        match receiver.recv().await {
            Ok(first) => {
                let mut batch = vec![first];
                loop {
                    match receiver.try_recv() {
                        Ok(event) => batch.push(event),
                        Err(TryRecvError::Lagged(skipped)) => {
                            resync(&index, store.as_ref(), skipped).await;
                            batch.clear();
                        }
                        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                    }
                }
                index.apply_batch(&batch);
            }
            Err(RecvError::Lagged(skipped)) => {
                resync(&index, store.as_ref(), skipped).await;
            }
            Err(RecvError::Closed) => {
                tracing::info!("Store change feed closed, index maintainer exiting");
                break;
            }
        }
    }
}

async fn resync<S: EntityStore>(index: &AttributeIndex, store: &S, skipped: u64) {
    tracing::warn!(skipped, "Index maintainer lagged behind store, rebuilding");
    if let Err(e) = rebuild_from_store(index, store).await {
        // The stale generation stays readable; the next lag or explicit
        // rebuild will retry.
        tracing::error!(error = %e, "Index rebuild after lag failed");
    }
}
