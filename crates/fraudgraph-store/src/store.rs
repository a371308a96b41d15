//! The read contract the resolver consumes from the entity store.

use std::future::Future;

use tokio::sync::broadcast;

use fraudgraph_core::{CoreError, StoreEvent, Transaction, TransactionId, User, UserId};

/// Errors from entity store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entity store unavailable: {0}")]
    Unavailable(String),

    #[error("Rejected write: {0}")]
    InvalidWrite(String),

    #[error("Invalid entity: {0}")]
    Entity(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Read-only access to users and transactions.
///
/// A missing record is `Ok(None)`, never an error. Implementations must be
/// safe to share across concurrent resolution requests.
pub trait EntityStore: Send + Sync {
    fn get_user(&self, id: &UserId) -> impl Future<Output = Result<Option<User>>> + Send;

    fn get_transaction(
        &self,
        id: &TransactionId,
    ) -> impl Future<Output = Result<Option<Transaction>>> + Send;

    /// Transactions initiated by `user_id`, ordered by timestamp then id.
    fn transactions_by_sender(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<Transaction>>> + Send;

    /// Transactions received by `user_id`, ordered by timestamp then id.
    fn transactions_by_counterparty(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<Transaction>>> + Send;

    /// Full scan of users, used to rebuild derived indexes.
    fn all_users(&self) -> impl Future<Output = Result<Vec<User>>> + Send;

    /// Full scan of transactions, used to rebuild derived indexes.
    fn all_transactions(&self) -> impl Future<Output = Result<Vec<Transaction>>> + Send;
}

/// A store that announces accepted writes.
pub trait ChangeFeed {
    /// Receive every change accepted after this call.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
