//! In-memory entity store with a write path and change notifications.
//!
//! This is the reference adapter used by the CLI and tests. Every accepted
//! write is published as a [`StoreEvent`] on a broadcast channel so derived
//! structures (the attribute index) can follow along.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;

use fraudgraph_core::{StoreChange, StoreEvent, Transaction, TransactionId, User, UserId};

use crate::store::{ChangeFeed, EntityStore, Result, StoreError};

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, User>,
    transactions: HashMap<TransactionId, Transaction>,
    by_sender: HashMap<UserId, BTreeSet<TransactionId>>,
    by_counterparty: HashMap<UserId, BTreeSet<TransactionId>>,
}

impl StoreState {
    fn collect(&self, ids: Option<&BTreeSet<TransactionId>>) -> Vec<Transaction> {
        let mut txs: Vec<Transaction> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.transactions.get(id).cloned())
            .collect();
        txs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        txs
    }

    fn unlink(&mut self, tx: &Transaction) {
        if let Some(ids) = self.by_sender.get_mut(&tx.sender_id) {
            ids.remove(&tx.id);
        }
        if let Some(cp) = &tx.counterparty_id {
            if let Some(ids) = self.by_counterparty.get_mut(cp) {
                ids.remove(&tx.id);
            }
        }
    }

    fn link(&mut self, tx: &Transaction) {
        self.by_sender
            .entry(tx.sender_id.clone())
            .or_default()
            .insert(tx.id.clone());
        if let Some(cp) = &tx.counterparty_id {
            self.by_counterparty
                .entry(cp.clone())
                .or_default()
                .insert(tx.id.clone());
        }
    }
}

/// Thread-safe in-memory store.
pub struct MemoryEntityStore {
    state: RwLock<StoreState>,
    events: broadcast::Sender<StoreEvent>,
    online: AtomicBool,
}

impl MemoryEntityStore {
    /// Create an empty store whose event channel buffers `event_buffer` events.
    pub fn new(event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            state: RwLock::new(StoreState::default()),
            events,
            online: AtomicBool::new(true),
        }
    }

    /// Toggle availability. While offline every read fails with
    /// [`StoreError::Unavailable`].
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn user_count(&self) -> usize {
        self.state.read().users.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.state.read().transactions.len()
    }

    /// Create or replace a user.
    pub fn upsert_user(&self, user: User) -> Result<()> {
        user.validate()?;

        // Events are sent under the write lock so their order matches the
        // order writes were applied.
        let mut state = self.state.write();
        let previous = state.users.insert(user.id.clone(), user.clone());

        tracing::debug!(user_id = %user.id, replaced = previous.is_some(), "User upserted");
        self.publish(StoreChange::UserUpserted {
            previous,
            current: user,
        });
        drop(state);
        Ok(())
    }

    /// Create or replace a transaction. The sender (and counterparty, when
    /// set) must already exist.
    pub fn upsert_transaction(&self, tx: Transaction) -> Result<()> {
        tx.validate()?;

        let mut state = self.state.write();
        if !state.users.contains_key(&tx.sender_id) {
            return Err(StoreError::InvalidWrite(format!(
                "transaction {} references unknown sender {}",
                tx.id, tx.sender_id
            )));
        }
        if let Some(cp) = &tx.counterparty_id {
            if !state.users.contains_key(cp) {
                return Err(StoreError::InvalidWrite(format!(
                    "transaction {} references unknown counterparty {}",
                    tx.id, cp
                )));
            }
        }

        let previous = state.transactions.insert(tx.id.clone(), tx.clone());
        if let Some(old) = &previous {
            state.unlink(old);
        }
        state.link(&tx);

        tracing::debug!(
            transaction_id = %tx.id,
            sender_id = %tx.sender_id,
            replaced = previous.is_some(),
            "Transaction upserted"
        );
        self.publish(StoreChange::TransactionUpserted {
            previous,
            current: tx,
        });
        drop(state);
        Ok(())
    }

    /// Drop all contents. Subscribers receive [`StoreChange::Reset`].
    pub fn clear(&self) {
        let mut state = self.state.write();
        *state = StoreState::default();
        self.publish(StoreChange::Reset);
        drop(state);
    }

    fn publish(&self, change: StoreChange) {
        if self.events.send(StoreEvent::new(change)).is_err() {
            tracing::trace!("No store event subscribers");
        }
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        }
    }
}

impl Default for MemoryEntityStore {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ChangeFeed for MemoryEntityStore {
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

impl EntityStore for MemoryEntityStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        self.ensure_online()?;
        Ok(self.state.read().users.get(id).cloned())
    }

    async fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        self.ensure_online()?;
        Ok(self.state.read().transactions.get(id).cloned())
    }

    async fn transactions_by_sender(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        self.ensure_online()?;
        let state = self.state.read();
        Ok(state.collect(state.by_sender.get(user_id)))
    }

    async fn transactions_by_counterparty(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        self.ensure_online()?;
        let state = self.state.read();
        Ok(state.collect(state.by_counterparty.get(user_id)))
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        self.ensure_online()?;
        let mut users: Vec<User> = self.state.read().users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        self.ensure_online()?;
        let mut txs: Vec<Transaction> =
            self.state.read().transactions.values().cloned().collect();
        txs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(txs)
    }
}
