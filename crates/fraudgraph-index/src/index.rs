//! Attribute index: normalized attribute value → ids of entities exhibiting it.
//!
//! The index is published as immutable [`IndexSnapshot`]s. A resolution
//! request grabs one snapshot and reads it without further locking, so a
//! rebuild or an incremental update never blocks an in-flight request.
//! Writers are serialized among themselves and swap in a new generation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use fraudgraph_core::{AttributeKind, StoreChange, StoreEvent, Transaction, User};

static EMPTY: BTreeSet<String> = BTreeSet::new();

type Table = HashMap<String, BTreeSet<String>>;

/// One immutable generation of the index.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    generation: u64,
    /// One table per [`AttributeKind`], addressed by `AttributeKind::ordinal`.
    tables: [Table; 6],
}

impl IndexSnapshot {
    /// Build a snapshot from a full scan of the store.
    pub fn build(users: &[User], transactions: &[Transaction]) -> Self {
        let mut snapshot = Self::default();
        for user in users {
            snapshot.index_user(user);
        }
        for tx in transactions {
            snapshot.index_transaction(tx);
        }
        snapshot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ids sharing an already-normalized value. Unknown values yield an empty set.
    pub fn lookup(&self, kind: AttributeKind, normalized: &str) -> &BTreeSet<String> {
        self.tables[kind.ordinal()].get(normalized).unwrap_or(&EMPTY)
    }

    /// Normalize `raw` and look it up. Values that normalize to nothing never match.
    pub fn lookup_raw(&self, kind: AttributeKind, raw: &str) -> &BTreeSet<String> {
        match kind.normalize(raw) {
            Some(value) => self.lookup(kind, &value),
            None => &EMPTY,
        }
    }

    pub fn stats(&self) -> IndexStats {
        let kinds = AttributeKind::ALL
            .iter()
            .map(|&kind| {
                let table = &self.tables[kind.ordinal()];
                KindStats {
                    kind,
                    distinct_values: table.len(),
                    entries: table.values().map(BTreeSet::len).sum(),
                    shared_values: table.values().filter(|ids| ids.len() > 1).count(),
                }
            })
            .collect();

        IndexStats {
            generation: self.generation,
            kinds,
        }
    }

    fn index_user(&mut self, user: &User) {
        for (kind, value) in user.attribute_values() {
            self.insert(kind, value, user.id.as_str());
        }
    }

    fn unindex_user(&mut self, user: &User) {
        for (kind, value) in user.attribute_values() {
            self.remove(kind, &value, user.id.as_str());
        }
    }

    fn index_transaction(&mut self, tx: &Transaction) {
        for (kind, value) in tx.attribute_values() {
            self.insert(kind, value, tx.id.as_str());
        }
    }

    fn unindex_transaction(&mut self, tx: &Transaction) {
        for (kind, value) in tx.attribute_values() {
            self.remove(kind, &value, tx.id.as_str());
        }
    }

    fn insert(&mut self, kind: AttributeKind, value: String, id: &str) {
        self.tables[kind.ordinal()]
            .entry(value)
            .or_default()
            .insert(id.to_string());
    }

    fn remove(&mut self, kind: AttributeKind, value: &str, id: &str) {
        let table = &mut self.tables[kind.ordinal()];
        if let Some(ids) = table.get_mut(value) {
            ids.remove(id);
            if ids.is_empty() {
                table.remove(value);
            }
        }
    }

    fn apply(&mut self, change: &StoreChange) {
        match change {
            StoreChange::UserUpserted { previous, current } => {
                if let Some(old) = previous {
                    self.unindex_user(old);
                }
                self.index_user(current);
            }
            StoreChange::TransactionUpserted { previous, current } => {
                if let Some(old) = previous {
                    self.unindex_transaction(old);
                }
                self.index_transaction(current);
            }
            StoreChange::Reset => {
                self.tables = Default::default();
            }
        }
    }
}

/// Per-kind index statistics.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KindStats {
    pub kind: AttributeKind,
    /// Distinct normalized values.
    pub distinct_values: usize,
    /// Total (value, entity) pairs.
    pub entries: usize,
    /// Values held by more than one entity.
    pub shared_values: usize,
}

/// Index statistics.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IndexStats {
    pub generation: u64,
    pub kinds: Vec<KindStats>,
}

/// The shared, concurrently readable attribute index.
pub struct AttributeIndex {
    current: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<()>,
}

impl AttributeIndex {
    /// An empty index (generation 0).
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(IndexSnapshot::default())),
            writer: Mutex::new(()),
        }
    }

    /// The current generation. Holders keep reading it even after newer
    /// generations are published.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.current.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Convenience lookup against the current generation.
    pub fn lookup(&self, kind: AttributeKind, normalized: &str) -> BTreeSet<String> {
        self.snapshot().lookup(kind, normalized).clone()
    }

    pub fn stats(&self) -> IndexStats {
        self.snapshot().stats()
    }

    /// Replace the contents with a fresh build from a full store scan.
    pub fn rebuild(&self, users: &[User], transactions: &[Transaction]) -> u64 {
        let _writer = self.writer.lock();
        let mut next = IndexSnapshot::build(users, transactions);
        next.generation = self.generation() + 1;
        let generation = next.generation;
        self.publish(next);
        tracing::info!(
            generation,
            users = users.len(),
            transactions = transactions.len(),
            "Attribute index rebuilt"
        );
        generation
    }

    /// Apply one store change.
    pub fn apply(&self, event: &StoreEvent) -> u64 {
        self.apply_batch(std::slice::from_ref(event))
    }

    /// Apply a batch of store changes as a single new generation.
    pub fn apply_batch(&self, events: &[StoreEvent]) -> u64 {
        let _writer = self.writer.lock();
        let current = self.snapshot();
        if events.is_empty() {
            return current.generation;
        }

        let mut next = IndexSnapshot::clone(&current);
        drop(current);
        for event in events {
            next.apply(&event.change);
        }
        next.generation += 1;
        let generation = next.generation;
        self.publish(next);
        tracing::debug!(generation, applied = events.len(), "Attribute index updated");
        generation
    }

    fn publish(&self, next: IndexSnapshot) {
        *self.current.write() = Arc::new(next);
    }
}

impl Default for AttributeIndex {
    fn default() -> Self {
        Self::new()
    }
}
