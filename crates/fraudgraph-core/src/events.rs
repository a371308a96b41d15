//! Store change events.
//!
//! The entity store publishes one event per accepted write. The attribute
//! index consumes them to stay in step with the store without rescanning it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Transaction, User};

/// Unique identifier for an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// A change accepted by the entity store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub change: StoreChange,
}

impl StoreEvent {
    pub fn new(change: StoreChange) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            change,
        }
    }
}

/// The change payload, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum StoreChange {
    /// A user was created (`previous` is None) or replaced.
    UserUpserted {
        previous: Option<User>,
        current: User,
    },
    /// A transaction was created or replaced.
    TransactionUpserted {
        previous: Option<Transaction>,
        current: Transaction,
    },
    /// The store contents were replaced wholesale; derived state must be rebuilt.
    Reset,
}
