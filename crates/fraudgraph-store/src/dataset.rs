//! JSON dataset snapshots: `{ "users": [...], "transactions": [...] }`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use fraudgraph_core::{Transaction, User};

use crate::memory::MemoryEntityStore;
use crate::store::Result;

/// A full export of store contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Dataset {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Write every record through the store's write path. Users go first so
    /// transaction sender checks pass.
    pub fn populate(self, store: &MemoryEntityStore) -> Result<()> {
        let (users, transactions) = (self.users.len(), self.transactions.len());
        for user in self.users {
            store.upsert_user(user)?;
        }
        for tx in self.transactions {
            store.upsert_transaction(tx)?;
        }
        tracing::info!(users, transactions, "Dataset loaded into store");
        Ok(())
    }
}

/// Load a dataset file into a fresh in-memory store.
pub fn load_dataset(path: impl AsRef<Path>, event_buffer: usize) -> Result<MemoryEntityStore> {
    let store = MemoryEntityStore::new(event_buffer);
    Dataset::load(path)?.populate(&store)?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use std::io::Write;

    #[test]
    fn test_load_dataset_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "users": [{{"id": "u1", "email": "a@x.io"}}, {{"id": "u2"}}],
                "transactions": [
                    {{"id": "t1", "amount": 12.5, "senderId": "u1", "ip": "1.2.3.4"}},
                    {{"id": "t2", "amount": 3, "senderId": "u2", "counterpartyId": "u1"}}
                ]
            }}"#
        )
        .unwrap();

        let store = load_dataset(file.path(), 16).unwrap();
        assert_eq!(store.user_count(), 2);
        assert_eq!(store.transaction_count(), 2);
    }

    #[test]
    fn test_dangling_sender_rejected() {
        let dataset = Dataset::from_json_str(
            r#"{"transactions": [{"id": "t1", "amount": 1, "senderId": "ghost"}]}"#,
        )
        .unwrap();
        let store = MemoryEntityStore::new(4);
        assert!(matches!(
            dataset.populate(&store),
            Err(StoreError::InvalidWrite(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            Dataset::from_json_str("{not json"),
            Err(StoreError::Serialization(_))
        ));
    }
}
