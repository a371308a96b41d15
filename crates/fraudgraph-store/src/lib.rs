//! fraudgraph-store: entity store access for the resolver.
//!
//! The store is the single source of truth for users and transactions.
//! This crate defines the read contract the resolver depends on and ships
//! an in-memory adapter whose write path publishes change events.

pub mod dataset;
pub mod memory;
pub mod store;

pub use dataset::{load_dataset, Dataset};
pub use memory::MemoryEntityStore;
pub use store::{ChangeFeed, EntityStore, StoreError};
