//! fraudgraph-core: Shared types, configuration, and error handling for fraudgraph.
//!
//! This crate provides the foundational types used across all fraudgraph crates:
//! - Entity types (User, Transaction) and their typed ids
//! - Identifying attribute kinds and value normalization
//! - Store change events consumed by the attribute index
//! - Resolver configuration
//! - Common error types

pub mod attributes;
pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use attributes::AttributeKind;
pub use config::ResolverConfig;
pub use error::CoreError;
pub use events::{StoreChange, StoreEvent};
pub use types::{Entity, EntityKind, EntityRef, Transaction, TransactionId, User, UserId};
