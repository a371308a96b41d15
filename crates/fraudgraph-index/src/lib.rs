//! fraudgraph-index: derived attribute index for relationship resolution.
//!
//! Maps normalized identifying values (IP, device id, email, phone, address,
//! payment token) to the entities exhibiting them. The index is a cache over
//! the entity store: it can be rebuilt from a full scan at any time and is
//! otherwise kept current from the store's change feed.

pub mod index;
pub mod maintainer;

pub use index::{AttributeIndex, IndexSnapshot, IndexStats, KindStats};
pub use maintainer::{rebuild_from_store, IndexMaintainer};
