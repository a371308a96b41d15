//! Request and response types for relationship resolution.
//!
//! The response shape is the graph viewer's contract:
//! `{ nodes: [{id, label, type, props}], relationships: [{from, to, type}] }`
//! plus the seed anchor and the truncation flag.

use std::fmt;

use serde::{Deserialize, Serialize};

use fraudgraph_core::{AttributeKind, EntityKind, EntityRef};

/// Request to resolve the relationship graph around one entity.
///
/// Accepts both snake_case and the client's camelCase field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    #[serde(alias = "seedId")]
    pub seed_id: String,
    #[serde(alias = "seedKind")]
    pub seed_kind: EntityKind,
    /// Hops from the seed (default from config, must be >= 1).
    #[serde(default, alias = "maxDepth")]
    pub max_depth: Option<usize>,
    /// Maximum distinct nodes including the seed (default from config, must be >= 1).
    #[serde(default, alias = "maxNodes")]
    pub max_nodes: Option<usize>,
}

impl ResolveRequest {
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(EntityKind::User, id)
    }

    pub fn transaction(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Transaction, id)
    }

    pub fn new(seed_kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            seed_id: id.into(),
            seed_kind,
            max_depth: None,
            max_nodes: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }

    pub fn seed(&self) -> EntityRef {
        EntityRef::new(self.seed_kind, self.seed_id.clone())
    }
}

/// A node as rendered by the viewer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub props: serde_json::Map<String, serde_json::Value>,
}

/// The relationship vocabulary understood by the viewer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Sent,
    ReceivedBy,
    SameIp,
    SameDevice,
    SharedAttribute,
    Direct,
}

impl RelationshipType {
    /// Symmetric relationships have no meaningful direction.
    pub fn is_symmetric(self) -> bool {
        !matches!(self, RelationshipType::Sent | RelationshipType::ReceivedBy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipType::Sent => "SENT",
            RelationshipType::ReceivedBy => "RECEIVED_BY",
            RelationshipType::SameIp => "SAME_IP",
            RelationshipType::SameDevice => "SAME_DEVICE",
            RelationshipType::SharedAttribute => "SHARED_ATTRIBUTE",
            RelationshipType::Direct => "DIRECT",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An edge as rendered by the viewer.
///
/// Symmetric relationships are emitted with `from <= to`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphRelationship {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,
    /// The matched attribute, for `SHARED_ATTRIBUTE` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<AttributeKind>,
}

/// The node the viewer should center on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedRef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
}

/// A resolved relationship graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphResponse {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
    pub seed: SeedRef,
    /// Set when depth or node limits cut the expansion short.
    pub truncated: bool,
}

impl GraphResponse {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn has_relationship(&self, from: &str, to: &str, rel_type: RelationshipType) -> bool {
        self.relationships
            .iter()
            .any(|r| r.from == from && r.to == to && r.rel_type == rel_type)
    }
}
