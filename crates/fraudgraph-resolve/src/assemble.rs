//! Turns an expansion into the viewer's response shape.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde_json::{Map, Value};

use fraudgraph_core::{Entity, EntityKind, EntityRef, Transaction, User};

use crate::classify::Relationship;
use crate::types::{GraphNode, GraphRelationship, GraphResponse, SeedRef};

/// Build a [`GraphResponse`] from discovered entities and relationships.
///
/// Nodes are deduplicated by id and relationships by (from, to, type,
/// attribute). A relationship with an endpoint outside the node set is
/// dropped. The seed node comes first; everything else is sorted.
pub fn assemble(
    seed: &EntityRef,
    entities: &[Entity],
    relationships: &[Relationship],
    truncated: bool,
) -> GraphResponse {
    let mut nodes: BTreeMap<(EntityKind, &str), GraphNode> = BTreeMap::new();
    let mut kinds: BTreeMap<&str, EntityKind> = BTreeMap::new();

    for entity in entities {
        match kinds.get(entity.id()) {
            Some(kind) if *kind != entity.kind() => {
                tracing::warn!(
                    id = entity.id(),
                    kept = %kind,
                    dropped = %entity.kind(),
                    "Id shared by a user and a transaction, keeping first"
                );
            }
            Some(_) => {}
            None => {
                kinds.insert(entity.id(), entity.kind());
                nodes.insert((entity.kind(), entity.id()), to_node(entity));
            }
        }
    }

    let ids: HashSet<&str> = kinds.keys().copied().collect();
    let edges: BTreeSet<GraphRelationship> = relationships
        .iter()
        .map(Relationship::to_graph)
        .filter(|edge| {
            let complete = ids.contains(edge.from.as_str()) && ids.contains(edge.to.as_str());
            if !complete {
                tracing::debug!(from = %edge.from, to = %edge.to, "Dropping edge to unknown node");
            }
            complete
        })
        .collect();

    let mut ordered = Vec::with_capacity(nodes.len());
    if let Some(node) = nodes.remove(&(seed.kind(), seed.id())) {
        ordered.push(node);
    }
    ordered.extend(nodes.into_values());

    GraphResponse {
        nodes: ordered,
        relationships: edges.into_iter().collect(),
        seed: SeedRef {
            id: seed.id().to_string(),
            kind: seed.kind(),
        },
        truncated,
    }
}

fn to_node(entity: &Entity) -> GraphNode {
    match entity {
        Entity::User(user) => GraphNode {
            id: user.id.to_string(),
            label: user_label(user),
            kind: EntityKind::User,
            props: user_props(user),
        },
        Entity::Transaction(tx) => GraphNode {
            id: tx.id.to_string(),
            label: tx.id.to_string(),
            kind: EntityKind::Transaction,
            props: transaction_props(tx),
        },
    }
}

fn user_label(user: &User) -> String {
    match user.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => user.id.to_string(),
    }
}

fn user_props(user: &User) -> Map<String, Value> {
    let mut props = Map::new();
    insert_opt(&mut props, "name", &user.name);
    insert_opt(&mut props, "email", &user.email);
    insert_opt(&mut props, "phone", &user.phone);
    insert_opt(&mut props, "address", &user.address);
    props.insert(
        "paymentMethodCount".into(),
        Value::from(user.payment_methods.len()),
    );
    props
}

fn transaction_props(tx: &Transaction) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("amount".into(), Value::from(tx.amount));
    props.insert("timestamp".into(), Value::from(tx.timestamp));
    insert_opt(&mut props, "ip", &tx.ip);
    insert_opt(&mut props, "deviceId", &tx.device_id);
    props.insert("senderId".into(), Value::from(tx.sender_id.as_str()));
    if let Some(cp) = &tx.counterparty_id {
        props.insert("counterpartyId".into(), Value::from(cp.as_str()));
    }
    if !tx.metadata.is_null() {
        props.insert("metadata".into(), tx.metadata.clone());
    }
    props
}

fn insert_opt(props: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        props.insert(key.to_string(), Value::from(v.as_str()));
    }
}
