//! Bounded breadth-first expansion from a seed entity.
//!
//! Attribute-sharing graphs are full of cycles (A, B and C all behind one
//! NAT address), so the traversal is an explicit work queue plus a map of
//! admitted entities. Each entity is admitted once and inspected once.
//!
//! Admission rules:
//! - an entity at depth `d` may admit neighbours at depth `d + 1` only while
//!   `d < max_depth` and fewer than `max_nodes` entities are admitted;
//! - links to entities that are already admitted are always recorded, so
//!   the edges among the returned nodes are complete;
//! - any neighbour refused by a limit marks the expansion as truncated.
//!
//! Index hits are treated as hints. A neighbour found through the index is
//! only linked if its store record still carries the shared value.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;

use fraudgraph_core::{AttributeKind, Entity, EntityRef, Transaction, User};
use fraudgraph_index::IndexSnapshot;
use fraudgraph_store::{EntityStore, StoreError};

use crate::classify::{classify, Relationship, SharedBasis};
use crate::error::ClassifyError;
use crate::interrupt::{Interrupt, Interruption};
use crate::types::GraphRelationship;

/// Depth and size bounds for one expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

/// Everything discovered by one expansion.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    /// Admitted entities in discovery order; the seed comes first.
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub truncated: bool,
    /// Deepest hop at which an entity was admitted.
    pub depth_reached: usize,
}

/// Why an expansion produced no complete result.
#[derive(Debug)]
pub enum ExpandError {
    NotFound(EntityRef),
    Store(StoreError),
    Classify(ClassifyError),
    Interrupted {
        reason: Interruption,
        partial: Expansion,
    },
}

/// Internal stop signal; the partial state stays in the expander.
enum Halt {
    NotFound(EntityRef),
    Store(StoreError),
    Classify(ClassifyError),
    Interrupted(Interruption),
}

impl From<StoreError> for Halt {
    fn from(e: StoreError) -> Self {
        Halt::Store(e)
    }
}

impl From<ClassifyError> for Halt {
    fn from(e: ClassifyError) -> Self {
        Halt::Classify(e)
    }
}

impl From<Interruption> for Halt {
    fn from(e: Interruption) -> Self {
        Halt::Interrupted(e)
    }
}

/// One relationship plus the attribute value that justified it, if any.
struct Link {
    relationship: Relationship,
    evidence: Option<(AttributeKind, String)>,
}

/// Candidate neighbour of the entity being inspected.
struct Connection {
    other: EntityRef,
    /// Record already in hand (e.g. from `transactions_by_sender`).
    record: Option<Entity>,
    links: Vec<Link>,
    /// Whether `other` may be admitted through this connection. When false
    /// the links are only drawn if `other` is already in the graph.
    admits: bool,
}

impl Connection {
    fn direct(other: EntityRef, record: Option<Entity>, relationships: Vec<Relationship>) -> Self {
        Self {
            other,
            record,
            links: relationships
                .into_iter()
                .map(|relationship| Link {
                    relationship,
                    evidence: None,
                })
                .collect(),
            admits: true,
        }
    }

    fn between_admitted(other: EntityRef, relationships: Vec<Relationship>) -> Self {
        Self {
            admits: false,
            ..Self::direct(other, None, relationships)
        }
    }
}

/// Breadth-first expander over a store and an index snapshot.
pub struct Expander<'a, S> {
    store: &'a S,
    index: &'a IndexSnapshot,
    limits: ExpansionLimits,
    interrupt: &'a Interrupt,
    /// Entity ref → position in `entities`.
    admitted: HashMap<EntityRef, usize>,
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    /// Wire keys of `relationships`, so a link found from both ends is kept once.
    seen: HashSet<GraphRelationship>,
    /// (position in `entities`, depth)
    queue: VecDeque<(usize, usize)>,
    truncated: bool,
    depth_reached: usize,
}

impl<'a, S: EntityStore> Expander<'a, S> {
    pub fn new(
        store: &'a S,
        index: &'a IndexSnapshot,
        limits: ExpansionLimits,
        interrupt: &'a Interrupt,
    ) -> Self {
        Self {
            store,
            index,
            limits,
            interrupt,
            admitted: HashMap::new(),
            entities: Vec::new(),
            relationships: Vec::new(),
            seen: HashSet::new(),
            queue: VecDeque::new(),
            truncated: false,
            depth_reached: 0,
        }
    }

    /// Expand from `seed` until the frontier is exhausted or a limit is hit.
    pub async fn expand(mut self, seed: &EntityRef) -> Result<Expansion, ExpandError> {
        let outcome = self.run(seed).await;
        match outcome {
            Ok(()) => Ok(self.finish()),
            Err(Halt::Interrupted(reason)) => Err(ExpandError::Interrupted {
                reason,
                partial: self.finish(),
            }),
            Err(Halt::NotFound(r)) => Err(ExpandError::NotFound(r)),
            Err(Halt::Store(e)) => Err(ExpandError::Store(e)),
            Err(Halt::Classify(e)) => Err(ExpandError::Classify(e)),
        }
    }

    async fn run(&mut self, seed: &EntityRef) -> Result<(), Halt> {
        let record = self
            .fetch(seed)
            .await?
            .ok_or_else(|| Halt::NotFound(seed.clone()))?;
        self.admit(record, 0);

        while let Some((position, depth)) = self.queue.pop_front() {
            self.interrupt.check()?;

            let entity = self.entities[position].clone();
            let connections = match &entity {
                Entity::Transaction(tx) => self.transaction_connections(tx)?,
                Entity::User(user) => self.user_connections(user).await?,
            };

            for connection in connections {
                self.settle(connection, depth).await?;
            }
        }

        Ok(())
    }

    /// Initiator, counterparty and shared IP/device neighbours of a transaction.
    fn transaction_connections(&self, tx: &Transaction) -> Result<Vec<Connection>, Halt> {
        let me = EntityRef::Transaction(tx.id.clone());
        let sender = EntityRef::User(tx.sender_id.clone());

        let mut out = vec![Connection::direct(
            sender.clone(),
            None,
            classify(&sender, &me, SharedBasis::Initiator)?,
        )];

        // The counterparty is one hop from the sender, not from the
        // transaction, so it is never admitted from here.
        if let Some(cp) = &tx.counterparty_id {
            let counterparty = EntityRef::User(cp.clone());
            out.push(Connection::between_admitted(
                counterparty.clone(),
                classify(&sender, &counterparty, SharedBasis::CoTransaction)?,
            ));
        }

        out.extend(self.attribute_connections(&me, tx.attribute_values())?);
        Ok(out)
    }

    /// Sent transactions, co-transacting users and attribute-sharing users.
    async fn user_connections(&self, user: &User) -> Result<Vec<Connection>, Halt> {
        let me = EntityRef::User(user.id.clone());
        let mut out = Vec::new();
        let mut partners = BTreeMap::new();

        let sent = self
            .call(self.store.transactions_by_sender(&user.id))
            .await?;
        for tx in sent {
            if let Some(cp) = &tx.counterparty_id {
                let counterparty = EntityRef::User(cp.clone());
                if counterparty != me && !partners.contains_key(&counterparty) {
                    let rels = classify(&me, &counterparty, SharedBasis::CoTransaction)?;
                    partners.insert(counterparty, rels);
                }
            }
            let other = EntityRef::Transaction(tx.id.clone());
            let rels = classify(&me, &other, SharedBasis::Initiator)?;
            out.push(Connection::direct(other, Some(Entity::Transaction(tx)), rels));
        }

        let received = self
            .call(self.store.transactions_by_counterparty(&user.id))
            .await?;
        for tx in received {
            let sender = EntityRef::User(tx.sender_id);
            if sender != me && !partners.contains_key(&sender) {
                let rels = classify(&sender, &me, SharedBasis::CoTransaction)?;
                partners.insert(sender, rels);
            }
        }
        out.extend(
            partners
                .into_iter()
                .map(|(partner, rels)| Connection::direct(partner, None, rels)),
        );

        out.extend(self.attribute_connections(&me, user.attribute_values())?);
        Ok(out)
    }

    /// Entities sharing any of `values` with `me`, grouped per entity.
    fn attribute_connections(
        &self,
        me: &EntityRef,
        values: Vec<(AttributeKind, String)>,
    ) -> Result<Vec<Connection>, Halt> {
        let mut grouped: BTreeMap<EntityRef, Vec<Link>> = BTreeMap::new();

        for (kind, value) in values {
            for id in self.index.lookup(kind, &value) {
                let other = EntityRef::new(kind.owner(), id.clone());
                if other == *me {
                    continue;
                }
                let rels = classify(me, &other, SharedBasis::Attribute(kind))?;
                grouped
                    .entry(other)
                    .or_default()
                    .extend(rels.into_iter().map(|relationship| Link {
                        relationship,
                        evidence: Some((kind, value.clone())),
                    }));
            }
        }

        Ok(grouped
            .into_iter()
            .map(|(other, links)| Connection {
                other,
                record: None,
                links,
                admits: true,
            })
            .collect())
    }

    /// Record a connection found while inspecting an entity at `depth`.
    async fn settle(&mut self, connection: Connection, depth: usize) -> Result<(), Halt> {
        let Connection {
            other,
            record,
            mut links,
            admits,
        } = connection;

        links.retain(|link| {
            let (a, b) = link.relationship.endpoints();
            [a, b]
                .iter()
                .all(|end| *end == other || self.admitted.contains_key(end))
        });
        if links.is_empty() {
            return Ok(());
        }

        if let Some(&position) = self.admitted.get(&other) {
            let verified = verify(links, &self.entities[position]);
            self.record(verified);
            return Ok(());
        }
        if !admits {
            return Ok(());
        }

        if depth >= self.limits.max_depth || self.admitted.len() >= self.limits.max_nodes {
            // Only a live neighbour with verified evidence counts as refused.
            if !self.truncated {
                let live = match self.load(&other, record).await? {
                    Some(r) => !verify(links, &r).is_empty(),
                    None => false,
                };
                if live {
                    tracing::debug!(
                        depth,
                        admitted = self.admitted.len(),
                        refused = %other,
                        "Expansion limit reached"
                    );
                    self.truncated = true;
                }
            }
            return Ok(());
        }

        let Some(record) = self.load(&other, record).await? else {
            tracing::warn!(entity = %other, "Linked entity missing from store, skipping");
            return Ok(());
        };

        let verified = verify(links, &record);
        if verified.is_empty() {
            tracing::debug!(entity = %other, "Index entry is stale, skipping");
            return Ok(());
        }

        self.admit(record, depth + 1);
        self.record(verified);
        Ok(())
    }

    fn admit(&mut self, record: Entity, depth: usize) {
        let position = self.entities.len();
        self.admitted.insert(record.entity_ref(), position);
        self.entities.push(record);
        self.queue.push_back((position, depth));
        self.depth_reached = self.depth_reached.max(depth);
    }

    fn record(&mut self, relationships: Vec<Relationship>) {
        for relationship in relationships {
            if self.seen.insert(relationship.to_graph()) {
                self.relationships.push(relationship);
            }
        }
    }

    /// The record in hand, or a fresh fetch.
    async fn load(
        &self,
        entity: &EntityRef,
        record: Option<Entity>,
    ) -> Result<Option<Entity>, Halt> {
        match record {
            Some(r) => Ok(Some(r)),
            None => self.fetch(entity).await,
        }
    }

    async fn fetch(&self, entity: &EntityRef) -> Result<Option<Entity>, Halt> {
        Ok(match entity {
            EntityRef::User(id) => self
                .call(self.store.get_user(id))
                .await?
                .map(Entity::User),
            EntityRef::Transaction(id) => self
                .call(self.store.get_transaction(id))
                .await?
                .map(Entity::Transaction),
        })
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, Halt> {
        Ok(self.interrupt.guard(fut).await??)
    }

    fn finish(self) -> Expansion {
        Expansion {
            entities: self.entities,
            relationships: self.relationships,
            truncated: self.truncated,
            depth_reached: self.depth_reached,
        }
    }
}

/// Keep links whose attribute evidence is still present on `record`.
fn verify(links: Vec<Link>, record: &Entity) -> Vec<Relationship> {
    let mut current: Option<Vec<(AttributeKind, String)>> = None;
    links
        .into_iter()
        .filter(|link| match &link.evidence {
            None => true,
            Some(evidence) => current
                .get_or_insert_with(|| record.attribute_values())
                .contains(evidence),
        })
        .map(|link| link.relationship)
        .collect()
}
