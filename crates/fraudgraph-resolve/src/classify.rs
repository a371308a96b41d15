//! Edge classification.
//!
//! Relationships are a closed enum whose variants carry typed ids, so a
//! `SAME_IP` between a user and a transaction cannot be constructed.
//! [`classify`] maps a pair of entities plus the basis that links them to
//! the relationships the viewer should draw.

use fraudgraph_core::{AttributeKind, EntityKind, EntityRef, TransactionId, UserId};

use crate::error::ClassifyError;
use crate::types::{GraphRelationship, RelationshipType};

/// Why two entities are considered linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedBasis {
    /// The user initiated the transaction.
    Initiator,
    /// Both entities exhibit the same normalized attribute value.
    Attribute(AttributeKind),
    /// Both users are parties to one transaction.
    CoTransaction,
}

impl std::fmt::Display for SharedBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SharedBasis::Initiator => f.write_str("initiator link"),
            SharedBasis::Attribute(kind) => write!(f, "shared {kind}"),
            SharedBasis::CoTransaction => f.write_str("co-transaction link"),
        }
    }
}

/// A typed relationship between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Relationship {
    Sent {
        user: UserId,
        transaction: TransactionId,
    },
    ReceivedBy {
        transaction: TransactionId,
        user: UserId,
    },
    SameIp(TransactionId, TransactionId),
    SameDevice(TransactionId, TransactionId),
    SharedAttribute {
        a: UserId,
        b: UserId,
        attribute: AttributeKind,
    },
    Direct(UserId, UserId),
}

impl Relationship {
    /// `SHARED_ATTRIBUTE` for a user-level attribute kind.
    pub fn shared_attribute(
        a: UserId,
        b: UserId,
        attribute: AttributeKind,
    ) -> Result<Self, ClassifyError> {
        if attribute.owner() != EntityKind::User {
            return Err(ClassifyError::NotUserAttribute(attribute));
        }
        Ok(Relationship::SharedAttribute { a, b, attribute })
    }

    pub fn rel_type(&self) -> RelationshipType {
        match self {
            Relationship::Sent { .. } => RelationshipType::Sent,
            Relationship::ReceivedBy { .. } => RelationshipType::ReceivedBy,
            Relationship::SameIp(..) => RelationshipType::SameIp,
            Relationship::SameDevice(..) => RelationshipType::SameDevice,
            Relationship::SharedAttribute { .. } => RelationshipType::SharedAttribute,
            Relationship::Direct(..) => RelationshipType::Direct,
        }
    }

    /// Both endpoints, in declared direction.
    pub fn endpoints(&self) -> (EntityRef, EntityRef) {
        match self {
            Relationship::Sent { user, transaction } => (
                EntityRef::User(user.clone()),
                EntityRef::Transaction(transaction.clone()),
            ),
            Relationship::ReceivedBy { transaction, user } => (
                EntityRef::Transaction(transaction.clone()),
                EntityRef::User(user.clone()),
            ),
            Relationship::SameIp(a, b) | Relationship::SameDevice(a, b) => (
                EntityRef::Transaction(a.clone()),
                EntityRef::Transaction(b.clone()),
            ),
            Relationship::SharedAttribute { a, b, .. } | Relationship::Direct(a, b) => {
                (EntityRef::User(a.clone()), EntityRef::User(b.clone()))
            }
        }
    }

    /// Wire form. Symmetric relationships get their endpoints in
    /// lexicographic order so the same link found from either side
    /// deduplicates.
    pub fn to_graph(&self) -> GraphRelationship {
        let rel_type = self.rel_type();
        let (from, to) = self.endpoints();
        let (mut from, mut to) = (from.id().to_string(), to.id().to_string());
        if rel_type.is_symmetric() && to < from {
            std::mem::swap(&mut from, &mut to);
        }
        let attribute = match self {
            Relationship::SharedAttribute { attribute, .. } => Some(*attribute),
            _ => None,
        };
        GraphRelationship {
            from,
            to,
            rel_type,
            attribute,
        }
    }
}

/// Decide which relationships link `a` and `b` on the given basis.
///
/// Returns an empty list when `a` and `b` are the same entity.
pub fn classify(
    a: &EntityRef,
    b: &EntityRef,
    basis: SharedBasis,
) -> Result<Vec<Relationship>, ClassifyError> {
    if a == b {
        return Ok(Vec::new());
    }

    let mismatch = || ClassifyError::KindMismatch {
        basis: basis.to_string(),
        a: a.kind(),
        b: b.kind(),
    };

    match basis {
        SharedBasis::Initiator => {
            let (user, transaction) = match (a, b) {
                (EntityRef::User(u), EntityRef::Transaction(t))
                | (EntityRef::Transaction(t), EntityRef::User(u)) => (u, t),
                _ => return Err(mismatch()),
            };
            Ok(vec![
                Relationship::Sent {
                    user: user.clone(),
                    transaction: transaction.clone(),
                },
                Relationship::ReceivedBy {
                    transaction: transaction.clone(),
                    user: user.clone(),
                },
            ])
        }
        SharedBasis::Attribute(kind @ (AttributeKind::Ip | AttributeKind::Device)) => {
            match (a, b) {
                (EntityRef::Transaction(x), EntityRef::Transaction(y)) => {
                    Ok(vec![if kind == AttributeKind::Ip {
                        Relationship::SameIp(x.clone(), y.clone())
                    } else {
                        Relationship::SameDevice(x.clone(), y.clone())
                    }])
                }
                _ => Err(mismatch()),
            }
        }
        SharedBasis::Attribute(kind) => match (a, b) {
            (EntityRef::User(x), EntityRef::User(y)) => {
                Ok(vec![Relationship::shared_attribute(x.clone(), y.clone(), kind)?])
            }
            _ => Err(mismatch()),
        },
        SharedBasis::CoTransaction => match (a, b) {
            (EntityRef::User(x), EntityRef::User(y)) => {
                Ok(vec![Relationship::Direct(x.clone(), y.clone())])
            }
            _ => Err(mismatch()),
        },
    }
}
