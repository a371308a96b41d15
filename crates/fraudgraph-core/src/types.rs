//! Core domain types for the fraud relationship graph.
//!
//! Users and transactions are the only entity kinds. Their ids are distinct
//! newtypes so that edge constructors can demand the right endpoint kind.

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

// ── Ids ───────────────────────────────────────────────────────────

/// Stable identifier of a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Unique identifier of a transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TransactionId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(UserId);
string_id!(TransactionId);

// ── Entity kinds ──────────────────────────────────────────────────

/// The two kinds of entity a graph can contain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    #[serde(alias = "user", alias = "USER")]
    User,
    #[serde(alias = "transaction", alias = "TRANSACTION", alias = "tx")]
    Transaction,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "User",
            EntityKind::Transaction => "Transaction",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    /// Accepts `user` / `transaction` in any case, plus the `tx` shorthand.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(EntityKind::User),
            "transaction" | "tx" => Ok(EntityKind::Transaction),
            _ => Err(CoreError::UnknownEntityKind(s.to_string())),
        }
    }
}

/// A typed reference to one entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(tag = "type", content = "id")]
pub enum EntityRef {
    User(UserId),
    Transaction(TransactionId),
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        match kind {
            EntityKind::User => EntityRef::User(UserId(id.into())),
            EntityKind::Transaction => EntityRef::Transaction(TransactionId(id.into())),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRef::User(id) => id.as_str(),
            EntityRef::Transaction(id) => id.as_str(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::User(_) => EntityKind::User,
            EntityRef::Transaction(_) => EntityKind::Transaction,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

// ── Entities ──────────────────────────────────────────────────────

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A user account. Every identifying attribute is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payment_methods: BTreeSet<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn with_payment_method(mut self, token: &str) -> Self {
        self.payment_methods.insert(token.to_string());
        self
    }

    /// Reject records the store must never accept.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.as_str().trim().is_empty() {
            return Err(CoreError::InvalidEntity {
                kind: EntityKind::User.to_string(),
                id: self.id.to_string(),
                reason: "id must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// A transfer initiated by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    /// Absent or `null` reads as zero.
    #[serde(default, deserialize_with = "null_as_default")]
    pub amount: f64,
    /// Logical ordering only; no calendar semantics.
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: i64,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    pub sender_id: UserId,
    /// The receiving user, when known.
    #[serde(default)]
    pub counterparty_id: Option<UserId>,
    /// Opaque to the resolver; copied into display props only.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Transaction {
    pub fn new(id: impl Into<String>, sender_id: impl Into<String>, amount: f64) -> Self {
        Self {
            id: TransactionId(id.into()),
            amount,
            timestamp: 0,
            ip: None,
            device_id: None,
            sender_id: UserId(sender_id.into()),
            counterparty_id: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip = Some(ip.to_string());
        self
    }

    pub fn with_device(mut self, device_id: &str) -> Self {
        self.device_id = Some(device_id.to_string());
        self
    }

    pub fn with_counterparty(mut self, user_id: &str) -> Self {
        self.counterparty_id = Some(UserId::from(user_id));
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Reject records the store must never accept.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |reason: &str| CoreError::InvalidEntity {
            kind: EntityKind::Transaction.to_string(),
            id: self.id.to_string(),
            reason: reason.to_string(),
        };

        if self.id.as_str().trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.sender_id.as_str().trim().is_empty() {
            return Err(invalid("sender id must not be empty"));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(invalid("amount must be a non-negative number"));
        }
        if self.counterparty_id.as_ref() == Some(&self.sender_id) {
            return Err(invalid("counterparty must differ from sender"));
        }
        Ok(())
    }
}

/// A fetched user or transaction record.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    User(User),
    Transaction(Transaction),
}

impl Entity {
    pub fn entity_ref(&self) -> EntityRef {
        match self {
            Entity::User(u) => EntityRef::User(u.id.clone()),
            Entity::Transaction(t) => EntityRef::Transaction(t.id.clone()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::User(u) => u.id.as_str(),
            Entity::Transaction(t) => t.id.as_str(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::User(_) => EntityKind::User,
            Entity::Transaction(_) => EntityKind::Transaction,
        }
    }

    /// Normalized identifying values carried by the record.
    pub fn attribute_values(&self) -> Vec<(crate::AttributeKind, String)> {
        match self {
            Entity::User(u) => u.attribute_values(),
            Entity::Transaction(t) => t.attribute_values(),
        }
    }
}
