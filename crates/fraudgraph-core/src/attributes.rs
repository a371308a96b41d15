//! Identifying attributes and their normalized forms.
//!
//! Two entities are linked by an attribute only when their normalized values
//! are equal and non-empty. Normalization is applied both when indexing and
//! when looking up, so callers may pass raw values.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{EntityKind, Transaction, User};

/// A kind of identifying attribute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Ip,
    Device,
    Email,
    Phone,
    Address,
    PaymentMethod,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 6] = [
        AttributeKind::Ip,
        AttributeKind::Device,
        AttributeKind::Email,
        AttributeKind::Phone,
        AttributeKind::Address,
        AttributeKind::PaymentMethod,
    ];

    /// Attributes that link users to users.
    pub const USER: [AttributeKind; 4] = [
        AttributeKind::Email,
        AttributeKind::Phone,
        AttributeKind::Address,
        AttributeKind::PaymentMethod,
    ];

    /// Attributes that link transactions to transactions.
    pub const TRANSACTION: [AttributeKind; 2] = [AttributeKind::Ip, AttributeKind::Device];

    /// Dense position in [`AttributeKind::ALL`].
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// The entity kind carrying this attribute.
    pub fn owner(self) -> EntityKind {
        match self {
            AttributeKind::Ip | AttributeKind::Device => EntityKind::Transaction,
            _ => EntityKind::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttributeKind::Ip => "ip",
            AttributeKind::Device => "device",
            AttributeKind::Email => "email",
            AttributeKind::Phone => "phone",
            AttributeKind::Address => "address",
            AttributeKind::PaymentMethod => "payment_method",
        }
    }

    /// Normalize a raw value. `None` means the value must not be indexed.
    pub fn normalize(self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let normalized = match self {
            AttributeKind::Email | AttributeKind::Device => trimmed.to_lowercase(),
            AttributeKind::Phone => trimmed.chars().filter(|c| c.is_ascii_digit()).collect(),
            AttributeKind::Address => normalize_address(trimmed),
            AttributeKind::Ip => normalize_ip(trimmed),
            AttributeKind::PaymentMethod => trimmed.to_string(),
        };

        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ip" => Ok(AttributeKind::Ip),
            "device" | "device_id" => Ok(AttributeKind::Device),
            "email" => Ok(AttributeKind::Email),
            "phone" => Ok(AttributeKind::Phone),
            "address" => Ok(AttributeKind::Address),
            "payment_method" | "payment" => Ok(AttributeKind::PaymentMethod),
            _ => Err(CoreError::UnknownAttributeKind(s.to_string())),
        }
    }
}

fn normalize_address(raw: &str) -> String {
    let folded: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_ip(raw: &str) -> String {
    match raw.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        Ok(IpAddr::V4(v4)) => v4.to_string(),
        Err(_) => raw.to_lowercase(),
    }
}

impl User {
    /// Normalized `(kind, value)` pairs this user exhibits. Absent or empty
    /// attributes are skipped.
    pub fn attribute_values(&self) -> Vec<(AttributeKind, String)> {
        let mut values = Vec::new();
        let singles = [
            (AttributeKind::Email, &self.email),
            (AttributeKind::Phone, &self.phone),
            (AttributeKind::Address, &self.address),
        ];
        for (kind, raw) in singles {
            if let Some(value) = raw.as_deref().and_then(|v| kind.normalize(v)) {
                values.push((kind, value));
            }
        }
        for token in &self.payment_methods {
            if let Some(value) = AttributeKind::PaymentMethod.normalize(token) {
                values.push((AttributeKind::PaymentMethod, value));
            }
        }
        values.sort();
        values.dedup();
        values
    }
}

impl Transaction {
    /// Normalized `(kind, value)` pairs this transaction exhibits.
    pub fn attribute_values(&self) -> Vec<(AttributeKind, String)> {
        let mut values = Vec::new();
        let singles = [
            (AttributeKind::Ip, &self.ip),
            (AttributeKind::Device, &self.device_id),
        ];
        for (kind, raw) in singles {
            if let Some(value) = raw.as_deref().and_then(|v| kind.normalize(v)) {
                values.push((kind, value));
            }
        }
        values
    }
}
