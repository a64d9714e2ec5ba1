//! Object categories and entity kinds.
//!
//! Every remote object lives in exactly one category. Each category has its
//! own endpoint, its own JSON wrapper key and its own numeric id space, so
//! ids are only ever meaningful together with their [`EntityKind`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Namespace of a custom field definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldCategory {
    /// Ticket fields.
    #[serde(rename = "ticket_field")]
    Ticket,
    /// User fields.
    #[serde(rename = "user_field")]
    User,
    /// Organization fields.
    #[serde(rename = "organization_field")]
    Organization,
}

impl FieldCategory {
    /// All field categories, in the order they are read and migrated.
    pub const ALL: [FieldCategory; 3] = [
        FieldCategory::Ticket,
        FieldCategory::User,
        FieldCategory::Organization,
    ];

    /// Collection endpoint name (e.g. `ticket_fields`).
    pub fn endpoint(&self) -> &'static str {
        match self {
            FieldCategory::Ticket => "ticket_fields",
            FieldCategory::User => "user_fields",
            FieldCategory::Organization => "organization_fields",
        }
    }

    /// Singular wrapper key used in create payloads (e.g. `ticket_field`).
    pub fn wrapper(&self) -> &'static str {
        match self {
            FieldCategory::Ticket => "ticket_field",
            FieldCategory::User => "user_field",
            FieldCategory::Organization => "organization_field",
        }
    }

    /// Human-readable label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            FieldCategory::Ticket => "Ticket Fields",
            FieldCategory::User => "User Fields",
            FieldCategory::Organization => "Org Fields",
        }
    }
}

impl fmt::Display for FieldCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wrapper())
    }
}

/// Kind of a remote object the migration can create or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    /// A custom field of the given category.
    Field(FieldCategory),
    /// A ticket form.
    TicketForm,
}

impl EntityKind {
    /// All entity kinds, fields first.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Field(FieldCategory::Ticket),
        EntityKind::Field(FieldCategory::User),
        EntityKind::Field(FieldCategory::Organization),
        EntityKind::TicketForm,
    ];

    /// Collection endpoint name.
    pub fn endpoint(&self) -> &'static str {
        match self {
            EntityKind::Field(category) => category.endpoint(),
            EntityKind::TicketForm => "ticket_forms",
        }
    }

    /// Singular wrapper key.
    pub fn wrapper(&self) -> &'static str {
        match self {
            EntityKind::Field(category) => category.wrapper(),
            EntityKind::TicketForm => "ticket_form",
        }
    }

    /// Human-readable label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Field(category) => category.label(),
            EntityKind::TicketForm => "Ticket Forms",
        }
    }

    /// Resolve a kind from its collection endpoint name.
    pub fn from_endpoint(endpoint: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.endpoint() == endpoint)
    }

    /// Whether this kind is a field category.
    pub fn is_field(&self) -> bool {
        matches!(self, EntityKind::Field(_))
    }
}

impl From<FieldCategory> for EntityKind {
    fn from(category: FieldCategory) -> Self {
        EntityKind::Field(category)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wrapper())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.wrapper() == s.trim())
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

impl Serialize for EntityKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wrapper())
    }
}

impl<'de> Deserialize<'de> for EntityKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
