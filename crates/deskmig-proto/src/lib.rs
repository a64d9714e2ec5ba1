//! deskmig data model and remote wire formats.
//!
//! This crate defines the objects the migration moves between two helpdesk
//! instances and the shapes in which the remote API returns them.
//!
//! # Modules
//!
//! - [`category`] - Field categories and entity kinds
//! - [`field`] - Custom field definitions and their create payloads
//! - [`form`] - Ticket forms and their conditional-visibility rules
//! - [`key`] - Natural keys used to match objects across instances
//! - [`schema`] - Snapshot of one instance
//! - [`wire`] - Remote records and paginated envelopes
//! - [`error`] - Decoding error types

pub mod category;
pub mod error;
pub mod field;
pub mod form;
pub mod key;
pub mod schema;
pub mod wire;

pub use error::Error;

// Re-export commonly used types at crate root
pub use category::{EntityKind, FieldCategory};
pub use field::{FieldDefinition, FieldOption, FieldType, PortalSettings};
pub use form::{ConditionAudience, ConditionChild, FormCondition, TicketForm};
pub use key::NaturalKey;
pub use schema::InstanceSchema;
pub use wire::{created_id, Page, WireField, WireForm};
