//! Ticket form definitions.
//!
//! A form is a dependent object: its layout and its conditional-visibility
//! rules reference ticket fields by id. Those ids are scoped to the instance
//! the form was read from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::category::EntityKind;
use crate::key::NaturalKey;

/// Who a conditional-visibility rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionAudience {
    /// Agent interface.
    Agent,
    /// End-user portal.
    EndUser,
}

/// A field shown when a condition matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionChild {
    /// Field id.
    pub id: u64,
    /// Whether the child becomes required.
    #[serde(default)]
    pub is_required: bool,
    /// Status-dependent requirement rules, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_on_statuses: Option<Value>,
}

/// Conditional-visibility rule of a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormCondition {
    /// Audience of the rule.
    pub audience: ConditionAudience,
    /// Field whose value triggers the rule.
    pub parent_field_id: u64,
    /// Triggering value.
    pub value: Value,
    /// Fields revealed by the rule.
    pub child_fields: Vec<ConditionChild>,
}

/// A ticket form read from, or destined for, an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketForm {
    /// Id in the source instance.
    pub source_id: u64,
    /// Id in the target instance, once it exists there.
    pub target_id: Option<u64>,
    /// Agent-facing name; also the natural key.
    pub name: String,
    /// End-user-facing name; the remote uses `name` when this is empty.
    pub display_name: String,
    /// Whether the form is active.
    pub active: bool,
    /// Whether end users can pick the form.
    pub end_user_visible: bool,
    /// Position in the form list.
    pub position: i64,
    /// The instance's default form, which is never migrated.
    pub default: bool,
    /// Field layout, as ticket-field ids.
    pub field_ids: Vec<u64>,
    /// Conditional-visibility rules.
    pub conditions: Vec<FormCondition>,
}

impl TicketForm {
    /// Create an active form with the given layout.
    pub fn new(source_id: u64, name: impl Into<String>, field_ids: Vec<u64>) -> Self {
        let name = name.into();
        Self {
            source_id,
            target_id: None,
            display_name: name.clone(),
            name,
            active: true,
            end_user_visible: false,
            position: 0,
            default: false,
            field_ids,
            conditions: Vec::new(),
        }
    }

    /// Add a conditional-visibility rule.
    pub fn with_condition(mut self, condition: FormCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Set the target id.
    pub fn with_target_id(mut self, target_id: u64) -> Self {
        self.target_id = Some(target_id);
        self
    }

    /// Matching key across instances (case-insensitive name).
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(EntityKind::TicketForm, self.name.trim().to_lowercase())
    }

    /// Every field id this form references, layout and rules combined.
    pub fn referenced_field_ids(&self) -> BTreeSet<u64> {
        let mut ids: BTreeSet<u64> = self.field_ids.iter().copied().collect();
        for condition in &self.conditions {
            ids.insert(condition.parent_field_id);
            ids.extend(condition.child_fields.iter().map(|c| c.id));
        }
        ids
    }
}
