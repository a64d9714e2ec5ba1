//! Dependency ordering and identifier remapping.
//!
//! Fields are created before every form, and a form's field references are
//! rewritten from source ids to target ids before it is submitted. Only a
//! [`ResolvedForm`] can produce a form payload, so a form carrying
//! source-scoped ids cannot reach the target.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use deskmig_proto::{
    ConditionAudience, EntityKind, FieldCategory, FieldDefinition, FormCondition, TicketForm,
};

use crate::error::MigrationError;

/// Source id to target id mapping, scoped to one run.
///
/// Ids are only unique within a kind, so the kind is part of the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierMap {
    ids: HashMap<(EntityKind, u64), u64>,
}

impl IdentifierMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `source_id` exists in the target as `target_id`.
    pub fn insert(&mut self, kind: EntityKind, source_id: u64, target_id: u64) {
        self.ids.insert((kind, source_id), target_id);
    }

    /// Target id of a source object.
    pub fn get(&self, kind: EntityKind, source_id: u64) -> Option<u64> {
        self.ids.get(&(kind, source_id)).copied()
    }

    /// Target id of a source ticket field.
    pub fn ticket_field(&self, source_id: u64) -> Option<u64> {
        self.get(EntityKind::Field(FieldCategory::Ticket), source_id)
    }

    /// Number of mappings.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// One creation in dependency order.
#[derive(Debug, Clone, PartialEq)]
pub enum CreationStep {
    /// Create a field.
    Field(FieldDefinition),
    /// Create a form once its fields exist.
    Form(TicketForm),
}

impl CreationStep {
    /// Entity kind created by this step.
    pub fn kind(&self) -> EntityKind {
        match self {
            CreationStep::Field(field) => field.kind(),
            CreationStep::Form(_) => EntityKind::TicketForm,
        }
    }

    /// Display name of the object.
    pub fn name(&self) -> &str {
        match self {
            CreationStep::Field(field) => &field.title,
            CreationStep::Form(form) => &form.name,
        }
    }
}

/// Ordered list of objects to create.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreationPlan {
    /// Steps in execution order.
    pub steps: Vec<CreationStep>,
}

impl CreationPlan {
    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if there is nothing to create.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Iterate over the steps.
    pub fn iter(&self) -> impl Iterator<Item = &CreationStep> {
        self.steps.iter()
    }
}

/// A form whose field references all point into the target.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedForm {
    form: TicketForm,
}

impl ResolvedForm {
    /// The form, with target ids in its layout and rules.
    pub fn form(&self) -> &TicketForm {
        &self.form
    }

    /// Build the create payload.
    pub fn create_payload(&self) -> Value {
        let form = &self.form;
        let mut body = Map::new();
        body.insert("name".into(), json!(form.name));
        if !form.display_name.is_empty() {
            body.insert("display_name".into(), json!(form.display_name));
        }
        body.insert("active".into(), json!(form.active));
        body.insert("end_user_visible".into(), json!(form.end_user_visible));
        body.insert("position".into(), json!(form.position));
        body.insert("ticket_field_ids".into(), json!(form.field_ids));

        for (audience, attribute) in [
            (ConditionAudience::Agent, "agent_conditions"),
            (ConditionAudience::EndUser, "end_user_conditions"),
        ] {
            let rules: Vec<Value> = form
                .conditions
                .iter()
                .filter(|c| c.audience == audience)
                .map(|c| {
                    json!({
                        "parent_field_id": c.parent_field_id,
                        "value": c.value,
                        "child_fields": c.child_fields,
                    })
                })
                .collect();
            if !rules.is_empty() {
                body.insert(attribute.into(), Value::Array(rules));
            }
        }

        json!({ "ticket_form": Value::Object(body) })
    }
}

/// Orders creations and rewrites form references.
pub struct DependencyResolver;

impl DependencyResolver {
    /// Order missing objects: every field, in source order, then every form.
    pub fn order(fields: Vec<FieldDefinition>, forms: Vec<TicketForm>) -> CreationPlan {
        let steps = fields
            .into_iter()
            .map(CreationStep::Field)
            .chain(forms.into_iter().map(CreationStep::Form))
            .collect();
        CreationPlan { steps }
    }

    /// Rewrite every field reference of `form` through `ids`.
    pub fn resolve_form(form: &TicketForm, ids: &IdentifierMap) -> Result<ResolvedForm, MigrationError> {
        let lookup = |field_id: u64| {
            ids.ticket_field(field_id)
                .ok_or_else(|| MigrationError::UnresolvedDependency {
                    form: form.name.clone(),
                    field_id,
                })
        };

        let field_ids = form
            .field_ids
            .iter()
            .map(|id| lookup(*id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut conditions = Vec::with_capacity(form.conditions.len());
        for condition in &form.conditions {
            let mut child_fields = condition.child_fields.clone();
            for child in &mut child_fields {
                child.id = lookup(child.id)?;
            }
            conditions.push(FormCondition {
                audience: condition.audience,
                parent_field_id: lookup(condition.parent_field_id)?,
                value: condition.value.clone(),
                child_fields,
            });
        }

        Ok(ResolvedForm {
            form: TicketForm {
                field_ids,
                conditions,
                ..form.clone()
            },
        })
    }
}
