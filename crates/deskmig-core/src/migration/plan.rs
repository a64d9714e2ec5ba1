//! Migration plan.
//!
//! A plan is the curated list of objects a run works through: fields in
//! creation order, then forms. Entries that already carry a target id are
//! present in the target; they are never created and only seed the
//! identifier map.

use deskmig_proto::{EntityKind, FieldCategory, FieldDefinition, TicketForm};

use super::diff::SchemaDiff;
use super::resolve::{CreationPlan, DependencyResolver, IdentifierMap};

/// Curated objects for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationPlan {
    /// Fields, in creation order.
    pub fields: Vec<FieldDefinition>,
    /// Forms, in creation order.
    pub forms: Vec<TicketForm>,
}

impl MigrationPlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a plan from a diff: every considered source object in source
    /// order, matched ones carrying their target id.
    pub fn from_diff(diff: &SchemaDiff) -> Self {
        let fields = FieldCategory::ALL
            .into_iter()
            .filter_map(|category| diff.field_diff(category))
            .flat_map(|d| d.entries.iter().cloned())
            .collect();

        Self {
            fields,
            forms: diff.forms.entries.clone(),
        }
    }

    /// Add a field.
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a form.
    pub fn with_form(mut self, form: TicketForm) -> Self {
        self.forms.push(form);
        self
    }

    /// Check if the plan has no entries.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.forms.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.fields.len() + self.forms.len()
    }

    /// Map seeded with every entry already present in the target.
    pub fn seed_identifiers(&self) -> IdentifierMap {
        let mut ids = IdentifierMap::new();
        for field in &self.fields {
            if let Some(target_id) = field.target_id {
                ids.insert(field.kind(), field.source_id, target_id);
            }
        }
        for form in &self.forms {
            if let Some(target_id) = form.target_id {
                ids.insert(EntityKind::TicketForm, form.source_id, target_id);
            }
        }
        ids
    }

    /// Entries that still have to be created, in dependency order.
    pub fn creation_plan(&self) -> CreationPlan {
        DependencyResolver::order(
            self.fields
                .iter()
                .filter(|f| f.target_id.is_none() && !f.system)
                .cloned()
                .collect(),
            self.forms
                .iter()
                .filter(|f| f.target_id.is_none() && !f.default)
                .cloned()
                .collect(),
        )
    }

    /// Entries present in the target, excluding built-in fields.
    pub fn existing(&self) -> impl Iterator<Item = (EntityKind, &str)> {
        let fields = self
            .fields
            .iter()
            .filter(|f| f.target_id.is_some() && !f.system)
            .map(|f| (f.kind(), f.title.as_str()));
        let forms = self
            .forms
            .iter()
            .filter(|f| f.target_id.is_some())
            .map(|f| (EntityKind::TicketForm, f.name.as_str()));
        fields.chain(forms)
    }
}
