//! Snapshot of one instance's field and form definitions.

use crate::category::FieldCategory;
use crate::field::FieldDefinition;
use crate::form::TicketForm;

/// Complete read of an instance, each list in the order the server returned it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceSchema {
    /// Ticket fields.
    pub ticket_fields: Vec<FieldDefinition>,
    /// User fields.
    pub user_fields: Vec<FieldDefinition>,
    /// Organization fields.
    pub organization_fields: Vec<FieldDefinition>,
    /// Ticket forms.
    pub forms: Vec<TicketForm>,
}

impl InstanceSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields of one category.
    pub fn fields(&self, category: FieldCategory) -> &[FieldDefinition] {
        match category {
            FieldCategory::Ticket => &self.ticket_fields,
            FieldCategory::User => &self.user_fields,
            FieldCategory::Organization => &self.organization_fields,
        }
    }

    /// Mutable fields of one category.
    pub fn fields_mut(&mut self, category: FieldCategory) -> &mut Vec<FieldDefinition> {
        match category {
            FieldCategory::Ticket => &mut self.ticket_fields,
            FieldCategory::User => &mut self.user_fields,
            FieldCategory::Organization => &mut self.organization_fields,
        }
    }

    /// Add a field to its category list.
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields_mut(field.category).push(field);
        self
    }

    /// Add a form.
    pub fn with_form(mut self, form: TicketForm) -> Self {
        self.forms.push(form);
        self
    }

    /// All fields, ticket then user then organization.
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        FieldCategory::ALL
            .into_iter()
            .flat_map(move |category| self.fields(category).iter())
    }

    /// Total number of objects in the snapshot.
    pub fn object_count(&self) -> usize {
        self.ticket_fields.len()
            + self.user_fields.len()
            + self.organization_fields.len()
            + self.forms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;

    #[test]
    fn test_with_field_routes_by_category() {
        let schema = InstanceSchema::new()
            .with_field(FieldDefinition::new(
                FieldCategory::User,
                1,
                "a",
                "A",
                FieldType::Text,
            ))
            .with_field(FieldDefinition::new(
                FieldCategory::Ticket,
                2,
                "b",
                "B",
                FieldType::Text,
            ))
            .with_form(TicketForm::new(3, "Form", vec![2]));

        assert_eq!(schema.user_fields.len(), 1);
        assert_eq!(schema.ticket_fields.len(), 1);
        assert_eq!(schema.object_count(), 3);

        let order: Vec<u64> = schema.all_fields().map(|f| f.source_id).collect();
        assert_eq!(order, vec![2, 1]);
    }
}
