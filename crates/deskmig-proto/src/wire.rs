//! Remote API records and envelopes.
//!
//! The remote payloads are loosely typed: most attributes are optional and
//! some are `null` rather than absent. These records accept that shape and
//! convert into the strict model types.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::category::FieldCategory;
use crate::error::Error;
use crate::field::{is_system_field, FieldDefinition, FieldOption, FieldType, PortalSettings};
use crate::form::{ConditionAudience, ConditionChild, FormCondition, TicketForm};

/// One page of a paginated collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page (possibly none).
    pub items: Vec<T>,
    /// Whether the server has more pages.
    pub has_more: bool,
    /// Cursor to request the next page with.
    pub after_cursor: Option<String>,
}

impl<T: DeserializeOwned> Page<T> {
    /// Parse a page envelope whose items live under `collection`.
    pub fn parse(body: &str, collection: &str) -> Result<Self, Error> {
        let mut envelope: Value = serde_json::from_str(body)?;

        let items = match envelope.get_mut(collection).map(Value::take) {
            Some(Value::Null) => Vec::new(),
            Some(items @ Value::Array(_)) => serde_json::from_value(items)?,
            Some(_) => {
                return Err(Error::Deserialization(format!(
                    "`{}` is not an array",
                    collection
                )))
            }
            None => return Err(Error::MissingKey(collection.to_string())),
        };

        let meta = envelope.get("meta");
        let has_more = meta
            .and_then(|m| m.get("has_more"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let after_cursor = meta
            .and_then(|m| m.get("after_cursor"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            items,
            has_more,
            after_cursor,
        })
    }
}

/// Extract the id of a freshly created object from a `{wrapper: {id}}` body.
pub fn created_id(body: &str, wrapper: &str) -> Result<u64, Error> {
    let envelope: Value = serde_json::from_str(body)?;
    envelope
        .get(wrapper)
        .and_then(|object| object.get("id"))
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::MissingKey(format!("{}.id", wrapper)))
}

/// A field option as returned by the remote API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireOption {
    /// Display name.
    pub name: String,
    /// Stored value.
    pub value: String,
    /// Position, absent on some categories.
    pub position: Option<i64>,
    /// Whether the option is preselected.
    pub default: Option<bool>,
    /// Whether the option is active.
    pub active: Option<bool>,
}

/// A custom field as returned by the remote API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireField {
    /// Instance-scoped id.
    pub id: u64,
    /// Field type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Title.
    pub title: String,
    /// Explicit key (user and organization fields).
    pub key: Option<String>,
    /// Checkbox tag.
    pub tag: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Position.
    pub position: Option<i64>,
    /// Active flag.
    pub active: Option<bool>,
    /// Required flag.
    pub required: Option<bool>,
    /// Validation pattern.
    pub regexp_for_validation: Option<String>,
    /// Options of choice-type fields.
    pub custom_field_options: Option<Vec<WireOption>>,
    /// Whether the field can be deleted.
    pub removable: Option<bool>,
    /// Creator; `-1` for the system user.
    pub creator_user_id: Option<i64>,
    /// Portal title.
    pub title_in_portal: Option<String>,
    /// Agent description.
    pub agent_description: Option<String>,
    /// Portal visibility.
    pub visible_in_portal: Option<bool>,
    /// Portal editability.
    pub editable_in_portal: Option<bool>,
    /// Portal requirement.
    pub required_in_portal: Option<bool>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl WireField {
    /// Convert into a model field of the given category.
    pub fn into_definition(self, category: FieldCategory) -> FieldDefinition {
        let system = is_system_field(
            &self.field_type,
            self.key.as_deref(),
            self.removable,
            self.creator_user_id,
        );
        // Built-ins are keyed by type: admins may rename their titles.
        let key = match non_empty(self.key) {
            Some(key) => key,
            None if system => self.field_type.as_str().to_string(),
            None => FieldDefinition::derived_key(&self.title, &self.field_type),
        };

        let options = self
            .custom_field_options
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(idx, o)| FieldOption {
                value: o.value,
                name: o.name,
                position: o.position.unwrap_or(idx as i64),
                active: o.active.unwrap_or(true),
                default: o.default.unwrap_or(false),
            })
            .collect();

        FieldDefinition {
            category,
            source_id: self.id,
            target_id: None,
            key,
            title: self.title,
            field_type: self.field_type,
            required: self.required.unwrap_or(false),
            active: self.active.unwrap_or(true),
            position: self.position.unwrap_or(0),
            description: self.description.unwrap_or_default(),
            tag: non_empty(self.tag).unwrap_or_default(),
            regexp_for_validation: non_empty(self.regexp_for_validation).unwrap_or_default(),
            portal: PortalSettings {
                title_in_portal: self.title_in_portal.unwrap_or_default(),
                agent_description: self.agent_description.unwrap_or_default(),
                visible_in_portal: self.visible_in_portal.unwrap_or(false),
                editable_in_portal: self.editable_in_portal.unwrap_or(false),
                required_in_portal: self.required_in_portal.unwrap_or(false),
            },
            options,
            system,
        }
    }
}

/// A conditional-visibility rule as returned by the remote API.
#[derive(Debug, Clone, Deserialize)]
pub struct WireCondition {
    /// Triggering field.
    pub parent_field_id: u64,
    /// Triggering value.
    #[serde(default)]
    pub value: Value,
    /// Revealed fields.
    #[serde(default)]
    pub child_fields: Vec<ConditionChild>,
}

impl WireCondition {
    fn into_condition(self, audience: ConditionAudience) -> FormCondition {
        FormCondition {
            audience,
            parent_field_id: self.parent_field_id,
            value: self.value,
            child_fields: self.child_fields,
        }
    }
}

/// A ticket form as returned by the remote API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireForm {
    /// Instance-scoped id.
    pub id: u64,
    /// Name.
    pub name: String,
    /// End-user name.
    pub display_name: Option<String>,
    /// Active flag.
    pub active: Option<bool>,
    /// End-user visibility.
    pub end_user_visible: Option<bool>,
    /// Position.
    pub position: Option<i64>,
    /// Default-form flag.
    pub default: Option<bool>,
    /// Field layout.
    pub ticket_field_ids: Option<Vec<u64>>,
    /// Agent rules.
    pub agent_conditions: Option<Vec<WireCondition>>,
    /// End-user rules.
    pub end_user_conditions: Option<Vec<WireCondition>>,
}

impl WireForm {
    /// Convert into a model form.
    pub fn into_form(self) -> TicketForm {
        let conditions = self
            .agent_conditions
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.into_condition(ConditionAudience::Agent))
            .chain(
                self.end_user_conditions
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| c.into_condition(ConditionAudience::EndUser)),
            )
            .collect();

        TicketForm {
            source_id: self.id,
            target_id: None,
            display_name: non_empty(self.display_name).unwrap_or_else(|| self.name.clone()),
            name: self.name,
            active: self.active.unwrap_or(true),
            end_user_visible: self.end_user_visible.unwrap_or(false),
            position: self.position.unwrap_or(0),
            default: self.default.unwrap_or(false),
            field_ids: self.ticket_field_ids.unwrap_or_default(),
            conditions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_with_cursor() {
        let body = r#"{
            "ticket_fields": [{"id": 1, "type": "text", "title": "Notes"}],
            "meta": {"has_more": true, "after_cursor": "abc"},
            "links": {"next": "https://example/api/v2/ticket_fields.json?page[after]=abc"}
        }"#;
        let page: Page<WireField> = Page::parse(body, "ticket_fields").unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.has_more);
        assert_eq!(page.after_cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_empty_page() {
        let body = r#"{"user_fields": [], "meta": {"has_more": false, "after_cursor": null}}"#;
        let page: Page<WireField> = Page::parse(body, "user_fields").unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);
        assert!(page.after_cursor.is_none());
    }

    #[test]
    fn test_parse_missing_collection() {
        let err = Page::<WireField>::parse(r#"{"error": "nope"}"#, "ticket_fields").unwrap_err();
        assert!(matches!(err, Error::MissingKey(_)));
    }

    #[test]
    fn test_created_id() {
        let body = r#"{"ticket_field": {"id": 501, "title": "x"}}"#;
        assert_eq!(created_id(body, "ticket_field").unwrap(), 501);
        assert!(created_id(body, "user_field").is_err());
    }

    #[test]
    fn test_wire_field_conversion() {
        let raw = r#"{
            "id": 77, "type": "tagger", "title": "Priority Level", "key": null,
            "description": null, "removable": true, "creator_user_id": 12,
            "custom_field_options": [
                {"id": 1, "name": "Low", "value": "p_low", "default": true},
                {"id": 2, "name": "High", "value": "p_high"}
            ]
        }"#;
        let wire: WireField = serde_json::from_str(raw).unwrap();
        let field = wire.into_definition(FieldCategory::Ticket);

        assert_eq!(field.source_id, 77);
        assert_eq!(field.key, "priority level:tagger");
        assert!(!field.system);
        assert_eq!(field.options.len(), 2);
        assert!(field.options[0].default);
        assert_eq!(field.options[1].position, 1);
        assert_eq!(field.description, "");
        assert!(field.tag.is_empty());
    }

    #[test]
    fn test_blank_tag_and_pattern_are_unset() {
        let raw = r#"{"id": 5, "type": "regexp", "title": "Badge", "tag": "  ", "regexp_for_validation": ""}"#;
        let wire: WireField = serde_json::from_str(raw).unwrap();
        let field = wire.into_definition(FieldCategory::Ticket);
        assert_eq!(field.tag, "");
        assert_eq!(field.regexp_for_validation, "");

        let payload = field.create_payload();
        assert!(payload["ticket_field"].get("tag").is_none());
        assert!(payload["ticket_field"].get("regexp_for_validation").is_none());
    }

    #[test]
    fn test_wire_field_system() {
        let raw = r#"{"id": 1, "type": "subject", "title": "Subject", "removable": false}"#;
        let wire: WireField = serde_json::from_str(raw).unwrap();
        let field = wire.into_definition(FieldCategory::Ticket);
        assert!(field.system);
        assert_eq!(field.key, "subject");
    }

    #[test]
    fn test_wire_form_conversion() {
        let raw = r#"{
            "id": 9, "name": "Main Form", "ticket_field_ids": [1, 2],
            "agent_conditions": [
                {"parent_field_id": 2, "value": "p_high", "child_fields": [{"id": 1, "is_required": true}]}
            ],
            "end_user_conditions": null
        }"#;
        let wire: WireForm = serde_json::from_str(raw).unwrap();
        let form = wire.into_form();

        assert_eq!(form.display_name, "Main Form");
        assert_eq!(form.field_ids, vec![1, 2]);

        let blank: WireForm =
            serde_json::from_str(r#"{"id": 10, "name": "Billing", "display_name": ""}"#).unwrap();
        assert_eq!(blank.into_form().display_name, "Billing");
        assert_eq!(form.conditions.len(), 1);
        assert_eq!(form.conditions[0].audience, ConditionAudience::Agent);
        assert!(form.conditions[0].child_fields[0].is_required);
    }
}
