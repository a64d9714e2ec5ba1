//! Custom field definitions.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::category::{EntityKind, FieldCategory};
use crate::key::NaturalKey;

/// Keys and types of built-in fields that exist in every instance.
///
/// These are never migrated: the target already has them and the remote API
/// refuses to create them.
pub const SYSTEM_KEYS: &[&str] = &[
    "subject",
    "description",
    "status",
    "tickettype",
    "priority",
    "group",
    "assignee",
    "brand",
    "satisfaction_rating",
    "custom_status",
    "email",
    "name",
    "time_zone",
    "locale_id",
    "organization_id",
    "role",
    "phone",
    "mobile",
    "whatsapp",
    "facebook",
    "twitter",
    "google",
    "photo",
    "authenticity_token",
    "active",
    "alias",
    "signature",
    "shared_phone_number",
    "domain_names",
    "tags",
    "shared_tickets",
    "shared_comments",
];

/// Remote field type.
///
/// The set is closed over the types the migration knows how to serialize.
/// Anything else is kept verbatim in [`FieldType::Unknown`] and passed through
/// to the target untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Single-line text.
    Text,
    /// Multi-line text.
    Textarea,
    /// Whole number.
    Integer,
    /// Decimal number.
    Decimal,
    /// Calendar date.
    Date,
    /// Boolean checkbox.
    Checkbox,
    /// Text validated by a regular expression.
    Regexp,
    /// Ticket-field dropdown.
    Tagger,
    /// User/organization-field dropdown.
    Dropdown,
    /// Multi-select list.
    Multiselect,
    /// Lookup relationship to another object.
    Lookup,
    /// Type not modelled here.
    Unknown(String),
}

impl FieldType {
    /// Wire name of the type.
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Date => "date",
            FieldType::Checkbox => "checkbox",
            FieldType::Regexp => "regexp",
            FieldType::Tagger => "tagger",
            FieldType::Dropdown => "dropdown",
            FieldType::Multiselect => "multiselect",
            FieldType::Lookup => "lookup",
            FieldType::Unknown(raw) => raw,
        }
    }

    /// Whether values are chosen from a list of options.
    pub fn has_options(&self) -> bool {
        matches!(
            self,
            FieldType::Tagger | FieldType::Dropdown | FieldType::Multiselect
        )
    }

    /// Whether the type carries a validation pattern.
    pub fn has_pattern(&self) -> bool {
        matches!(self, FieldType::Regexp)
    }

    /// Whether the type is one of the modelled variants.
    pub fn is_known(&self) -> bool {
        !matches!(self, FieldType::Unknown(_))
    }
}

impl From<&str> for FieldType {
    fn from(raw: &str) -> Self {
        match raw.trim() {
            "text" => FieldType::Text,
            "textarea" => FieldType::Textarea,
            "integer" => FieldType::Integer,
            "decimal" => FieldType::Decimal,
            "date" => FieldType::Date,
            "checkbox" => FieldType::Checkbox,
            "regexp" => FieldType::Regexp,
            "tagger" => FieldType::Tagger,
            "dropdown" => FieldType::Dropdown,
            "multiselect" => FieldType::Multiselect,
            "lookup" => FieldType::Lookup,
            other => FieldType::Unknown(other.to_string()),
        }
    }
}

impl From<String> for FieldType {
    fn from(raw: String) -> Self {
        FieldType::from(raw.as_str())
    }
}

impl Default for FieldType {
    fn default() -> Self {
        FieldType::Unknown(String::new())
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(FieldType::from(String::deserialize(deserializer)?))
    }
}

/// One choice of a choice-type field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOption {
    /// Stored value (the tag).
    pub value: String,
    /// Display name.
    pub name: String,
    /// Position within the option list.
    pub position: i64,
    /// Whether the option is selectable.
    pub active: bool,
    /// Whether the option is preselected.
    pub default: bool,
}

impl FieldOption {
    /// Create an active, non-default option.
    pub fn new(value: impl Into<String>, name: impl Into<String>, position: i64) -> Self {
        Self {
            value: value.into(),
            name: name.into(),
            position,
            active: true,
            default: false,
        }
    }
}

/// Ticket-field settings for the end-user portal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortalSettings {
    /// Title shown to end users.
    pub title_in_portal: String,
    /// Description shown to agents.
    pub agent_description: String,
    /// Visible to end users.
    pub visible_in_portal: bool,
    /// Editable by end users.
    pub editable_in_portal: bool,
    /// Required for end users.
    pub required_in_portal: bool,
}

/// A custom field definition read from, or destined for, an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Field namespace.
    pub category: FieldCategory,
    /// Id in the source instance.
    pub source_id: u64,
    /// Id in the target instance, once it exists there.
    pub target_id: Option<u64>,
    /// Natural key used to match the field across instances.
    pub key: String,
    /// Agent-facing title.
    pub title: String,
    /// Field type.
    pub field_type: FieldType,
    /// Required for agents.
    pub required: bool,
    /// Whether the field is active.
    pub active: bool,
    /// Position in the field list.
    pub position: i64,
    /// Customer-facing description.
    pub description: String,
    /// Tag applied by checkbox ticket fields; empty when unset.
    pub tag: String,
    /// Validation pattern for regexp fields; empty when unset.
    pub regexp_for_validation: String,
    /// Portal settings (ticket fields only).
    pub portal: PortalSettings,
    /// Options of a choice-type field, in order.
    pub options: Vec<FieldOption>,
    /// Built-in field that must never be migrated.
    pub system: bool,
}

impl FieldDefinition {
    /// Create a field with default attributes.
    pub fn new(
        category: FieldCategory,
        source_id: u64,
        key: impl Into<String>,
        title: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        Self {
            category,
            source_id,
            target_id: None,
            key: key.into(),
            title: title.into(),
            field_type,
            required: false,
            active: true,
            position: 0,
            description: String::new(),
            tag: String::new(),
            regexp_for_validation: String::new(),
            portal: PortalSettings::default(),
            options: Vec::new(),
            system: false,
        }
    }

    /// Add an option.
    pub fn with_option(mut self, option: FieldOption) -> Self {
        self.options.push(option);
        self
    }

    /// Mark the field as required.
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Set the target id.
    pub fn with_target_id(mut self, target_id: u64) -> Self {
        self.target_id = Some(target_id);
        self
    }

    /// Entity kind of this field.
    pub fn kind(&self) -> EntityKind {
        EntityKind::Field(self.category)
    }

    /// Matching key across instances.
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(self.kind(), self.key.clone())
    }

    /// Derive the natural key of a field that has no explicit key.
    pub fn derived_key(title: &str, field_type: &FieldType) -> String {
        format!("{}:{}", title.trim().to_lowercase(), field_type)
    }

    /// Append `suffix` to the key and tag, used when the target reports a
    /// collision on create.
    pub fn rename_key(&mut self, suffix: &str) {
        self.key = format!("{}{}", self.key, suffix);
        if !self.tag.is_empty() {
            self.tag.push_str(suffix);
        }
    }

    /// Build the create payload for the target instance.
    pub fn create_payload(&self) -> Value {
        let mut body = Map::new();
        body.insert("type".into(), json!(self.field_type.as_str()));
        body.insert("title".into(), json!(self.title));
        body.insert("description".into(), json!(self.description));
        body.insert("position".into(), json!(self.position));
        body.insert("active".into(), json!(self.active));

        match self.category {
            FieldCategory::Ticket => {
                if !self.tag.is_empty() {
                    body.insert("tag".into(), json!(self.tag));
                }
                body.insert("required".into(), json!(self.required));
                body.insert("required_in_portal".into(), json!(self.portal.required_in_portal));
                body.insert("visible_in_portal".into(), json!(self.portal.visible_in_portal));
                body.insert("editable_in_portal".into(), json!(self.portal.editable_in_portal));
                if !self.portal.title_in_portal.is_empty() {
                    body.insert("title_in_portal".into(), json!(self.portal.title_in_portal));
                }
                if !self.portal.agent_description.is_empty() {
                    body.insert("agent_description".into(), json!(self.portal.agent_description));
                }
            }
            FieldCategory::User | FieldCategory::Organization => {
                body.insert("key".into(), json!(self.key));
            }
        }

        if self.field_type.has_pattern() || !self.field_type.is_known() {
            if !self.regexp_for_validation.is_empty() {
                body.insert(
                    "regexp_for_validation".into(),
                    json!(self.regexp_for_validation),
                );
            }
        }

        if self.field_type.has_options() || (!self.field_type.is_known() && !self.options.is_empty()) {
            let options: Vec<Value> = self
                .options
                .iter()
                .map(|o| json!({ "name": o.name, "value": o.value, "default": o.default }))
                .collect();
            body.insert("custom_field_options".into(), Value::Array(options));
        }

        let mut payload = Map::new();
        payload.insert(self.category.wrapper().into(), Value::Object(body));
        Value::Object(payload)
    }
}

/// Decide whether a remote field is built in.
pub fn is_system_field(
    field_type: &FieldType,
    key: Option<&str>,
    removable: Option<bool>,
    creator_user_id: Option<i64>,
) -> bool {
    if removable == Some(false) || creator_user_id == Some(-1) {
        return true;
    }
    if SYSTEM_KEYS.contains(&field_type.as_str()) {
        return true;
    }
    key.is_some_and(|k| SYSTEM_KEYS.contains(&k))
}
