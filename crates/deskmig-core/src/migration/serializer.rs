//! Plan serializer.
//!
//! Renders a [`MigrationPlan`] as a flat CSV document for manual curation and
//! reads it back. Deleting rows is how an operator excludes objects from a
//! run. A field's options follow it as `option` rows that repeat the parent's
//! category and key, so an orphaned option row is detected instead of
//! attaching itself to another field. Row order defines creation order.
//!
//! Reading validates the whole document before returning, so a broken plan
//! is rejected before any remote call is made.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use deskmig_proto::{
    EntityKind, FieldCategory, FieldDefinition, FieldOption, FieldType, FormCondition,
    PortalSettings, TicketForm,
};

use super::plan::MigrationPlan;
use crate::error::MigrationError;

const KIND_FIELD: &str = "field";
const KIND_OPTION: &str = "option";
const KIND_FORM: &str = "form";

/// Separator of the ids in the `form_fields` column.
pub const FORM_FIELDS_SEPARATOR: char = '|';

/// One CSV row. Columns unused by a row kind stay empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanRow {
    /// `field`, `option` or `form`.
    pub kind: String,
    /// Entity kind wrapper (`ticket_field`, ..., `ticket_form`).
    pub category: String,
    /// Natural key; for option rows the parent field's key.
    pub key: String,
    /// Field title, option name or form name.
    pub title: String,
    /// Field type.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Id in the source instance.
    pub source_id: Option<u64>,
    /// Id in the target instance, when already present there.
    pub target_id: Option<u64>,
    /// Built-in field.
    pub system: Option<bool>,
    /// Required flag.
    pub required: Option<bool>,
    /// Active flag.
    pub active: Option<bool>,
    /// Position.
    pub position: Option<i64>,
    /// Description.
    pub description: String,
    /// Checkbox tag.
    pub tag: String,
    /// Validation pattern.
    pub regexp: String,
    /// Portal title.
    pub title_in_portal: String,
    /// Agent description.
    pub agent_description: String,
    /// Portal visibility.
    pub visible_in_portal: Option<bool>,
    /// Portal editability.
    pub editable_in_portal: Option<bool>,
    /// Portal requirement.
    pub required_in_portal: Option<bool>,
    /// Option value (tag).
    pub option_value: String,
    /// Option preselected.
    pub option_default: Option<bool>,
    /// Form end-user name.
    pub form_display_name: String,
    /// Form layout as `|`-separated source ticket-field ids.
    pub form_fields: String,
    /// Form conditional-visibility rules as JSON.
    pub form_conditions: String,
    /// Form end-user visibility.
    pub form_end_user_visible: Option<bool>,
    /// Default-form flag.
    pub form_default: Option<bool>,
}

impl PlanRow {
    fn field(field: &FieldDefinition) -> Self {
        Self {
            kind: KIND_FIELD.into(),
            category: field.category.wrapper().into(),
            key: field.key.clone(),
            title: field.title.clone(),
            field_type: field.field_type.as_str().into(),
            source_id: Some(field.source_id),
            target_id: field.target_id,
            system: Some(field.system),
            required: Some(field.required),
            active: Some(field.active),
            position: Some(field.position),
            description: field.description.clone(),
            tag: field.tag.clone(),
            regexp: field.regexp_for_validation.clone(),
            title_in_portal: field.portal.title_in_portal.clone(),
            agent_description: field.portal.agent_description.clone(),
            visible_in_portal: Some(field.portal.visible_in_portal),
            editable_in_portal: Some(field.portal.editable_in_portal),
            required_in_portal: Some(field.portal.required_in_portal),
            ..Self::default()
        }
    }

    fn option(field: &FieldDefinition, option: &FieldOption) -> Self {
        Self {
            kind: KIND_OPTION.into(),
            category: field.category.wrapper().into(),
            key: field.key.clone(),
            title: option.name.clone(),
            active: Some(option.active),
            position: Some(option.position),
            option_value: option.value.clone(),
            option_default: Some(option.default),
            ..Self::default()
        }
    }

    fn form(form: &TicketForm) -> Result<Self, MigrationError> {
        let form_conditions = if form.conditions.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&form.conditions).map_err(|e| MigrationError::PlanFormat {
                line: 0,
                message: format!("cannot encode conditions of form '{}': {}", form.name, e),
            })?
        };

        Ok(Self {
            kind: KIND_FORM.into(),
            category: EntityKind::TicketForm.wrapper().into(),
            title: form.name.clone(),
            source_id: Some(form.source_id),
            target_id: form.target_id,
            active: Some(form.active),
            position: Some(form.position),
            form_display_name: form.display_name.clone(),
            form_fields: form
                .field_ids
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(&FORM_FIELDS_SEPARATOR.to_string()),
            form_conditions,
            form_end_user_visible: Some(form.end_user_visible),
            form_default: Some(form.default),
            ..Self::default()
        })
    }
}

/// Reads and writes plan documents.
pub struct PlanSerializer;

impl PlanSerializer {
    /// Flatten a plan into rows: each field followed by its options, then the
    /// forms.
    pub fn rows(plan: &MigrationPlan) -> Result<Vec<PlanRow>, MigrationError> {
        let mut rows = Vec::with_capacity(plan.len());
        for field in &plan.fields {
            rows.push(PlanRow::field(field));
            rows.extend(field.options.iter().map(|o| PlanRow::option(field, o)));
        }
        for form in &plan.forms {
            rows.push(PlanRow::form(form)?);
        }
        Ok(rows)
    }

    /// Write a plan as CSV.
    pub fn write<W: Write>(plan: &MigrationPlan, writer: W) -> Result<(), MigrationError> {
        let mut csv = csv::Writer::from_writer(writer);
        for row in Self::rows(plan)? {
            csv.serialize(row)?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write a plan to a file.
    pub fn write_path(plan: &MigrationPlan, path: impl AsRef<Path>) -> Result<(), MigrationError> {
        Self::write(plan, File::create(path)?)
    }

    /// Read and validate a CSV plan.
    pub fn read<R: Read>(reader: R) -> Result<MigrationPlan, MigrationError> {
        let mut csv = csv::Reader::from_reader(reader);
        let headers = csv.headers()?.clone();

        let mut builder = PlanBuilder::default();
        for record in csv.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let row: PlanRow = record
                .deserialize(Some(&headers))
                .map_err(|e| MigrationError::PlanFormat {
                    line,
                    message: e.to_string(),
                })?;
            builder.push(line, row)?;
        }
        Ok(builder.finish())
    }

    /// Read and validate a plan file.
    pub fn read_path(path: impl AsRef<Path>) -> Result<MigrationPlan, MigrationError> {
        Self::read(File::open(path)?)
    }
}

#[derive(Default)]
struct PlanBuilder {
    plan: MigrationPlan,
    /// The field the next option row may attach to.
    current: Option<(FieldCategory, String)>,
    field_keys: HashSet<(FieldCategory, String)>,
    form_keys: HashSet<String>,
}

impl PlanBuilder {
    fn push(&mut self, line: u64, row: PlanRow) -> Result<(), MigrationError> {
        match row.kind.trim() {
            KIND_FIELD => self.push_field(line, row),
            KIND_OPTION => self.push_option(line, row),
            KIND_FORM => self.push_form(line, row),
            other => Err(format_error(line, format!("unknown row kind '{}'", other))),
        }
    }

    fn push_field(&mut self, line: u64, row: PlanRow) -> Result<(), MigrationError> {
        let category = parse_category(line, &row.category)?;
        let trimmed = row.key.trim().to_string();
        if trimmed.is_empty() {
            return Err(format_error(line, "field row without a key".into()));
        }
        if !self.field_keys.insert((category, trimmed.clone())) {
            return Err(MigrationError::DuplicateKey {
                line,
                kind: EntityKind::Field(category),
                key: trimmed,
            });
        }

        let field = FieldDefinition {
            category,
            source_id: require_id(line, row.source_id)?,
            target_id: row.target_id,
            key: row.key,
            title: row.title,
            field_type: FieldType::from(row.field_type),
            required: row.required.unwrap_or(false),
            active: row.active.unwrap_or(true),
            position: row.position.unwrap_or(0),
            description: row.description,
            tag: row.tag,
            regexp_for_validation: row.regexp,
            portal: PortalSettings {
                title_in_portal: row.title_in_portal,
                agent_description: row.agent_description,
                visible_in_portal: row.visible_in_portal.unwrap_or(false),
                editable_in_portal: row.editable_in_portal.unwrap_or(false),
                required_in_portal: row.required_in_portal.unwrap_or(false),
            },
            options: Vec::new(),
            system: row.system.unwrap_or(false),
        };
        self.plan.fields.push(field);
        self.current = Some((category, trimmed));
        Ok(())
    }

    fn push_option(&mut self, line: u64, row: PlanRow) -> Result<(), MigrationError> {
        let key = row.key.trim().to_string();
        let parent = field_category(&row.category)
            .filter(|category| self.current.as_ref() == Some(&(*category, key.clone())));
        let field = match (parent, self.plan.fields.last_mut()) {
            (Some(_), Some(field)) => field,
            _ => {
                return Err(MigrationError::DanglingOption {
                    line,
                    category: row.category,
                    key,
                })
            }
        };

        field.options.push(FieldOption {
            value: row.option_value,
            name: row.title,
            position: row.position.unwrap_or(field.options.len() as i64),
            active: row.active.unwrap_or(true),
            default: row.option_default.unwrap_or(false),
        });
        Ok(())
    }

    fn push_form(&mut self, line: u64, row: PlanRow) -> Result<(), MigrationError> {
        self.current = None;
        let trimmed = row.title.trim();
        if trimmed.is_empty() {
            return Err(format_error(line, "form row without a name".into()));
        }
        if !self.form_keys.insert(trimmed.to_lowercase()) {
            return Err(MigrationError::DuplicateKey {
                line,
                kind: EntityKind::TicketForm,
                key: trimmed.to_string(),
            });
        }

        let field_ids = row
            .form_fields
            .split(FORM_FIELDS_SEPARATOR)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                id.parse::<u64>()
                    .map_err(|_| format_error(line, format!("invalid field id '{}'", id)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let conditions: Vec<FormCondition> = if row.form_conditions.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&row.form_conditions)
                .map_err(|e| format_error(line, format!("invalid form_conditions: {}", e)))?
        };

        self.plan.forms.push(TicketForm {
            source_id: require_id(line, row.source_id)?,
            target_id: row.target_id,
            name: row.title,
            display_name: row.form_display_name,
            active: row.active.unwrap_or(true),
            end_user_visible: row.form_end_user_visible.unwrap_or(false),
            position: row.position.unwrap_or(0),
            default: row.form_default.unwrap_or(false),
            field_ids,
            conditions,
        });
        Ok(())
    }

    fn finish(self) -> MigrationPlan {
        self.plan
    }
}

fn field_category(raw: &str) -> Option<FieldCategory> {
    match raw.parse::<EntityKind>() {
        Ok(EntityKind::Field(category)) => Some(category),
        _ => None,
    }
}

fn parse_category(line: u64, raw: &str) -> Result<FieldCategory, MigrationError> {
    field_category(raw)
        .ok_or_else(|| format_error(line, format!("unknown field category '{}'", raw)))
}

fn require_id(line: u64, id: Option<u64>) -> Result<u64, MigrationError> {
    id.ok_or_else(|| format_error(line, "row without a source_id".into()))
}

fn format_error(line: u64, message: String) -> MigrationError {
    MigrationError::PlanFormat { line, message }
}
