//! Output formatters for analysis, import and rollback summaries.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde_json::{json, Value};

use deskmig_core::migration::{KindSummary, RunOutcome, RunReport};
use deskmig_core::rollback::{RollbackLogEntry, RollbackReport};
use deskmig_core::proto::EntityKind;

/// Output format for summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// An object the analysis found missing from the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedObject {
    /// Kind of the object.
    pub kind: EntityKind,
    /// Display name.
    pub name: String,
    /// Options carried by a field.
    pub options: usize,
    /// Source forms that reference a ticket field.
    pub used_by: Vec<String>,
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format the analysis summary.
    fn format_analysis(&self, summary: &[KindSummary], missing: &[PlannedObject]) -> String;

    /// Format the result of an import.
    fn format_run_report(&self, report: &RunReport) -> String;

    /// Format the entries a rollback would delete.
    fn format_pending(&self, entries: &[RollbackLogEntry]) -> String;

    /// Format the result of a rollback.
    fn format_rollback_report(&self, report: &RollbackReport) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn outcome_label(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed => "completed".to_string(),
        RunOutcome::Cancelled => "cancelled".to_string(),
        RunOutcome::Aborted(reason) => format!("aborted: {}", reason),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_analysis(&self, summary: &[KindSummary], missing: &[PlannedObject]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Kind", "New", "Existing", "New options"]);
        for row in summary {
            table.add_row(vec![
                Cell::new(row.kind.label()),
                Cell::new(row.new),
                Cell::new(row.existing),
                Cell::new(row.new_options),
            ]);
        }

        if missing.is_empty() {
            return format!("{}\nTarget already has every source field and form", table);
        }

        let mut detail = Table::new();
        detail.set_header(vec!["Kind", "Name", "Options", "Used by"]);
        for object in missing {
            detail.add_row(vec![
                Cell::new(object.kind.label()),
                Cell::new(&object.name),
                Cell::new(object.options),
                Cell::new(object.used_by.join(", ")),
            ]);
        }
        format!("{}\n\n{}", table, detail)
    }

    fn format_run_report(&self, report: &RunReport) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Kind", "Created", "Existing", "Skipped", "Failed", "Options"]);
        for (kind, counts) in &report.counts {
            table.add_row(vec![
                Cell::new(kind.label()),
                Cell::new(counts.created),
                Cell::new(counts.existing),
                Cell::new(counts.skipped),
                Cell::new(counts.failed),
                Cell::new(counts.options_created),
            ]);
        }

        let mut output = table.to_string();
        for rename in &report.renames {
            output.push_str(&format!(
                "\nRenamed {} key '{}' to '{}'",
                rename.kind.label(),
                rename.from,
                rename.to
            ));
        }
        if !report.failures.is_empty() {
            let mut failures = Table::new();
            failures.set_header(vec!["Kind", "Name", "Source id", "Reason"]);
            for failure in &report.failures {
                failures.add_row(vec![
                    Cell::new(failure.kind.label()),
                    Cell::new(&failure.name),
                    Cell::new(failure.source_id),
                    Cell::new(&failure.reason),
                ]);
            }
            output.push_str(&format!("\n\n{}", failures));
        }
        output.push_str(&format!("\nRun {}", outcome_label(&report.outcome)));
        output
    }

    fn format_pending(&self, entries: &[RollbackLogEntry]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Seq", "Kind", "Id", "Name", "Created at"]);
        for entry in entries {
            table.add_row(vec![
                Cell::new(entry.sequence_no),
                Cell::new(entry.entity_kind.label()),
                Cell::new(entry.target_id),
                Cell::new(&entry.name),
                Cell::new(deskmig_core::rollback::log::format_timestamp(&entry.created_at)),
            ]);
        }
        table.to_string()
    }

    fn format_rollback_report(&self, report: &RollbackReport) -> String {
        let mut output = format!(
            "Deleted {}, already absent {}, failed {}",
            report.removed.len(),
            report.already_absent.len(),
            report.failures.len()
        );
        for failure in &report.failures {
            output.push_str(&format!(
                "\n  {} {} ({}): {}",
                failure.entry.entity_kind.label(),
                failure.entry.target_id,
                failure.entry.name,
                failure.reason
            ));
        }
        if report.truncated {
            output.push_str("\nRollback log cleared");
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

fn entry_json(entry: &RollbackLogEntry) -> Value {
    json!({
        "sequence_no": entry.sequence_no,
        "entity_kind": entry.entity_kind.to_string(),
        "target_id": entry.target_id,
        "name": entry.name,
        "created_at": deskmig_core::rollback::log::format_timestamp(&entry.created_at),
    })
}

fn pretty(value: Value) -> String {
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
}

impl Formatter for JsonFormatter {
    fn format_analysis(&self, summary: &[KindSummary], missing: &[PlannedObject]) -> String {
        pretty(json!({
            "summary": summary.iter().map(|row| json!({
                "kind": row.kind.to_string(),
                "new": row.new,
                "existing": row.existing,
                "new_options": row.new_options,
            })).collect::<Vec<_>>(),
            "missing": missing.iter().map(|o| json!({
                "kind": o.kind.to_string(),
                "name": o.name,
                "options": o.options,
                "used_by": o.used_by,
            })).collect::<Vec<_>>(),
        }))
    }

    fn format_run_report(&self, report: &RunReport) -> String {
        let counts: serde_json::Map<String, Value> = report
            .counts
            .iter()
            .map(|(kind, c)| {
                (
                    kind.to_string(),
                    json!({
                        "created": c.created,
                        "existing": c.existing,
                        "skipped": c.skipped,
                        "failed": c.failed,
                        "options_created": c.options_created,
                    }),
                )
            })
            .collect();

        pretty(json!({
            "outcome": outcome_label(&report.outcome),
            "counts": counts,
            "created": report.created.iter().map(entry_json).collect::<Vec<_>>(),
            "renames": report.renames.iter().map(|r| json!({
                "kind": r.kind.to_string(),
                "from": r.from,
                "to": r.to,
            })).collect::<Vec<_>>(),
            "failures": report.failures.iter().map(|f| json!({
                "kind": f.kind.to_string(),
                "name": f.name,
                "source_id": f.source_id,
                "reason": f.reason,
                "skipped": f.skipped,
            })).collect::<Vec<_>>(),
        }))
    }

    fn format_pending(&self, entries: &[RollbackLogEntry]) -> String {
        pretty(Value::Array(entries.iter().map(entry_json).collect()))
    }

    fn format_rollback_report(&self, report: &RollbackReport) -> String {
        pretty(json!({
            "removed": report.removed.iter().map(entry_json).collect::<Vec<_>>(),
            "already_absent": report.already_absent.iter().map(entry_json).collect::<Vec<_>>(),
            "failures": report.failures.iter().map(|f| json!({
                "entry": entry_json(&f.entry),
                "reason": f.reason,
            })).collect::<Vec<_>>(),
            "truncated": report.truncated,
        }))
    }

    fn format_message(&self, message: &str) -> String {
        json!({ "message": message }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use deskmig_core::migration::{EntryFailure, KindCounts};
    use deskmig_core::proto::FieldCategory;
    use deskmig_core::rollback::LogEvent;
    use std::collections::BTreeMap;

    const TICKET: EntityKind = EntityKind::Field(FieldCategory::Ticket);

    fn entry(sequence_no: u64, target_id: u64, name: &str) -> RollbackLogEntry {
        RollbackLogEntry {
            sequence_no,
            entity_kind: TICKET,
            target_id,
            created_at: Utc::now(),
            name: name.to_string(),
            event: LogEvent::Created,
        }
    }

    fn report() -> RunReport {
        let mut counts = BTreeMap::new();
        counts.insert(
            TICKET,
            KindCounts {
                created: 1,
                options_created: 2,
                ..KindCounts::default()
            },
        );
        counts.insert(
            EntityKind::TicketForm,
            KindCounts {
                skipped: 1,
                ..KindCounts::default()
            },
        );
        RunReport {
            counts,
            created: vec![entry(1, 501, "Priority Level")],
            failures: vec![EntryFailure {
                kind: EntityKind::TicketForm,
                name: "Main Form".to_string(),
                source_id: 7,
                reason: "form 'Main Form' references field 41, which has no target id".to_string(),
                skipped: true,
            }],
            renames: Vec::new(),
            outcome: RunOutcome::Completed,
        }
    }

    #[test]
    fn test_table_run_report() {
        let output = TableFormatter.format_run_report(&report());
        assert!(output.contains("Ticket Fields"));
        assert!(output.contains("Main Form"));
        assert!(output.ends_with("Run completed"));
    }

    #[test]
    fn test_json_run_report() {
        let output = JsonFormatter.format_run_report(&report());
        let value: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["outcome"], "completed");
        assert_eq!(value["counts"][TICKET.to_string()]["options_created"], 2);
        assert_eq!(value["failures"][0]["skipped"], true);
        assert_eq!(value["created"][0]["target_id"], 501);
    }

    #[test]
    fn test_analysis_lists_form_usage() {
        let summary = vec![KindSummary {
            kind: TICKET,
            new: 1,
            existing: 0,
            new_options: 2,
        }];
        let missing = vec![PlannedObject {
            kind: TICKET,
            name: "Priority Level".to_string(),
            options: 2,
            used_by: vec!["Billing".to_string(), "Main Form".to_string()],
        }];
        let output = TableFormatter.format_analysis(&summary, &missing);
        assert!(output.contains("Billing, Main Form"));

        let empty = TableFormatter.format_analysis(&summary, &[]);
        assert!(empty.contains("already has every source field"));
    }

    #[test]
    fn test_rollback_report() {
        let report = RollbackReport {
            removed: vec![entry(2, 502, "Main Form"), entry(1, 501, "Priority Level")],
            already_absent: Vec::new(),
            failures: Vec::new(),
            truncated: true,
        };
        let output = TableFormatter.format_rollback_report(&report);
        assert!(output.starts_with("Deleted 2, already absent 0, failed 0"));
        assert!(output.contains("Rollback log cleared"));

        let pending = JsonFormatter.format_pending(&report.removed);
        let value: Value = serde_json::from_str(&pending).unwrap();
        assert_eq!(value[0]["sequence_no"], 2);
    }
}
