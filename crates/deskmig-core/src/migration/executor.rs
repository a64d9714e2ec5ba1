//! Migration executor - creates plan entries in the target.
//!
//! Walks the creation plan in dependency order. Every successful create is
//! appended to the rollback log before the next request is issued, so the
//! log always lists exactly what the run created. A rejected entry is skipped
//! and the run continues; forms that depend on it are skipped in turn. An
//! exhausted retry budget aborts the run. A shutdown signal stops the run
//! between entries or during a retry wait, never while a request is in
//! flight.

use std::collections::BTreeMap;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};

use deskmig_client::{Error as ClientError, HelpdeskClient};
use deskmig_proto::{EntityKind, FieldDefinition};
use serde_json::Value;

use super::plan::MigrationPlan;
use super::resolve::{CreationStep, DependencyResolver, IdentifierMap};
use crate::error::MigrationError;
use crate::rollback::{RollbackLog, RollbackLogEntry};

/// Suffix appended to a key or tag the target reports as already used.
pub const DEFAULT_COLLISION_SUFFIX: &str = "_migrated";

/// Migration executor configuration.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Retry a create once with a suffixed key when the key or tag collides.
    pub rename_on_collision: bool,
    /// Suffix used for the retry.
    pub collision_suffix: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            rename_on_collision: true,
            collision_suffix: DEFAULT_COLLISION_SUFFIX.to_string(),
        }
    }
}

impl MigrationConfig {
    /// Set the collision suffix.
    pub fn with_collision_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.collision_suffix = suffix.into();
        self
    }

    /// Report key collisions as failures instead of renaming.
    pub fn without_collision_rename(mut self) -> Self {
        self.rename_on_collision = false;
        self
    }
}

/// Per-kind counters of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    /// Objects created.
    pub created: usize,
    /// Objects already present in the target.
    pub existing: usize,
    /// Objects skipped because a dependency was not created.
    pub skipped: usize,
    /// Objects the target rejected.
    pub failed: usize,
    /// Options created with their fields.
    pub options_created: usize,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every entry was attempted.
    Completed,
    /// A shutdown signal stopped the run before every entry was attempted.
    Cancelled,
    /// A retry budget was exhausted.
    Aborted(String),
}

/// An entry that was not created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    /// Kind of the entry.
    pub kind: EntityKind,
    /// Display name.
    pub name: String,
    /// Id in the source instance.
    pub source_id: u64,
    /// Why it was not created.
    pub reason: String,
    /// Skipped for an unresolved dependency rather than rejected.
    pub skipped: bool,
}

/// A key or tag renamed after a collision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRename {
    /// Kind of the field.
    pub kind: EntityKind,
    /// Original key.
    pub from: String,
    /// Key the field was created with.
    pub to: String,
}

/// Result of a migration run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Counters per kind.
    pub counts: BTreeMap<EntityKind, KindCounts>,
    /// Log rows appended by this run, in order.
    pub created: Vec<RollbackLogEntry>,
    /// Entries that were not created.
    pub failures: Vec<EntryFailure>,
    /// Keys renamed after collisions.
    pub renames: Vec<KeyRename>,
    /// How the run ended.
    pub outcome: RunOutcome,
}

impl RunReport {
    fn new() -> Self {
        Self {
            counts: EntityKind::ALL
                .into_iter()
                .map(|kind| (kind, KindCounts::default()))
                .collect(),
            created: Vec::new(),
            failures: Vec::new(),
            renames: Vec::new(),
            outcome: RunOutcome::Completed,
        }
    }

    /// Counters of one kind.
    pub fn counts(&self, kind: EntityKind) -> KindCounts {
        self.counts.get(&kind).copied().unwrap_or_default()
    }

    fn counts_mut(&mut self, kind: EntityKind) -> &mut KindCounts {
        self.counts.entry(kind).or_default()
    }

    /// Whether every entry was attempted and none failed.
    pub fn is_clean(&self) -> bool {
        self.outcome == RunOutcome::Completed && self.failures.is_empty()
    }

    fn fail(&mut self, step: &CreationStep, source_id: u64, reason: String, skipped: bool) {
        let kind = step.kind();
        let counts = self.counts_mut(kind);
        if skipped {
            counts.skipped += 1;
        } else {
            counts.failed += 1;
        }
        self.failures.push(EntryFailure {
            kind,
            name: step.name().to_string(),
            source_id,
            reason,
            skipped,
        });
    }
}

/// Whether a rejected create reports a key or tag that is already in use.
pub fn is_key_collision(err: &ClientError) -> bool {
    if err.status() != Some(422) {
        return false;
    }
    let body = err.body().unwrap_or_default().to_lowercase();
    (body.contains("key") || body.contains("tag")) && (body.contains("taken") || body.contains("used"))
}

/// Migration executor - creates plan entries and records them.
pub struct MigrationExecutor {
    client: HelpdeskClient,
    log: RollbackLog,
    config: MigrationConfig,
}

impl MigrationExecutor {
    /// Create a new migration executor writing to `log`.
    pub fn new(client: HelpdeskClient, log: RollbackLog, config: MigrationConfig) -> Self {
        Self {
            client,
            log,
            config,
        }
    }

    /// The rollback log.
    pub fn log(&self) -> &RollbackLog {
        &self.log
    }

    /// Give the log back.
    pub fn into_log(self) -> RollbackLog {
        self.log
    }

    /// Execute a plan to completion.
    pub async fn run(&mut self, plan: &MigrationPlan) -> Result<RunReport, MigrationError> {
        self.execute(plan, None).await
    }

    /// Execute a plan, stopping once `shutdown_rx` fires.
    ///
    /// The signal is honoured between entries and while a request waits out
    /// a rate limit or backoff. A request already in flight is allowed to
    /// finish so that its result reaches the log.
    pub async fn run_until_shutdown(
        &mut self,
        plan: &MigrationPlan,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<RunReport, MigrationError> {
        self.execute(plan, Some(&mut shutdown_rx)).await
    }

    async fn execute(
        &mut self,
        plan: &MigrationPlan,
        mut shutdown_rx: Option<&mut broadcast::Receiver<()>>,
    ) -> Result<RunReport, MigrationError> {
        let mut report = RunReport::new();
        let mut ids: IdentifierMap = plan.seed_identifiers();
        for (kind, _) in plan.existing() {
            report.counts_mut(kind).existing += 1;
        }

        let creation = plan.creation_plan();
        info!(
            to_create = creation.len(),
            seeded = ids.len(),
            log = %self.log.path().display(),
            "starting migration"
        );

        for step in creation.iter() {
            if let Some(rx) = shutdown_rx.as_deref_mut() {
                if matches!(rx.try_recv(), Ok(()) | Err(TryRecvError::Lagged(_))) {
                    warn!("shutdown requested, stopping migration");
                    report.outcome = RunOutcome::Cancelled;
                    break;
                }
            }

            let result = match step {
                CreationStep::Field(field) => {
                    self.create_field(field, &mut report, shutdown_rx.as_deref_mut())
                        .await
                }
                CreationStep::Form(form) => match DependencyResolver::resolve_form(form, &ids) {
                    Ok(resolved) => self
                        .create(
                            EntityKind::TicketForm,
                            resolved.create_payload(),
                            shutdown_rx.as_deref_mut(),
                        )
                        .await
                        .map(|id| (id, form.name.clone())),
                    Err(err) => {
                        warn!(form = %form.name, error = %err, "skipping form");
                        report.fail(step, form.source_id, err.to_string(), true);
                        continue;
                    }
                },
            };
            let source_id = match step {
                CreationStep::Field(field) => field.source_id,
                CreationStep::Form(form) => form.source_id,
            };

            match result {
                Ok((target_id, name)) => {
                    let kind = step.kind();
                    ids.insert(kind, source_id, target_id);
                    let entry = self.log.append_created(kind, target_id, &name)?;
                    info!(
                        kind = %kind,
                        name = %name,
                        source_id,
                        target_id,
                        sequence_no = entry.sequence_no,
                        "created object"
                    );

                    let counts = report.counts_mut(kind);
                    counts.created += 1;
                    if let CreationStep::Field(field) = step {
                        if field.field_type.has_options() {
                            counts.options_created += field.options.len();
                        }
                    }
                    report.created.push(entry);
                }
                Err(err) if err.is_cancelled() => {
                    warn!(name = %step.name(), "shutdown requested while waiting to resubmit, stopping migration");
                    report.outcome = RunOutcome::Cancelled;
                    break;
                }
                Err(err) if err.is_transient() => {
                    warn!(name = %step.name(), error = %err, "retry budget exhausted, aborting run");
                    report.fail(step, source_id, err.to_string(), false);
                    report.outcome = RunOutcome::Aborted(err.to_string());
                    break;
                }
                Err(err) => {
                    warn!(name = %step.name(), error = %err, "target rejected object, skipping");
                    report.fail(step, source_id, err.to_string(), false);
                }
            }
        }

        info!(
            created = report.created.len(),
            failed = report.failures.len(),
            outcome = ?report.outcome,
            "migration finished"
        );
        Ok(report)
    }

    async fn create(
        &self,
        kind: EntityKind,
        payload: Value,
        shutdown_rx: Option<&mut broadcast::Receiver<()>>,
    ) -> Result<u64, ClientError> {
        match shutdown_rx {
            Some(rx) => self.client.create_until_shutdown(kind, payload, rx).await,
            None => self.client.create(kind, payload).await,
        }
    }

    /// Create a field, retrying once under a suffixed key on collision.
    /// Returns the target id and the display name.
    async fn create_field(
        &self,
        field: &FieldDefinition,
        report: &mut RunReport,
        mut shutdown_rx: Option<&mut broadcast::Receiver<()>>,
    ) -> Result<(u64, String), ClientError> {
        let kind = field.kind();
        match self
            .create(kind, field.create_payload(), shutdown_rx.as_deref_mut())
            .await
        {
            Ok(id) => Ok((id, field.title.clone())),
            Err(err) if self.config.rename_on_collision && is_key_collision(&err) => {
                let mut renamed = field.clone();
                renamed.rename_key(&self.config.collision_suffix);
                warn!(
                    kind = %kind,
                    from = %field.key,
                    to = %renamed.key,
                    "key already used in target, retrying under a new key"
                );
                let id = self
                    .create(kind, renamed.create_payload(), shutdown_rx)
                    .await?;
                report.renames.push(KeyRename {
                    kind,
                    from: field.key.clone(),
                    to: renamed.key,
                });
                Ok((id, renamed.title))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permanent(status: u16, body: &str) -> ClientError {
        ClientError::Permanent {
            method: "POST".into(),
            path: "user_fields.json".into(),
            status,
            body: body.into(),
        }
    }

    #[test]
    fn test_key_collision_detection() {
        assert!(is_key_collision(&permanent(
            422,
            r#"{"details":{"key":[{"description":"Key: vip has already been taken"}]}}"#
        )));
        assert!(is_key_collision(&permanent(422, "Tag: vip is already used")));
        assert!(!is_key_collision(&permanent(422, "Title: cannot be blank")));
        assert!(!is_key_collision(&permanent(409, "key taken")));
    }

    #[test]
    fn test_config_builders() {
        let config = MigrationConfig::default();
        assert!(config.rename_on_collision);
        assert_eq!(config.collision_suffix, "_migrated");

        let config = config.with_collision_suffix("_copy").without_collision_rename();
        assert!(!config.rename_on_collision);
        assert_eq!(config.collision_suffix, "_copy");
    }

    #[test]
    fn test_report_counters() {
        let mut report = RunReport::new();
        let step = CreationStep::Form(deskmig_proto::TicketForm::new(1, "Main Form", vec![]));
        report.fail(&step, 1, "unresolved".into(), true);
        assert_eq!(report.counts(EntityKind::TicketForm).skipped, 1);
        assert!(!report.is_clean());
    }
}
