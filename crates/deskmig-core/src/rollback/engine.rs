//! Rollback engine.
//!
//! Undoes a previous run by deleting every outstanding log entry, newest
//! first, so forms go before the fields they reference. The engine refuses
//! to delete anything until the operator has typed the confirmation token.

use tracing::{info, warn};

use deskmig_client::HelpdeskClient;
use deskmig_proto::EntityKind;

use super::log::{RollbackLog, RollbackLogEntry};
use crate::error::MigrationError;

/// Token the operator must type to start a rollback.
pub const CONFIRMATION_TOKEN: &str = "DELETE";

/// Rollback engine configuration.
#[derive(Debug, Clone)]
pub struct RollbackConfig {
    /// Empty the log once every entry has been undone.
    pub truncate_on_success: bool,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            truncate_on_success: true,
        }
    }
}

impl RollbackConfig {
    /// Keep the log rows after a complete rollback.
    pub fn keep_log(mut self) -> Self {
        self.truncate_on_success = false;
        self
    }
}

/// State of the rollback engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackState {
    /// Waiting for confirmation.
    Idle,
    /// Confirmed, not yet started.
    Confirming,
    /// Deleting entries.
    RollingBack,
    /// Every entry was undone.
    Done,
    /// At least one entry could not be undone.
    Failed,
}

impl std::fmt::Display for RollbackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackState::Idle => write!(f, "idle"),
            RollbackState::Confirming => write!(f, "confirming"),
            RollbackState::RollingBack => write!(f, "rolling_back"),
            RollbackState::Done => write!(f, "done"),
            RollbackState::Failed => write!(f, "failed"),
        }
    }
}

/// An entry the rollback could not undo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackFailure {
    /// The log row.
    pub entry: RollbackLogEntry,
    /// Why the delete failed.
    pub reason: String,
}

/// Result of a rollback pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollbackReport {
    /// Entries deleted by this pass, in deletion order.
    pub removed: Vec<RollbackLogEntry>,
    /// Entries whose object was already gone.
    pub already_absent: Vec<RollbackLogEntry>,
    /// Entries that could not be undone.
    pub failures: Vec<RollbackFailure>,
    /// Whether the log was emptied afterwards.
    pub truncated: bool,
}

impl RollbackReport {
    /// Whether every entry is gone from the target.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of entries processed.
    pub fn processed(&self) -> usize {
        self.removed.len() + self.already_absent.len() + self.failures.len()
    }

    /// Deleted entries of one kind.
    pub fn removed_of(&self, kind: EntityKind) -> usize {
        self.removed.iter().filter(|e| e.entity_kind == kind).count()
    }
}

/// Confirmation-gated rollback over a log.
pub struct RollbackEngine {
    client: HelpdeskClient,
    log: RollbackLog,
    config: RollbackConfig,
    state: RollbackState,
}

impl RollbackEngine {
    /// Create a rollback engine for `log`.
    pub fn new(client: HelpdeskClient, log: RollbackLog, config: RollbackConfig) -> Self {
        Self {
            client,
            log,
            config,
            state: RollbackState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> RollbackState {
        self.state
    }

    /// The log being undone.
    pub fn log(&self) -> &RollbackLog {
        &self.log
    }

    /// Entries a rollback would delete, in deletion order.
    pub fn pending(&self) -> Result<Vec<RollbackLogEntry>, MigrationError> {
        self.log.outstanding()
    }

    /// Accept the operator's confirmation. Only the exact token is accepted.
    pub fn confirm(&mut self, token: &str) -> Result<(), MigrationError> {
        if self.state != RollbackState::Idle {
            return Err(MigrationError::InvalidState(format!(
                "cannot confirm while {}",
                self.state
            )));
        }
        if token.trim() != CONFIRMATION_TOKEN {
            warn!("rollback confirmation rejected");
            return Err(MigrationError::ConfirmationRejected);
        }
        self.state = RollbackState::Confirming;
        Ok(())
    }

    /// Return to idle after a finished or confirmed rollback.
    pub fn reset(&mut self) {
        self.state = RollbackState::Idle;
    }

    /// Delete every outstanding entry, newest first.
    ///
    /// An object that is already gone counts as undone. A failed delete is
    /// recorded and the pass moves on to the next entry.
    pub async fn rollback(&mut self) -> Result<RollbackReport, MigrationError> {
        match self.state {
            RollbackState::Confirming => {}
            RollbackState::Idle => return Err(MigrationError::NotConfirmed),
            other => {
                return Err(MigrationError::InvalidState(format!(
                    "cannot roll back while {}",
                    other
                )))
            }
        }

        let pending = self.log.outstanding()?;
        self.state = RollbackState::RollingBack;
        info!(entries = pending.len(), log = %self.log.path().display(), "starting rollback");

        let mut report = RollbackReport::default();
        for entry in pending {
            match self.client.delete(entry.entity_kind, entry.target_id).await {
                Ok(()) => {
                    self.mark_removed(&entry)?;
                    info!(kind = %entry.entity_kind, id = entry.target_id, name = %entry.name, "deleted");
                    report.removed.push(entry);
                }
                Err(err) if err.is_not_found() => {
                    self.mark_removed(&entry)?;
                    info!(kind = %entry.entity_kind, id = entry.target_id, "already absent");
                    report.already_absent.push(entry);
                }
                Err(err) => {
                    warn!(
                        kind = %entry.entity_kind,
                        id = entry.target_id,
                        error = %err,
                        "delete failed, continuing"
                    );
                    report.failures.push(RollbackFailure {
                        entry,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if report.is_complete() {
            if self.config.truncate_on_success {
                self.log.truncate()?;
                report.truncated = true;
            }
            self.state = RollbackState::Done;
        } else {
            self.state = RollbackState::Failed;
        }

        info!(
            removed = report.removed.len(),
            already_absent = report.already_absent.len(),
            failed = report.failures.len(),
            state = %self.state,
            "rollback finished"
        );
        Ok(report)
    }

    fn mark_removed(&mut self, entry: &RollbackLogEntry) -> Result<(), MigrationError> {
        if let Err(err) = self.log.append_removed(entry) {
            self.state = RollbackState::Failed;
            return Err(err);
        }
        Ok(())
    }
}
