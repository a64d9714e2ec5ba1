//! Persistent rollback log.
//!
//! The rollback log is an append-only CSV record of every object a run
//! created, with monotonically increasing sequence numbers. Rows are never
//! rewritten: undoing an entry appends a `removed` marker that refers to the
//! same object. Each append is flushed and synced before returning, so the
//! file always reflects exactly what exists remotely.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use deskmig_proto::EntityKind;

use crate::error::MigrationError;

/// Default file name of the rollback log.
pub const DEFAULT_LOG_FILE: &str = "rollback_log.csv";

const HEADER: [&str; 6] = [
    "sequence_no",
    "entity_kind",
    "target_id",
    "created_at",
    "name",
    "event",
];

/// What a log row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEvent {
    /// The object was created by a run.
    Created,
    /// The object was removed by a rollback.
    Removed,
}

/// One row of the rollback log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackLogEntry {
    /// Position in the log; unique and increasing.
    pub sequence_no: u64,
    /// Kind of the object.
    pub entity_kind: EntityKind,
    /// Id of the object in the target.
    pub target_id: u64,
    /// When the row was written.
    #[serde(with = "rfc3339")]
    pub created_at: DateTime<Utc>,
    /// Display name of the object.
    pub name: String,
    /// Event recorded by the row.
    pub event: LogEvent,
}

impl RollbackLogEntry {
    /// Identity of the remote object this row refers to.
    pub fn object(&self) -> (EntityKind, u64) {
        (self.entity_kind, self.target_id)
    }
}

/// Append-only rollback log backed by a CSV file.
pub struct RollbackLog {
    path: PathBuf,
    writer: csv::Writer<File>,
    current_sequence: u64,
}

impl RollbackLog {
    /// Open or create the log at `path`.
    ///
    /// Sequence numbers continue after the highest one already in the file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MigrationError> {
        let path = path.as_ref().to_path_buf();
        let existing = if path.exists() {
            Self::read(&path)?
        } else {
            Vec::new()
        };
        let current_sequence = existing.iter().map(|e| e.sequence_no).max().unwrap_or(0);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let needs_header = file.metadata()?.len() == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(HEADER)?;
            writer.flush()?;
        }

        debug!(path = %path.display(), current_sequence, "opened rollback log");
        Ok(Self {
            path,
            writer,
            current_sequence,
        })
    }

    /// Read every row of a log file, in file order.
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<RollbackLogEntry>, MigrationError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let entry = record
                .deserialize(Some(&headers))
                .map_err(|e| MigrationError::LogFormat {
                    line,
                    message: e.to_string(),
                })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest sequence number assigned so far.
    pub fn current_sequence(&self) -> u64 {
        self.current_sequence
    }

    /// Record a created object and return the written row.
    pub fn append_created(
        &mut self,
        entity_kind: EntityKind,
        target_id: u64,
        name: &str,
    ) -> Result<RollbackLogEntry, MigrationError> {
        self.append(entity_kind, target_id, name, LogEvent::Created)
    }

    /// Record that the object of `entry` was removed.
    pub fn append_removed(
        &mut self,
        entry: &RollbackLogEntry,
    ) -> Result<RollbackLogEntry, MigrationError> {
        self.append(entry.entity_kind, entry.target_id, &entry.name, LogEvent::Removed)
    }

    fn append(
        &mut self,
        entity_kind: EntityKind,
        target_id: u64,
        name: &str,
        event: LogEvent,
    ) -> Result<RollbackLogEntry, MigrationError> {
        let entry = RollbackLogEntry {
            sequence_no: self.current_sequence + 1,
            entity_kind,
            target_id,
            created_at: Utc::now(),
            name: name.to_string(),
            event,
        };

        self.writer.serialize(&entry)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.current_sequence = entry.sequence_no;
        Ok(entry)
    }

    /// Every row, in file order.
    pub fn entries(&self) -> Result<Vec<RollbackLogEntry>, MigrationError> {
        Self::read(&self.path)
    }

    /// Created objects without a later removal marker, newest first.
    pub fn outstanding(&self) -> Result<Vec<RollbackLogEntry>, MigrationError> {
        Ok(outstanding(self.entries()?))
    }

    /// Drop every row, keeping only the header.
    pub fn truncate(&mut self) -> Result<(), MigrationError> {
        self.writer.flush()?;
        // The file is opened in append mode, so writes land at the new end.
        self.writer.get_ref().set_len(0)?;
        self.writer.write_record(HEADER)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.current_sequence = 0;
        debug!(path = %self.path.display(), "truncated rollback log");
        Ok(())
    }
}

/// Created rows whose object has no later removal marker, sorted by sequence
/// number descending.
pub fn outstanding(entries: Vec<RollbackLogEntry>) -> Vec<RollbackLogEntry> {
    let mut created: Vec<RollbackLogEntry> = Vec::new();
    let mut removed: HashSet<(EntityKind, u64)> = HashSet::new();

    // Walk newest first so a marker only cancels the creations before it.
    let mut entries = entries;
    entries.sort_by(|a, b| b.sequence_no.cmp(&a.sequence_no));
    for entry in entries {
        match entry.event {
            LogEvent::Removed => {
                removed.insert(entry.object());
            }
            LogEvent::Created => {
                if !removed.remove(&entry.object()) {
                    created.push(entry);
                }
            }
        }
    }
    created
}

mod rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Render a timestamp the way the log stores it.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}
