//! Migration and rollback error types.

use deskmig_proto::EntityKind;
use thiserror::Error;

/// Errors raised by planning, importing and rolling back.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A form references a field that has no id in the target.
    #[error("form '{form}' references field {field_id}, which has no target id")]
    UnresolvedDependency {
        /// Name of the form.
        form: String,
        /// Source id of the unresolved field.
        field_id: u64,
    },

    /// An option row has no preceding field row of the same category and key.
    #[error("line {line}: option row for {category}/{key} has no parent field row")]
    DanglingOption {
        /// CSV line of the option row.
        line: u64,
        /// Category named by the row.
        category: String,
        /// Parent key named by the row.
        key: String,
    },

    /// Two plan rows share a natural key.
    #[error("line {line}: duplicate {kind} key '{key}'")]
    DuplicateKey {
        /// CSV line of the second occurrence.
        line: u64,
        /// Kind of the duplicated object.
        kind: EntityKind,
        /// The duplicated key.
        key: String,
    },

    /// A plan row is malformed.
    #[error("line {line}: {message}")]
    PlanFormat {
        /// CSV line of the row.
        line: u64,
        /// What is wrong with it.
        message: String,
    },

    /// A rollback log row is malformed.
    #[error("rollback log line {line}: {message}")]
    LogFormat {
        /// CSV line of the row.
        line: u64,
        /// What is wrong with it.
        message: String,
    },

    /// Remote API error.
    #[error("client error: {0}")]
    Client(#[from] deskmig_client::Error),

    /// CSV encoding error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The typed confirmation token did not match.
    #[error("confirmation token rejected: type DELETE to confirm")]
    ConfirmationRejected,

    /// Rollback was started without confirmation.
    #[error("rollback has not been confirmed")]
    NotConfirmed,

    /// An operation was attempted in the wrong engine state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl MigrationError {
    /// Whether the error rejects a plan document as a whole.
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            MigrationError::DanglingOption { .. }
                | MigrationError::DuplicateKey { .. }
                | MigrationError::PlanFormat { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskmig_proto::FieldCategory;

    #[test]
    fn test_messages_name_the_line() {
        let err = MigrationError::DuplicateKey {
            line: 7,
            kind: EntityKind::Field(FieldCategory::User),
            key: "vip".into(),
        };
        assert_eq!(err.to_string(), "line 7: duplicate user_field key 'vip'");
        assert!(err.is_plan_error());
        assert!(!MigrationError::NotConfirmed.is_plan_error());
    }
}
