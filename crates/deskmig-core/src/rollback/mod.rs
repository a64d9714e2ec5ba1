//! Rollback of a previous run.
//!
//! - [`log`]: the append-only record of created objects
//! - [`engine`]: the confirmation-gated undo pass

pub mod engine;
pub mod log;

pub use engine::{
    RollbackConfig, RollbackEngine, RollbackFailure, RollbackReport, RollbackState,
    CONFIRMATION_TOKEN,
};
pub use log::{outstanding, LogEvent, RollbackLog, RollbackLogEntry, DEFAULT_LOG_FILE};
