//! deskmig core - diffing, planning, migration and rollback.
//!
//! This crate holds the engine behind the `deskmig` command line: it compares
//! two instances, round-trips the plan through CSV, creates the missing
//! objects in dependency order and undoes a run from its rollback log.

pub mod error;
pub mod migration;
pub mod rollback;
pub mod usage;

pub use error::MigrationError;
pub use migration::{
    DependencyResolver, IdentifierMap, MigrationConfig, MigrationExecutor, MigrationPlan,
    PlanSerializer, RunOutcome, RunReport, SchemaDiff,
};
pub use rollback::{
    RollbackConfig, RollbackEngine, RollbackLog, RollbackLogEntry, RollbackReport, RollbackState,
};
pub use usage::FieldUsageCache;

/// Re-export protocol types.
pub use deskmig_proto as proto;
