//! Field and form migration between two helpdesk instances.
//!
//! A migration runs in two phases:
//! - **analyze**: read both instances, [`diff`] them by natural key and write
//!   the resulting [`MigrationPlan`] to CSV for the operator to curate
//! - **import**: read the curated CSV back, order the entries with the
//!   [`DependencyResolver`] and create them through the [`MigrationExecutor`],
//!   recording every object in the rollback log
//!
//! # Example
//!
//! ```ignore
//! use deskmig_core::migration::{MigrationConfig, MigrationExecutor, PlanSerializer};
//! use deskmig_core::rollback::RollbackLog;
//!
//! let plan = PlanSerializer::read_path("plan.csv")?;
//! let log = RollbackLog::open("rollback_log.csv")?;
//! let mut executor = MigrationExecutor::new(target, log, MigrationConfig::default());
//! let report = executor.run(&plan).await?;
//! ```

pub mod diff;
pub mod executor;
pub mod plan;
pub mod resolve;
pub mod serializer;

pub use diff::{diff, Diff, KindSummary, Reconcile, SchemaDiff};
pub use executor::{
    is_key_collision, EntryFailure, KeyRename, KindCounts, MigrationConfig, MigrationExecutor,
    RunOutcome, RunReport, DEFAULT_COLLISION_SUFFIX,
};
pub use plan::MigrationPlan;
pub use resolve::{CreationPlan, CreationStep, DependencyResolver, IdentifierMap, ResolvedForm};
pub use serializer::{PlanRow, PlanSerializer};
