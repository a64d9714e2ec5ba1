//! Subcommand handlers.

use std::io::{BufRead, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context};
use tokio::sync::broadcast;
use tracing::info;

use deskmig_client::{ExecutorConfig, HelpdeskClient};
use deskmig_core::migration::{
    MigrationConfig, MigrationExecutor, MigrationPlan, PlanSerializer, SchemaDiff,
};
use deskmig_core::proto::{EntityKind, FieldCategory};
use deskmig_core::rollback::{RollbackConfig, RollbackEngine, RollbackLog, CONFIRMATION_TOKEN};
use deskmig_core::FieldUsageCache;

use crate::config::MigratorConfig;
use crate::formatter::{Formatter, PlannedObject};

/// Read both instances, print the differences and write the plan.
pub async fn analyze(
    config: &MigratorConfig,
    executor: ExecutorConfig,
    output: &Path,
    formatter: &dyn Formatter,
) -> anyhow::Result<ExitCode> {
    let source = HelpdeskClient::new("source", &config.source_creds, executor.clone())?;
    let target = HelpdeskClient::new("target", &config.target_creds, executor)?;

    let source_schema = source.read_schema().await.context("reading source instance")?;
    let target_schema = target.read_schema().await.context("reading target instance")?;
    info!(
        source_objects = source_schema.object_count(),
        target_objects = target_schema.object_count(),
        "read both instances"
    );

    let diff = SchemaDiff::compute(&source_schema, &target_schema);

    // Form usage is only looked up for ticket fields that are missing, so the
    // source forms are re-read on the first such lookup.
    let usage = FieldUsageCache::new();
    let mut missing: Vec<PlannedObject> = Vec::new();
    for field in diff.missing_fields() {
        let used_by = match field.category {
            FieldCategory::Ticket => usage
                .forms_using(&source, field.source_id)
                .await
                .context("reading source form usage")?,
            _ => Vec::new(),
        };
        missing.push(PlannedObject {
            kind: field.kind(),
            name: field.title.clone(),
            options: field.options.len(),
            used_by,
        });
    }
    missing.extend(diff.missing_forms().map(|form| PlannedObject {
        kind: EntityKind::TicketForm,
        name: form.name.clone(),
        options: 0,
        used_by: Vec::new(),
    }));

    println!("{}", formatter.format_analysis(&diff.summary(), &missing));

    let plan = MigrationPlan::from_diff(&diff);
    PlanSerializer::write_path(&plan, output)
        .with_context(|| format!("writing plan to {}", output.display()))?;
    println!(
        "{}",
        formatter.format_message(&format!(
            "Wrote {} objects to create to {}; delete the rows you do not want, then run import",
            diff.change_count(),
            output.display()
        ))
    );
    Ok(ExitCode::SUCCESS)
}

/// Create the objects of a curated plan in the target.
pub async fn import(
    config: &MigratorConfig,
    executor: ExecutorConfig,
    plan_path: &Path,
    log_path: &Path,
    migration: MigrationConfig,
    shutdown_rx: broadcast::Receiver<()>,
    formatter: &dyn Formatter,
) -> anyhow::Result<ExitCode> {
    // Validate the whole plan before touching the target.
    let plan = PlanSerializer::read_path(plan_path)
        .with_context(|| format!("reading plan {}", plan_path.display()))?;
    if plan.creation_plan().is_empty() {
        println!("{}", formatter.format_message("Nothing to import"));
        return Ok(ExitCode::SUCCESS);
    }

    let target = HelpdeskClient::new("target", &config.target_creds, executor)?;
    let log = RollbackLog::open(log_path)
        .with_context(|| format!("opening rollback log {}", log_path.display()))?;

    let mut executor = MigrationExecutor::new(target, log, migration);
    let report = executor.run_until_shutdown(&plan, shutdown_rx).await?;

    println!("{}", formatter.format_run_report(&report));
    if !report.created.is_empty() {
        println!(
            "{}",
            formatter.format_message(&format!(
                "Created objects are recorded in {}",
                log_path.display()
            ))
        );
    }

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Delete every object recorded in the rollback log.
pub async fn rollback(
    config: &MigratorConfig,
    executor: ExecutorConfig,
    log_path: &Path,
    confirm: Option<String>,
    list_only: bool,
    rollback_config: RollbackConfig,
    formatter: &dyn Formatter,
) -> anyhow::Result<ExitCode> {
    if !log_path.is_file() {
        bail!("no rollback log at {}", log_path.display());
    }

    let target = HelpdeskClient::new("target", &config.target_creds, executor)?;
    let log = RollbackLog::open(log_path)
        .with_context(|| format!("opening rollback log {}", log_path.display()))?;
    let mut engine = RollbackEngine::new(target, log, rollback_config);

    let pending = engine.pending()?;
    if pending.is_empty() {
        println!("{}", formatter.format_message("Nothing to roll back"));
        return Ok(ExitCode::SUCCESS);
    }
    println!("{}", formatter.format_pending(&pending));
    if list_only {
        return Ok(ExitCode::SUCCESS);
    }

    let token = match confirm {
        Some(token) => token,
        None => prompt_confirmation(pending.len())?,
    };
    engine.confirm(&token)?;

    let report = engine.rollback().await?;
    println!("{}", formatter.format_rollback_report(&report));
    Ok(if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn prompt_confirmation(count: usize) -> anyhow::Result<String> {
    print!(
        "This deletes {} objects from the target. Type {} to continue: ",
        count, CONFIRMATION_TOKEN
    );
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}
