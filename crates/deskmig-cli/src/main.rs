//! deskmig command-line client
//!
//! Copies custom fields and ticket forms from one helpdesk instance to
//! another, and undoes a copy from its rollback log.

mod commands;
mod config;
mod formatter;

use std::process::ExitCode;

use clap::Parser;
use tokio::sync::broadcast;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use deskmig_core::migration::MigrationConfig;
use deskmig_core::rollback::RollbackConfig;

use config::{Args, Command, MigratorConfig};

/// Exit status after a second interrupt (128 + SIGINT).
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let level = if args.verbose { "debug" } else { "info" };
    let filter = if args.verbose {
        EnvFilter::new(format!("deskmig={}", level))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("deskmig={}", level)))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let (config, config_path) = MigratorConfig::load(args.config.as_deref())?;
    tracing::debug!(config = %config_path.display(), "loaded configuration");

    let executor = args.executor_config();
    let formatter = formatter::create_formatter(args.format);
    let log_path = config.rollback_log_path(&args);

    match args.command {
        Command::Analyze { ref output } => {
            commands::analyze(&config, executor, output, &*formatter).await
        }
        Command::Import {
            ref plan,
            no_rename,
            ref collision_suffix,
        } => {
            let mut migration = MigrationConfig::default().with_collision_suffix(collision_suffix.clone());
            if no_rename {
                migration = migration.without_collision_rename();
            }

            // First Ctrl-C stops the run at the next safe point; everything
            // created so far is logged. A second one exits at once.
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("interrupt received, stopping after the current request; press Ctrl-C again to exit now");
                let _ = shutdown_tx.send(());

                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("Interrupted; a create in flight may be missing from the rollback log");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            });

            commands::import(
                &config,
                executor,
                plan,
                &log_path,
                migration,
                shutdown_rx,
                &*formatter,
            )
            .await
        }
        Command::Rollback {
            ref confirm,
            list,
            keep_log,
        } => {
            let rollback_config = if keep_log {
                RollbackConfig::default().keep_log()
            } else {
                RollbackConfig::default()
            };
            commands::rollback(
                &config,
                executor,
                &log_path,
                confirm.clone(),
                list,
                rollback_config,
                &*formatter,
            )
            .await
        }
    }
}
