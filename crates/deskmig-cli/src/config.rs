//! Command line arguments and the migrator configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;

use deskmig_client::config::{DEFAULT_MAX_ATTEMPTS, DEFAULT_PAGE_SIZE};
use deskmig_client::{ExecutorConfig, InstanceConfig};
use deskmig_core::migration::DEFAULT_COLLISION_SUFFIX;
use deskmig_core::rollback::DEFAULT_LOG_FILE;

use crate::formatter::OutputFormat;

/// File name searched in the working and home directories.
pub const CONFIG_FILE: &str = "config.json";

/// Default plan file name.
pub const DEFAULT_PLAN_FILE: &str = "migration_plan.csv";

/// Migrate helpdesk fields and forms between instances.
#[derive(Debug, Parser)]
#[command(name = "deskmig")]
#[command(version, about = "Migrate helpdesk fields and forms between instances")]
pub struct Args {
    /// Configuration file with source and target credentials.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Rollback log path, overriding the configuration file.
    #[arg(long, global = true)]
    pub rollback_log: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Attempts per request for timeouts and server errors.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Page size for collection reads.
    #[arg(long, global = true, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Longest single rate-limit wait in seconds.
    #[arg(long, global = true)]
    pub max_rate_limit_wait_secs: Option<u64>,

    /// Output format.
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compare the source with the target and write the plan CSV.
    Analyze {
        /// Where to write the plan.
        #[arg(short, long, default_value = DEFAULT_PLAN_FILE)]
        output: PathBuf,
    },

    /// Create the objects of a curated plan in the target.
    Import {
        /// Plan to import.
        #[arg(short, long, default_value = DEFAULT_PLAN_FILE)]
        plan: PathBuf,

        /// Fail on key collisions instead of retrying under a new key.
        #[arg(long)]
        no_rename: bool,

        /// Suffix used when retrying a colliding key.
        #[arg(long, default_value = DEFAULT_COLLISION_SUFFIX)]
        collision_suffix: String,
    },

    /// Delete every object recorded in the rollback log.
    Rollback {
        /// Confirmation token; prompts when omitted.
        #[arg(long)]
        confirm: Option<String>,

        /// List what would be deleted and exit.
        #[arg(long)]
        list: bool,

        /// Keep the log rows after a complete rollback.
        #[arg(long)]
        keep_log: bool,
    },
}

impl Args {
    /// Request policy from the flags.
    pub fn executor_config(&self) -> ExecutorConfig {
        let mut config = ExecutorConfig::new()
            .with_request_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_attempts(self.max_attempts)
            .with_page_size(self.page_size);
        if let Some(secs) = self.max_rate_limit_wait_secs {
            let waits = config.max_rate_limit_waits;
            config = config.with_rate_limit_ceiling(Duration::from_secs(secs), waits);
        }
        config
    }
}

fn default_rollback_filename() -> String {
    DEFAULT_LOG_FILE.to_string()
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct MigratorConfig {
    /// Instance fields and forms are read from.
    pub source_creds: InstanceConfig,
    /// Instance objects are created in.
    pub target_creds: InstanceConfig,
    /// Rollback log path.
    #[serde(default = "default_rollback_filename")]
    pub rollback_filename: String,
}

impl MigratorConfig {
    /// Parse a configuration file.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: MigratorConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.source_creds.validate().context("source_creds")?;
        config.target_creds.validate().context("target_creds")?;
        Ok(config)
    }

    /// Load the configuration from `explicit`, or the first of
    /// `./config.json` and `~/config.json` that exists.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<(Self, PathBuf)> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::search_paths()
                .into_iter()
                .find(|p| p.is_file())
                .with_context(|| {
                    format!("no {} in the working or home directory; pass --config", CONFIG_FILE)
                })?,
        };
        Ok((Self::from_path(&path)?, path))
    }

    /// Locations searched when no path is given.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(CONFIG_FILE));
        }
        paths
    }

    /// Rollback log path, preferring the command line.
    pub fn rollback_log_path(&self, args: &Args) -> PathBuf {
        args.rollback_log
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.rollback_filename))
    }
}
