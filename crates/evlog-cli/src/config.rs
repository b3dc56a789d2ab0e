use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use evlog_archive::ArchiveSettings;
use evlog_logging::LogConfig;
use evlog_storage::{ConflictPolicy, StoreConfig};
use serde::{Deserialize, Serialize};

/// Settings file combining the store, archive and logging sections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvlogConfig {
    pub store: StoreConfig,
    pub archive: ArchiveSettings,
    pub logging: LogConfig,
}

impl EvlogConfig {
    /// Parse a TOML settings file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The settings file if given, otherwise the defaults, with command line
    /// overrides applied
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(db) = &cli.db {
            config.store.db_path = db.clone();
        }
        if let Some(level) = &cli.log_level {
            config.logging.default_level = level.clone();
        }
        if let Some(dir) = &cli.archive_dir {
            config.archive.archive_dir = dir.clone();
        }
        if let Some(job) = &cli.job {
            config.archive.job = job.clone();
        }
        if let Some(machine) = &cli.machine {
            config.archive.machine = machine.clone();
        }
        Ok(config)
    }
}

#[derive(Debug, Parser)]
#[command(name = "evlog", about = "Event log store and monthly archives", version)]
pub struct Cli {
    /// TOML settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Database file (overrides the settings file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    /// Archive folder (overrides the settings file)
    #[arg(long, global = true)]
    pub archive_dir: Option<PathBuf>,
    /// Job name used in archive names
    #[arg(long, global = true)]
    pub job: Option<String>,
    /// Machine name used in archive names
    #[arg(long, global = true)]
    pub machine: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an empty store
    Init,
    /// Import raw records from JSON lines
    Import {
        /// Input file, `-` for stdin
        #[arg(default_value = "-")]
        input: PathBuf,
        /// What to do with already stored record ids
        #[arg(long, default_value_t = ConflictPolicy::Fail)]
        policy: ConflictPolicy,
        /// Stop after this many inserted records
        #[arg(long)]
        limit: Option<usize>,
        /// Skip records at or below the store's highest record id
        #[arg(long)]
        above_max: bool,
    },
    /// Print stored headers (or payloads) as JSON lines
    Scan {
        /// Lowest record id
        #[arg(long, default_value_t = 0)]
        from: i64,
        /// Highest record id
        #[arg(long, default_value_t = i64::MAX)]
        to: i64,
        /// Newest first
        #[arg(long)]
        descending: bool,
        /// Maximum rows
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        event_id: Option<i32>,
        #[arg(long)]
        provider_id: Option<u32>,
        #[arg(long)]
        task_id: Option<i32>,
        /// Print payload text instead of headers
        #[arg(long)]
        payloads: bool,
    },
    /// Show record counts and dimension rows
    Info,
    /// Monthly archive operations
    #[command(subcommand)]
    Archive(ArchiveCommand),
}

#[derive(Debug, Subcommand)]
pub enum ArchiveCommand {
    /// Resolve the range and target of an archive without writing it
    Plan {
        /// Starting record id
        start: i64,
        /// Ending record id (defaults to the end of the start's month)
        end: Option<i64>,
    },
    /// Write an archive
    Build { start: i64, end: Option<i64> },
    /// List the archives of the job in the archive folder
    List,
    /// Print the records of an archive file
    Dump { file: PathBuf },
}
