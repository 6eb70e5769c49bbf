use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::{env, str::FromStr, time::Duration};
use uuid::Uuid;

/// Centralized configuration for the GC runner.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Objects per scan/delete batch. Clamped by the engine.
    pub batch_size: usize,
    /// How far in the past scans read. Zero disables historical reads.
    pub as_of_system_time_interval: Duration,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Metabase garbage collection runner")]
pub struct Args {
    /// Database URL (overrides METABASE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Connection pool size (overrides METABASE_MAX_CONNECTIONS)
    #[arg(long)]
    pub max_connections: Option<u32>,

    /// Objects per batch (overrides METABASE_BATCH_SIZE)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Seconds behind now that scans read at, where supported
    /// (overrides METABASE_AS_OF_SYSTEM_TIME_INTERVAL)
    #[arg(long)]
    pub as_of_system_time_interval: Option<u64>,

    /// Apply migrations before running the command
    #[arg(long)]
    pub migrate: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Apply migrations and exit
    Migrate,
    /// Delete every object whose expiration has passed
    DeleteExpired {
        /// Cutoff timestamp (RFC 3339). Defaults to now.
        #[arg(long)]
        expired_before: Option<DateTime<Utc>>,
    },
    /// Delete every object in one bucket
    DeleteBucket {
        #[arg(long)]
        project_id: Uuid,
        #[arg(long)]
        bucket: String,
    },
}

const DEFAULT_DATABASE_URL: &str = "sqlite://./data/metabase.db?mode=rwc";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_AS_OF_SYSTEM_TIME_INTERVAL_SECS: u64 = 5;

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig, the migrate
    /// flag and the command to run.
    pub fn from_env_and_args() -> Result<(Self, bool, Command)> {
        Self::from_args(Args::parse())
    }

    /// Merge already-parsed args over the environment.
    pub fn from_args(args: Args) -> Result<(Self, bool, Command)> {
        let database_url = match args.database_url {
            Some(url) => url,
            None => env::var("METABASE_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.into()),
        };
        let max_connections = match args.max_connections {
            Some(value) => value,
            None => env_or("METABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
        };
        // Zero is a valid setting: the engine replaces it with its maximum.
        let batch_size = match args.batch_size {
            Some(value) => value,
            None => env_or("METABASE_BATCH_SIZE", 0)?,
        };
        let interval_secs = match args.as_of_system_time_interval {
            Some(value) => value,
            None => env_or(
                "METABASE_AS_OF_SYSTEM_TIME_INTERVAL",
                DEFAULT_AS_OF_SYSTEM_TIME_INTERVAL_SECS,
            )?,
        };

        let cfg = Self {
            database_url,
            max_connections,
            batch_size,
            as_of_system_time_interval: Duration::from_secs(interval_secs),
        };

        Ok((cfg, args.migrate, args.command))
    }

    /// Read timestamp for scans started at `now`, if historical reads are on.
    pub fn as_of_system_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.as_of_system_time_interval.is_zero() {
            return None;
        }
        let interval = chrono::Duration::from_std(self.as_of_system_time_interval).ok()?;
        now.checked_sub_signed(interval)
    }
}

/// Read and parse an environment variable, falling back when it is unset.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
