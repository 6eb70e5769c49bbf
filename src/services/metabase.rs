//! src/services/metabase.rs
//!
//! Metabase: handle on the backing SQL store shared by every metabase
//! operation. The store is reached through sqlx's `Any` driver so the same
//! queries run on SQLite, PostgreSQL and CockroachDB; the concrete
//! implementation is probed once at open time and decides which optional
//! query features (historical reads) are used.

use crate::errors::{MetabaseError, MetabaseResult};
use chrono::{DateTime, Utc};
use sqlx::any::{AnyPoolOptions, install_default_drivers};
use sqlx::{AnyPool, Row};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

const SQLITE_SCHEMA: &str = include_str!("../../migrations/sqlite/0001_init.sql");
const POSTGRES_SCHEMA: &str = include_str!("../../migrations/postgres/0001_init.sql");

/// Historical reads are never pinned closer to the call time than this.
const MIN_AS_OF_SYSTEM_TIME_LAG_SECS: i64 = 1;

/// Database implementation behind the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Implementation {
    Sqlite,
    Postgres,
    Cockroach,
}

impl Implementation {
    /// Whether `AS OF SYSTEM TIME` may be attached to reads.
    pub fn supports_as_of_system_time(self) -> bool {
        matches!(self, Self::Cockroach)
    }

    fn schema(self) -> &'static str {
        match self {
            Self::Sqlite => SQLITE_SCHEMA,
            Self::Postgres | Self::Cockroach => POSTGRES_SCHEMA,
        }
    }
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Cockroach => "cockroach",
        };
        f.write_str(name)
    }
}

/// Connection options for [`Metabase::open`].
#[derive(Clone, Debug)]
pub struct MetabaseOptions {
    pub max_connections: u32,
    /// Allows historical reads when the implementation supports them.
    pub as_of_system_time: bool,
}

impl Default for MetabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            as_of_system_time: true,
        }
    }
}

/// Metabase provides the deletion and expiration engine on top of a SQL pool:
/// - keyspace scans with a resumable cursor (`scanner`)
/// - per-object transactional batch deletes (`batch_delete`)
/// - the expired-object reclaimer (`delete_expired`)
/// - the bucket-wide deleter (`delete_bucket`)
#[derive(Clone)]
pub struct Metabase {
    pub(crate) pool: AnyPool,
    implementation: Implementation,
    as_of_system_time: bool,
}

impl Metabase {
    /// Connect to `database_url` and probe which implementation serves it.
    ///
    /// `cockroach://` URLs are accepted and spoken to with the PostgreSQL
    /// wire protocol.
    pub async fn open(database_url: &str, options: MetabaseOptions) -> MetabaseResult<Self> {
        install_default_drivers();

        let (url, mut implementation) = if let Some(rest) = database_url.strip_prefix("cockroach://") {
            (format!("postgres://{rest}"), Implementation::Cockroach)
        } else if database_url.starts_with("sqlite:") {
            (database_url.to_string(), Implementation::Sqlite)
        } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
            (database_url.to_string(), Implementation::Postgres)
        } else {
            return Err(MetabaseError::InvalidRequest(format!(
                "unsupported database url scheme: {database_url}"
            )));
        };

        let pool = AnyPoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .connect(&url)
            .await?;

        if implementation == Implementation::Postgres {
            let version: String = sqlx::query_scalar("SELECT version()").fetch_one(&pool).await?;
            if version.contains("CockroachDB") {
                implementation = Implementation::Cockroach;
            }
        }

        info!(%implementation, "connected to metabase");

        Ok(Self {
            pool,
            implementation,
            as_of_system_time: options.as_of_system_time,
        })
    }

    pub fn implementation(&self) -> Implementation {
        self.implementation
    }

    /// Whether scans honor a requested historical read timestamp.
    pub fn supports_as_of_system_time(&self) -> bool {
        self.as_of_system_time && self.implementation.supports_as_of_system_time()
    }

    /// Create tables and indexes if they do not already exist.
    /// Idempotent; safe to run on every start.
    pub async fn migrate_to_latest(&self) -> MetabaseResult<()> {
        let statements = split_statements(self.implementation.schema());

        info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|err| MetabaseError::Migration(format!("{err} while executing `{stmt}`")))?;
        }

        Ok(())
    }

    /// Cheap connectivity check.
    pub async fn ping(&self) -> MetabaseResult<()> {
        let value: i64 = sqlx::query_scalar("SELECT CAST(1 AS BIGINT)").fetch_one(&self.pool).await?;
        if value != 1 {
            return Err(MetabaseError::Corrupt {
                table: "-",
                column: "ping",
                reason: format!("unexpected result: {value}"),
            });
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// `AS OF SYSTEM TIME` clause for a scan issued at `now`, or an empty
    /// string when historical reads are off or unsupported.
    pub(crate) fn as_of_system_time_clause(
        &self,
        as_of: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> String {
        if !self.supports_as_of_system_time() {
            return String::new();
        }
        as_of_system_time_clause(as_of, now)
    }
}

/// Render the historical-read clause, pinning the read at least
/// [`MIN_AS_OF_SYSTEM_TIME_LAG_SECS`] before `now`.
pub(crate) fn as_of_system_time_clause(as_of: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(as_of) = as_of else {
        return String::new();
    };
    let pinned = as_of.min(now - chrono::Duration::seconds(MIN_AS_OF_SYSTEM_TIME_LAG_SECS));
    match pinned.timestamp_nanos_opt() {
        Some(nanos) => format!(" AS OF SYSTEM TIME '{nanos}' "),
        None => String::new(),
    }
}

/// Split a schema file into statements, dropping comment-only chunks.
fn split_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|chunk| chunk.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with("--")
        }))
        .collect()
}

pub(crate) fn uuid_column(row: &sqlx::any::AnyRow, table: &'static str, column: &'static str) -> MetabaseResult<Uuid> {
    let bytes: Vec<u8> = row.try_get(column)?;
    Uuid::from_slice(&bytes).map_err(|err| MetabaseError::Corrupt {
        table,
        column,
        reason: err.to_string(),
    })
}

pub(crate) fn string_column(row: &sqlx::any::AnyRow, table: &'static str, column: &'static str) -> MetabaseResult<String> {
    let bytes: Vec<u8> = row.try_get(column)?;
    String::from_utf8(bytes).map_err(|err| MetabaseError::Corrupt {
        table,
        column,
        reason: err.to_string(),
    })
}

pub(crate) fn timestamp_column(
    row: &sqlx::any::AnyRow,
    table: &'static str,
    column: &'static str,
) -> MetabaseResult<Option<DateTime<Utc>>> {
    let micros: Option<i64> = row.try_get(column)?;
    micros
        .map(|micros| {
            DateTime::from_timestamp_micros(micros).ok_or_else(|| MetabaseError::Corrupt {
                table,
                column,
                reason: format!("timestamp out of range: {micros}"),
            })
        })
        .transpose()
}

pub(crate) fn required_timestamp_column(
    row: &sqlx::any::AnyRow,
    table: &'static str,
    column: &'static str,
) -> MetabaseResult<DateTime<Utc>> {
    timestamp_column(row, table, column)?.ok_or_else(|| MetabaseError::Corrupt {
        table,
        column,
        reason: "unexpected NULL".into(),
    })
}
