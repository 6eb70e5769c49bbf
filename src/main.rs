use anyhow::{Context, Result};
use chrono::Utc;
use metabase::{
    DeleteBucketObjects, DeleteExpiredObjects, LoggingPieceDeleter, Metabase, MetabaseOptions,
    config::{AppConfig, Command},
    models::BucketLocation,
};
use std::{fs, path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, migrate, command) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting metabase-gc with config: {:?}", cfg);

    ensure_sqlite_parent_dir(&cfg.database_url)?;

    // --- Connect ---
    let db = Metabase::open(
        &cfg.database_url,
        MetabaseOptions {
            max_connections: cfg.max_connections,
            as_of_system_time: !cfg.as_of_system_time_interval.is_zero(),
        },
    )
    .await
    .with_context(|| format!("opening metabase at {}", cfg.database_url))?;

    // --- Handle migration ---
    if migrate || command == Command::Migrate {
        db.migrate_to_latest().await.context("migrating metabase")?;
        tracing::info!("Database migration complete.");
        if command == Command::Migrate {
            db.close().await;
            return Ok(()); // exit after migration
        }
    }

    // --- Cancel between batches on Ctrl-C ---
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current batch");
                cancel.cancel();
            }
        });
    }

    let result = run(&db, &cfg, command, &cancel).await;
    db.close().await;
    result
}

async fn run(db: &Metabase, cfg: &AppConfig, command: Command, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::Migrate => Ok(()),
        Command::DeleteExpired { expired_before } => {
            let now = Utc::now();
            db.delete_expired_objects(
                DeleteExpiredObjects {
                    expired_before: expired_before.unwrap_or(now),
                    as_of_system_time: cfg.as_of_system_time(now),
                    batch_size: cfg.batch_size,
                },
                cancel,
            )
            .await
            .context("deleting expired objects")?;
            tracing::info!("expired objects deleted");
            Ok(())
        }
        Command::DeleteBucket { project_id, bucket } => {
            let location = BucketLocation {
                project_id,
                bucket_name: bucket,
            };
            if !db.has_bucket(&location).await? {
                anyhow::bail!("bucket {} not found", location);
            }
            let deleted = db
                .delete_bucket_objects(
                    DeleteBucketObjects {
                        bucket: location.clone(),
                        batch_size: cfg.batch_size,
                        delete_pieces: Some(Arc::new(LoggingPieceDeleter)),
                    },
                    cancel,
                )
                .await
                .with_context(|| format!("deleting objects of bucket {}", location))?;
            tracing::info!("deleted {} objects from bucket {}", deleted, location);
            Ok(())
        }
    }
}

/// Create the parent directory of a SQLite database file if needed.
fn ensure_sqlite_parent_dir(database_url: &str) -> Result<()> {
    let Some(rest) = database_url.strip_prefix("sqlite:") else {
        return Ok(());
    };
    let db_path = rest.trim_start_matches("//");
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    if db_path.is_empty() || db_path.starts_with(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    Ok(())
}
