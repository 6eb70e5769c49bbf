//! Keyspace scanner.
//!
//! Pages through the objects table ordered by
//! `(project_id, bucket_name, object_key, version)`. Every call is a fresh
//! bounded query that starts strictly after the previous page's last key,
//! so no server-side cursor is held between pages and a restarted run
//! simply begins again from the zero key.

use crate::{
    errors::MetabaseResult,
    models::{BucketLocation, ObjectKey, ObjectStream},
    services::metabase::{Metabase, string_column, timestamp_column, uuid_column},
};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::any::AnyRow;

/// Which objects a scan returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanFilter {
    /// Objects whose `expires_at` is strictly before the cutoff.
    ExpiredBefore(DateTime<Utc>),
    /// Objects in exactly this bucket.
    Bucket(BucketLocation),
}

/// One bounded page request.
#[derive(Clone, Debug)]
pub struct ScanObjects {
    /// Exclusive lower bound. Only the key tuple is compared; the stream ID
    /// is ignored.
    pub start_after: ObjectStream,
    pub filter: ScanFilter,
    /// Historical read timestamp, honored when the store supports it.
    pub as_of_system_time: Option<DateTime<Utc>>,
    pub limit: usize,
}

/// An object identity returned by a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannedObject {
    pub stream: ObjectStream,
    pub expires_at: Option<DateTime<Utc>>,
}

const SCAN_COLUMNS: &str = "project_id, bucket_name, object_key, version, stream_id, expires_at";

impl Metabase {
    /// Return up to `limit` matching objects strictly after `start_after`,
    /// in ascending key order. A page shorter than `limit` means the
    /// matching keyspace is exhausted.
    pub async fn scan_objects(&self, opts: &ScanObjects) -> MetabaseResult<Vec<ScannedObject>> {
        if opts.limit == 0 {
            return Ok(Vec::new());
        }

        let as_of = self.as_of_system_time_clause(opts.as_of_system_time, Utc::now());
        let start = &opts.start_after;
        let limit = i64::try_from(opts.limit).unwrap_or(i64::MAX);

        let rows: Vec<AnyRow> = match &opts.filter {
            ScanFilter::ExpiredBefore(cutoff) => {
                let sql = format!(
                    "SELECT {SCAN_COLUMNS} FROM objects{as_of}
                     WHERE (project_id, bucket_name, object_key, version) > ($1, $2, $3, $4)
                       AND expires_at < $5
                     ORDER BY project_id, bucket_name, object_key, version
                     LIMIT $6"
                );
                sqlx::query(&sql)
                    .bind(start.project_id.as_bytes().to_vec())
                    .bind(start.bucket_name.as_bytes().to_vec())
                    .bind(start.object_key.as_bytes().to_vec())
                    .bind(start.version)
                    .bind(cutoff.timestamp_micros())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            ScanFilter::Bucket(bucket) => {
                // Equality on both halves of the bucket; the cursor only
                // advances through (object_key, version) inside it.
                let (after_key, after_version) = if start.location().bucket() == *bucket {
                    (start.object_key.clone(), start.version)
                } else {
                    (ObjectKey::default(), 0)
                };
                let sql = format!(
                    "SELECT {SCAN_COLUMNS} FROM objects{as_of}
                     WHERE project_id = $1 AND bucket_name = $2
                       AND (object_key, version) > ($3, $4)
                     ORDER BY project_id, bucket_name, object_key, version
                     LIMIT $5"
                );
                sqlx::query(&sql)
                    .bind(bucket.project_id.as_bytes().to_vec())
                    .bind(bucket.bucket_name.as_bytes().to_vec())
                    .bind(after_key.0)
                    .bind(after_version)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(scanned_object_from_row).collect()
    }
}

fn scanned_object_from_row(row: &AnyRow) -> MetabaseResult<ScannedObject> {
    let object_key: Vec<u8> = row.try_get("object_key")?;
    Ok(ScannedObject {
        stream: ObjectStream {
            project_id: uuid_column(row, "objects", "project_id")?,
            bucket_name: string_column(row, "objects", "bucket_name")?,
            object_key: ObjectKey(object_key),
            version: row.try_get("version")?,
            stream_id: uuid_column(row, "objects", "stream_id")?,
        },
        expires_at: timestamp_column(row, "objects", "expires_at")?,
    })
}
