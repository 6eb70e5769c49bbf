//! Bucket directory: creation and lookup of bucket records.
//!
//! The deletion engine only reads from here; bucket records are never
//! touched by object deletion.

use crate::{
    errors::{MetabaseError, MetabaseResult},
    models::{Bucket, BucketLocation},
    services::metabase::{Metabase, required_timestamp_column, string_column, uuid_column},
};
use chrono::{DateTime, Utc};
use sqlx::any::AnyRow;
use uuid::Uuid;

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

impl Metabase {
    /// Insert a new bucket record.
    ///
    /// Validates the location and name. Returns InvalidRequest if the
    /// bucket already exists in the project.
    pub async fn create_bucket(&self, location: &BucketLocation) -> MetabaseResult<Bucket> {
        location.verify()?;
        ensure_bucket_name_valid(&location.bucket_name)?;

        let now = Utc::now();
        let bucket = Bucket {
            id: Uuid::new_v4(),
            project_id: location.project_id,
            name: location.bucket_name.clone(),
            created_at: DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now),
        };

        match sqlx::query("INSERT INTO buckets (id, project_id, name, created_at) VALUES ($1, $2, $3, $4)")
            .bind(bucket.id.as_bytes().to_vec())
            .bind(bucket.project_id.as_bytes().to_vec())
            .bind(bucket.name.as_bytes().to_vec())
            .bind(bucket.created_at.timestamp_micros())
            .execute(&self.pool)
            .await
        {
            Ok(_) => Ok(bucket),
            Err(err) if is_unique_violation(&err) => Err(MetabaseError::InvalidRequest(format!(
                "bucket `{location}` already exists"
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch a bucket record, `None` if it does not exist.
    pub async fn get_bucket(&self, location: &BucketLocation) -> MetabaseResult<Option<Bucket>> {
        location.verify()?;
        let row = sqlx::query(
            "SELECT id, project_id, name, created_at FROM buckets
             WHERE project_id = $1 AND name = $2",
        )
        .bind(location.project_id.as_bytes().to_vec())
        .bind(location.bucket_name.as_bytes().to_vec())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(bucket_from_row).transpose()
    }

    pub async fn has_bucket(&self, location: &BucketLocation) -> MetabaseResult<bool> {
        Ok(self.get_bucket(location).await?.is_some())
    }
}

fn bucket_from_row(row: &AnyRow) -> MetabaseResult<Bucket> {
    Ok(Bucket {
        id: uuid_column(row, "buckets", "id")?,
        project_id: uuid_column(row, "buckets", "project_id")?,
        name: string_column(row, "buckets", "name")?,
        created_at: required_timestamp_column(row, "buckets", "created_at")?,
    })
}

/// Validate bucket name format.
///
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - must start and end with a letter or digit
/// - no consecutive dots or dot-hyphen pairs
/// - must not look like an IPv4 address
fn ensure_bucket_name_valid(name: &str) -> MetabaseResult<()> {
    let invalid = |reason: &str| MetabaseError::InvalidRequest(format!("bucket name `{name}` invalid: {reason}"));

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }

    if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }

    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid("cannot contain consecutive dots or dot-hyphen combinations"));
    }

    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }

    Ok(())
}

/// Return true if the error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                || db_err.message().to_ascii_lowercase().contains("unique")
                || db_err.message().to_ascii_lowercase().contains("duplicate key")
        }
        _ => false,
    }
}

/// Check if a string matches IPv4-like dotted decimal form, e.g. `1.2.3.4`.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|part| {
            !part.is_empty()
                && part.len() <= 3
                && part.chars().all(|c| c.is_ascii_digit())
                && part.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dns_like_names() {
        for name in ["photos", "my-bucket.2024", "abc", "a".repeat(63).as_str()] {
            ensure_bucket_name_valid(name).unwrap();
        }
    }

    #[test]
    fn rejects_malformed_names() {
        for name in [
            "ab",
            "a".repeat(64).as_str(),
            "Photos",
            "under_score",
            "-leading",
            "trailing.",
            "double..dot",
            "dot.-hyphen",
            "192.168.1.1",
        ] {
            assert!(
                matches!(ensure_bucket_name_valid(name), Err(MetabaseError::InvalidRequest(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn ipv4_detection_requires_four_octets() {
        assert!(is_ipv4_like("10.0.0.1"));
        assert!(!is_ipv4_like("10.0.0"));
        assert!(!is_ipv4_like("300.0.0.1"));
        assert!(!is_ipv4_like("a.b.c.d"));
    }
}
