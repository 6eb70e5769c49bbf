//! Represents a logical bucket, a project-scoped namespace for objects.

use crate::errors::{MetabaseError, MetabaseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A bucket record from the bucket directory.
///
/// The deletion engine never creates or removes these; deleting every
/// object in a bucket leaves its record in place.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// Unique identifier for this bucket.
    pub id: Uuid,

    /// Project that owns the bucket.
    pub project_id: Uuid,

    /// Bucket name, unique within the project.
    pub name: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}

impl Bucket {
    pub fn location(&self) -> BucketLocation {
        BucketLocation {
            project_id: self.project_id,
            bucket_name: self.name.clone(),
        }
    }
}

/// (ProjectID, BucketName) pair identifying a bucket.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketLocation {
    pub project_id: Uuid,
    pub bucket_name: String,
}

impl BucketLocation {
    /// Both halves are required. An empty bucket name would otherwise turn
    /// an equality match into a scan over the whole project.
    pub fn verify(&self) -> MetabaseResult<()> {
        if self.project_id.is_nil() {
            return Err(MetabaseError::InvalidRequest("ProjectID missing".into()));
        }
        if self.bucket_name.is_empty() {
            return Err(MetabaseError::InvalidRequest("BucketName missing".into()));
        }
        Ok(())
    }
}

impl fmt::Display for BucketLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.bucket_name)
    }
}
