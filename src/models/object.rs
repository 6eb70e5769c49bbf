//! Represents an object (a single version of a file) stored in a bucket.

use crate::errors::{MetabaseError, MetabaseResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::bucket::BucketLocation;

/// Object version number. Versions are positive for real objects; the zero
/// version only appears in cursor keys.
pub type Version = i64;

/// Version assigned to the first upload of a key.
pub const DEFAULT_VERSION: Version = 1;

/// Encrypted object key. Keys are opaque bytes and sort bytewise.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey(pub Vec<u8>);

impl ObjectKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ObjectKey {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for ObjectKey {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Location of an object key inside a bucket, without the version.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectLocation {
    pub project_id: Uuid,
    pub bucket_name: String,
    pub object_key: ObjectKey,
}

impl ObjectLocation {
    pub fn bucket(&self) -> BucketLocation {
        BucketLocation {
            project_id: self.project_id,
            bucket_name: self.bucket_name.clone(),
        }
    }
}

/// Exact identity of one upload of an object.
///
/// The first four fields form the keyspace order used by every scan; the
/// derived `Ord` follows the same field order, so sorting a `Vec` of streams
/// yields the same order the store returns. `stream_id` tells apart two
/// uploads that reused the same key and version.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectStream {
    pub project_id: Uuid,
    pub bucket_name: String,
    pub object_key: ObjectKey,
    pub version: Version,
    pub stream_id: Uuid,
}

impl ObjectStream {
    pub fn location(&self) -> ObjectLocation {
        ObjectLocation {
            project_id: self.project_id,
            bucket_name: self.bucket_name.clone(),
            object_key: self.object_key.clone(),
        }
    }

    /// Reject streams that cannot name a stored object.
    pub fn verify(&self) -> MetabaseResult<()> {
        self.location().bucket().verify()?;
        if self.object_key.is_empty() {
            return Err(MetabaseError::InvalidRequest("ObjectKey missing".into()));
        }
        if self.version <= 0 {
            return Err(MetabaseError::InvalidRequest(format!(
                "Version invalid: {}",
                self.version
            )));
        }
        if self.stream_id.is_nil() {
            return Err(MetabaseError::InvalidRequest("StreamID missing".into()));
        }
        Ok(())
    }
}

impl fmt::Display for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{} (stream {})",
            self.project_id, self.bucket_name, self.object_key, self.version, self.stream_id
        )
    }
}

/// Object upload state.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectStatus {
    Pending,
    Committed,
}

impl ObjectStatus {
    pub fn code(self) -> i64 {
        match self {
            Self::Pending => 1,
            Self::Committed => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Pending),
            3 => Some(Self::Committed),
            _ => None,
        }
    }
}

/// Encryption parameters the uplink used for the object.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncryptionParameters {
    pub cipher_suite: u8,
    pub block_size: i32,
}

/// Full object row as stored in the metabase.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RawObject {
    pub stream: ObjectStream,

    pub created_at: DateTime<Utc>,

    /// Objects with an expiration are reclaimed once it has passed.
    pub expires_at: Option<DateTime<Utc>>,

    pub status: ObjectStatus,
    pub segment_count: i32,

    pub total_plain_size: i64,
    pub total_encrypted_size: i64,
    pub fixed_segment_size: i32,

    pub encryption: EncryptionParameters,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(project: u8, bucket: &str, key: &str, version: Version) -> ObjectStream {
        ObjectStream {
            project_id: Uuid::from_bytes([project; 16]),
            bucket_name: bucket.into(),
            object_key: key.into(),
            version,
            stream_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn ordering_follows_keyspace() {
        let mut streams = vec![
            stream(2, "a", "a", 1),
            stream(1, "b", "a", 1),
            stream(1, "a", "b", 1),
            stream(1, "a", "a", 2),
            stream(1, "a", "a", 1),
        ];
        streams.sort();

        let keys: Vec<_> = streams
            .iter()
            .map(|s| (s.project_id.as_bytes()[0], s.bucket_name.as_str(), s.object_key.to_string(), s.version))
            .collect();
        assert_eq!(
            keys,
            vec![
                (1, "a", "a".to_string(), 1),
                (1, "a", "a".to_string(), 2),
                (1, "a", "b".to_string(), 1),
                (1, "b", "a".to_string(), 1),
                (2, "a", "a".to_string(), 1),
            ]
        );
    }

    #[test]
    fn verify_rejects_missing_parts() {
        assert!(stream(1, "bucket", "key", 1).verify().is_ok());

        let mut missing_key = stream(1, "bucket", "key", 1);
        missing_key.object_key = ObjectKey::default();
        assert!(matches!(
            missing_key.verify(),
            Err(MetabaseError::InvalidRequest(msg)) if msg == "ObjectKey missing"
        ));

        let mut zero_version = stream(1, "bucket", "key", 1);
        zero_version.version = 0;
        assert!(zero_version.verify().is_err());

        let mut nil_stream = stream(1, "bucket", "key", 1);
        nil_stream.stream_id = Uuid::nil();
        assert!(nil_stream.verify().is_err());
    }

    #[test]
    fn status_codes_round_trip() {
        for status in [ObjectStatus::Pending, ObjectStatus::Committed] {
            assert_eq!(ObjectStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(ObjectStatus::from_code(2), None);
    }
}
