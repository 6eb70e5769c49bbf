#![allow(dead_code)]

use chrono::{DateTime, Utc};
use metabase::{
    Metabase, MetabaseOptions,
    models::{
        DEFAULT_VERSION, EncryptionParameters, NodeId, ObjectStatus, ObjectStream, Piece, PieceId,
        Pieces, RawObject, RawSegment, RedundancyScheme, SegmentPosition,
    },
};
use tempfile::TempDir;
use uuid::Uuid;

/// A migrated metabase backed by a SQLite file in a temporary directory.
pub struct TestDb {
    pub db: Metabase,
    pub url: String,
    _dir: TempDir,
}

pub async fn test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("metabase.db").display());
    let db = Metabase::open(
        &url,
        MetabaseOptions {
            max_connections: 2,
            as_of_system_time: true,
        },
    )
    .await
    .expect("open metabase");
    db.migrate_to_latest().await.expect("migrate");
    TestDb { db, url, _dir: dir }
}

/// Overwrite the piece list of a stream's segments with undecodable data.
pub async fn corrupt_segment_pieces(t: &TestDb, stream_id: Uuid) {
    let pool = sqlx::AnyPool::connect(&t.url).await.expect("raw pool");
    sqlx::query("UPDATE segments SET pieces = 'not json' WHERE stream_id = $1")
        .bind(stream_id.as_bytes().to_vec())
        .execute(&pool)
        .await
        .expect("corrupt pieces");
    pool.close().await;
}

/// Count a stream's segment rows without decoding them.
pub async fn count_segment_rows(t: &TestDb, stream_id: Uuid) -> i64 {
    let pool = sqlx::AnyPool::connect(&t.url).await.expect("raw pool");
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM segments WHERE stream_id = $1")
        .bind(stream_id.as_bytes().to_vec())
        .fetch_one(&pool)
        .await
        .expect("count segments");
    pool.close().await;
    count
}

/// Current time truncated to what the store keeps (microseconds).
pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp_micros(Utc::now().timestamp_micros()).unwrap()
}

pub fn rand_object_stream() -> ObjectStream {
    ObjectStream {
        project_id: Uuid::new_v4(),
        bucket_name: format!("bucket-{}", &Uuid::new_v4().simple().to_string()[..8]),
        object_key: format!("key/{}", Uuid::new_v4().simple()).as_str().into(),
        version: DEFAULT_VERSION,
        stream_id: Uuid::new_v4(),
    }
}

pub fn test_encryption() -> EncryptionParameters {
    EncryptionParameters {
        cipher_suite: 4,
        block_size: 29 * 256,
    }
}

pub fn test_redundancy() -> RedundancyScheme {
    RedundancyScheme {
        algorithm: 1,
        share_size: 256,
        required_shares: 1,
        repair_shares: 1,
        optimal_shares: 1,
        total_shares: 1,
    }
}

pub fn committed_object(stream: &ObjectStream, segment_count: i32, created_at: DateTime<Utc>) -> RawObject {
    RawObject {
        stream: stream.clone(),
        created_at,
        expires_at: None,
        status: ObjectStatus::Committed,
        segment_count,
        total_plain_size: 512 * i64::from(segment_count),
        total_encrypted_size: 1024 * i64::from(segment_count),
        fixed_segment_size: 512,
        encryption: test_encryption(),
    }
}

pub fn test_segment(stream_id: Uuid, index: u32, created_at: DateTime<Utc>) -> RawSegment {
    RawSegment {
        stream_id,
        position: SegmentPosition { part: 0, index },
        created_at,
        root_piece_id: PieceId([1; 32]),
        encrypted_key_nonce: vec![4],
        encrypted_key: vec![3],
        encrypted_etag: Some(vec![5]),
        encrypted_size: 1024,
        plain_offset: 512 * i64::from(index),
        plain_size: 512,
        redundancy: test_redundancy(),
        pieces: Pieces::from(vec![Piece {
            number: 0,
            storage_node: NodeId([2; 32]),
        }]),
    }
}

/// Insert a committed object with `segments` single-piece segments.
pub async fn create_object(db: &Metabase, stream: &ObjectStream, segments: u32) -> RawObject {
    create_object_expiring(db, stream, segments, None).await
}

pub async fn create_object_expiring(
    db: &Metabase,
    stream: &ObjectStream,
    segments: u32,
    expires_at: Option<DateTime<Utc>>,
) -> RawObject {
    let created_at = now();
    let mut object = committed_object(stream, segments as i32, created_at);
    object.expires_at = expires_at;
    db.testing_batch_insert_objects(std::slice::from_ref(&object))
        .await
        .expect("insert object");

    let rows: Vec<RawSegment> = (0..segments)
        .map(|index| test_segment(stream.stream_id, index, created_at))
        .collect();
    db.testing_batch_insert_segments(&rows).await.expect("insert segments");
    object
}
