//! Raw table access for tests and fixtures.
//!
//! These bypass the upload path: rows are written exactly as given and read
//! back in key order, so tests can set up arbitrary states and verify what
//! remains after an operation.

use crate::{
    errors::{MetabaseError, MetabaseResult},
    models::{
        EncryptionParameters, ObjectKey, ObjectStatus, ObjectStream, PieceId, Pieces, RawObject,
        RawSegment, RedundancyScheme, SegmentPosition,
    },
    services::metabase::{Metabase, required_timestamp_column, string_column, timestamp_column, uuid_column},
};
use sqlx::Row;
use sqlx::any::AnyRow;

impl Metabase {
    /// Insert objects verbatim, in one transaction.
    pub async fn testing_batch_insert_objects(&self, objects: &[RawObject]) -> MetabaseResult<()> {
        let mut tx = self.pool.begin().await?;
        for object in objects {
            let stream = &object.stream;
            let encryption = encode_json("objects", "encryption", &object.encryption)?;
            sqlx::query(
                "INSERT INTO objects (
                    project_id, bucket_name, object_key, version, stream_id,
                    created_at, expires_at, status, segment_count,
                    total_plain_size, total_encrypted_size, fixed_segment_size, encryption
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(stream.project_id.as_bytes().to_vec())
            .bind(stream.bucket_name.as_bytes().to_vec())
            .bind(stream.object_key.as_bytes().to_vec())
            .bind(stream.version)
            .bind(stream.stream_id.as_bytes().to_vec())
            .bind(object.created_at.timestamp_micros())
            .bind(object.expires_at.map(|at| at.timestamp_micros()))
            .bind(object.status.code())
            .bind(i64::from(object.segment_count))
            .bind(object.total_plain_size)
            .bind(object.total_encrypted_size)
            .bind(i64::from(object.fixed_segment_size))
            .bind(encryption)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Insert segments verbatim, in one transaction.
    pub async fn testing_batch_insert_segments(&self, segments: &[RawSegment]) -> MetabaseResult<()> {
        let mut tx = self.pool.begin().await?;
        for segment in segments {
            let redundancy = encode_json("segments", "redundancy", &segment.redundancy)?;
            let pieces = encode_json("segments", "pieces", &segment.pieces)?;
            sqlx::query(
                "INSERT INTO segments (
                    stream_id, position, created_at, root_piece_id,
                    encrypted_key_nonce, encrypted_key, encrypted_etag,
                    encrypted_size, plain_offset, plain_size, redundancy, pieces
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(segment.stream_id.as_bytes().to_vec())
            .bind(segment.position.encode() as i64)
            .bind(segment.created_at.timestamp_micros())
            .bind(segment.root_piece_id.0.to_vec())
            .bind(segment.encrypted_key_nonce.clone())
            .bind(segment.encrypted_key.clone())
            .bind(segment.encrypted_etag.clone())
            .bind(i64::from(segment.encrypted_size))
            .bind(segment.plain_offset)
            .bind(i64::from(segment.plain_size))
            .bind(redundancy)
            .bind(pieces)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Every object row, in key order.
    pub async fn testing_all_objects(&self) -> MetabaseResult<Vec<RawObject>> {
        let rows = sqlx::query(
            "SELECT project_id, bucket_name, object_key, version, stream_id,
                    created_at, expires_at, status, segment_count,
                    total_plain_size, total_encrypted_size, fixed_segment_size, encryption
             FROM objects
             ORDER BY project_id, bucket_name, object_key, version",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(raw_object_from_row).collect()
    }

    /// Every segment row, ordered by stream and position.
    pub async fn testing_all_segments(&self) -> MetabaseResult<Vec<RawSegment>> {
        let rows = sqlx::query(
            "SELECT stream_id, position, created_at, root_piece_id,
                    encrypted_key_nonce, encrypted_key, encrypted_etag,
                    encrypted_size, plain_offset, plain_size, redundancy, pieces
             FROM segments
             ORDER BY stream_id, position",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(raw_segment_from_row).collect()
    }

    /// Remove every object, segment and bucket row.
    pub async fn testing_delete_all(&self) -> MetabaseResult<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["objects", "segments", "buckets"] {
            sqlx::query(&format!("DELETE FROM {table}")).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn encode_json<T: serde::Serialize>(table: &'static str, column: &'static str, value: &T) -> MetabaseResult<String> {
    serde_json::to_string(value).map_err(|err| MetabaseError::Corrupt {
        table,
        column,
        reason: err.to_string(),
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(row: &AnyRow, table: &'static str, column: &'static str) -> MetabaseResult<T> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|err| MetabaseError::Corrupt {
        table,
        column,
        reason: err.to_string(),
    })
}

fn int_column<T: TryFrom<i64>>(row: &AnyRow, table: &'static str, column: &'static str) -> MetabaseResult<T> {
    let value: i64 = row.try_get(column)?;
    T::try_from(value).map_err(|_| MetabaseError::Corrupt {
        table,
        column,
        reason: format!("value out of range: {value}"),
    })
}

fn raw_object_from_row(row: &AnyRow) -> MetabaseResult<RawObject> {
    let object_key: Vec<u8> = row.try_get("object_key")?;
    let status: i64 = row.try_get("status")?;
    let encryption: EncryptionParameters = decode_json(row, "objects", "encryption")?;

    Ok(RawObject {
        stream: ObjectStream {
            project_id: uuid_column(row, "objects", "project_id")?,
            bucket_name: string_column(row, "objects", "bucket_name")?,
            object_key: ObjectKey(object_key),
            version: row.try_get("version")?,
            stream_id: uuid_column(row, "objects", "stream_id")?,
        },
        created_at: required_timestamp_column(row, "objects", "created_at")?,
        expires_at: timestamp_column(row, "objects", "expires_at")?,
        status: ObjectStatus::from_code(status).ok_or_else(|| MetabaseError::Corrupt {
            table: "objects",
            column: "status",
            reason: format!("unknown status {status}"),
        })?,
        segment_count: int_column(row, "objects", "segment_count")?,
        total_plain_size: row.try_get("total_plain_size")?,
        total_encrypted_size: row.try_get("total_encrypted_size")?,
        fixed_segment_size: int_column(row, "objects", "fixed_segment_size")?,
        encryption,
    })
}

fn raw_segment_from_row(row: &AnyRow) -> MetabaseResult<RawSegment> {
    let position: i64 = row.try_get("position")?;
    let root_piece_id: Vec<u8> = row.try_get("root_piece_id")?;
    let redundancy: RedundancyScheme = decode_json(row, "segments", "redundancy")?;
    let pieces: Pieces = decode_json(row, "segments", "pieces")?;

    Ok(RawSegment {
        stream_id: uuid_column(row, "segments", "stream_id")?,
        position: SegmentPosition::decode(position as u64),
        created_at: required_timestamp_column(row, "segments", "created_at")?,
        root_piece_id: PieceId::from_slice(&root_piece_id).ok_or_else(|| MetabaseError::Corrupt {
            table: "segments",
            column: "root_piece_id",
            reason: format!("expected 32 bytes, got {}", root_piece_id.len()),
        })?,
        encrypted_key_nonce: row.try_get("encrypted_key_nonce")?,
        encrypted_key: row.try_get("encrypted_key")?,
        encrypted_etag: row.try_get("encrypted_etag")?,
        encrypted_size: int_column(row, "segments", "encrypted_size")?,
        plain_offset: row.try_get("plain_offset")?,
        plain_size: int_column(row, "segments", "plain_size")?,
        redundancy,
        pieces,
    })
}
