//! Batch transactional deleter.
//!
//! Every object in a batch becomes one unit of work: its own
//! `BEGIN … COMMIT` that removes the object row (matched on the full key and
//! the stream ID) and then the segments of that stream. All units of a batch
//! are dispatched over a single checked-out connection. A failing unit rolls
//! back alone; its siblings still commit.

use crate::{
    errors::{DeleteStage, MetabaseError, MetabaseResult, ObjectDeleteFailure},
    models::{DeletedSegmentInfo, ObjectStream, PieceId, Pieces, SegmentPosition},
    services::metabase::Metabase,
};
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Connection, Row};
use tracing::{debug, warn};

/// An object removed by a batch, with the segments removed alongside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeletedObject {
    pub stream: ObjectStream,
    /// Sorted by position.
    pub segments: Vec<DeletedSegmentInfo>,
}

/// Result of dispatching one batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Objects whose row was removed, in batch order.
    pub deleted: Vec<DeletedObject>,
    /// Objects whose transaction rolled back.
    pub failures: Vec<ObjectDeleteFailure>,
}

impl BatchOutcome {
    /// Number of identities that matched nothing (already gone or replaced).
    pub fn missing(&self, requested: usize) -> usize {
        requested.saturating_sub(self.deleted.len() + self.failures.len())
    }

    /// All segments freed by the batch.
    pub fn deleted_segments(&self) -> Vec<DeletedSegmentInfo> {
        self.deleted
            .iter()
            .flat_map(|object| object.segments.iter().cloned())
            .collect()
    }
}

/// Delete of a single object; runs in its own transaction.
struct DeleteObjectUnit<'a> {
    object: &'a ObjectStream,
}

impl DeleteObjectUnit<'_> {
    fn fail(&self, stage: DeleteStage, source: sqlx::Error) -> ObjectDeleteFailure {
        ObjectDeleteFailure {
            object: self.object.clone(),
            stage,
            source,
        }
    }

    /// `Ok(None)` when no row matched the exact identity.
    async fn run(&self, conn: &mut AnyConnection) -> Result<Option<DeletedObject>, ObjectDeleteFailure> {
        let object = self.object;
        let mut tx = conn
            .begin()
            .await
            .map_err(|err| self.fail(DeleteStage::Begin, err))?;

        let result = sqlx::query(
            "DELETE FROM objects
             WHERE project_id = $1 AND bucket_name = $2 AND object_key = $3 AND version = $4
               AND stream_id = $5",
        )
        .bind(object.project_id.as_bytes().to_vec())
        .bind(object.bucket_name.as_bytes().to_vec())
        .bind(object.object_key.as_bytes().to_vec())
        .bind(object.version)
        .bind(object.stream_id.as_bytes().to_vec())
        .execute(&mut *tx)
        .await
        .map_err(|err| self.fail(DeleteStage::DeleteObject, err))?;

        if result.rows_affected() == 0 {
            // Replaced or already deleted: leave the current stream's
            // segments alone.
            tx.commit()
                .await
                .map_err(|err| self.fail(DeleteStage::Commit, err))?;
            return Ok(None);
        }

        let rows = sqlx::query(
            "DELETE FROM segments WHERE stream_id = $1
             RETURNING position, root_piece_id, pieces",
        )
        .bind(object.stream_id.as_bytes().to_vec())
        .fetch_all(&mut *tx)
        .await
        .map_err(|err| self.fail(DeleteStage::DeleteSegments, err))?;

        let mut segments = rows
            .iter()
            .map(|row| deleted_segment_from_row(object, row))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| self.fail(DeleteStage::DeleteSegments, err))?;
        segments.sort_by_key(|segment| segment.position);

        tx.commit()
            .await
            .map_err(|err| self.fail(DeleteStage::Commit, err))?;

        Ok(Some(DeletedObject {
            stream: object.clone(),
            segments,
        }))
    }
}

impl Metabase {
    /// Delete each listed object and its segments, one transaction per
    /// object, over one connection.
    ///
    /// Deleting an identity that no longer exists is a no-op. A malformed
    /// identity or failing to obtain the connection fails the whole call;
    /// per-object failures are reported in [`BatchOutcome::failures`] next
    /// to the successes.
    pub async fn delete_objects_batch(&self, objects: &[ObjectStream]) -> MetabaseResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        if objects.is_empty() {
            return Ok(outcome);
        }
        for object in objects {
            object.verify()?;
        }

        let units: Vec<_> = objects.iter().map(|object| DeleteObjectUnit { object }).collect();

        let mut conn = self.pool.acquire().await.map_err(MetabaseError::StoreUnavailable)?;
        for unit in &units {
            match unit.run(&mut *conn).await {
                Ok(Some(deleted)) => outcome.deleted.push(deleted),
                Ok(None) => debug!(object = %unit.object, "object already gone"),
                Err(failure) => {
                    warn!(error = %failure, "object delete rolled back");
                    outcome.failures.push(failure);
                }
            }
        }

        debug!(
            requested = objects.len(),
            deleted = outcome.deleted.len(),
            failed = outcome.failures.len(),
            "batch delete dispatched"
        );

        Ok(outcome)
    }
}

fn deleted_segment_from_row(object: &ObjectStream, row: &AnyRow) -> Result<DeletedSegmentInfo, sqlx::Error> {
    let position: i64 = row.try_get("position")?;
    let root_piece_id: Vec<u8> = row.try_get("root_piece_id")?;
    let pieces: String = row.try_get("pieces")?;

    let root_piece_id = PieceId::from_slice(&root_piece_id).ok_or_else(|| {
        sqlx::Error::Decode(format!("root_piece_id has {} bytes, expected 32", root_piece_id.len()).into())
    })?;
    let pieces: Pieces = serde_json::from_str(&pieces).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;

    Ok(DeletedSegmentInfo {
        stream_id: object.stream_id,
        position: SegmentPosition::decode(position as u64),
        root_piece_id,
        pieces,
    })
}
