//! Bucket-wide deleter: removes every object of one bucket and reports the
//! freed pieces to a [`PieceDeleter`].

use crate::{
    errors::{MetabaseError, MetabaseResult, PartialBatchError},
    models::{BucketLocation, ObjectStream},
    services::{
        delete_expired::clamp_batch_size,
        metabase::Metabase,
        pieces::PieceDeleter,
        scanner::{ScanFilter, ScanObjects},
    },
};
use std::{fmt, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on objects per bucket-delete batch.
pub const DELETE_BATCH_SIZE_LIMIT: usize = 1000;

/// Parameters of one bucket-wide delete.
#[derive(Clone)]
pub struct DeleteBucketObjects {
    pub bucket: BucketLocation,
    /// 0 or anything above [`DELETE_BATCH_SIZE_LIMIT`] means the limit.
    pub batch_size: usize,
    pub delete_pieces: Option<Arc<dyn PieceDeleter>>,
}

impl fmt::Debug for DeleteBucketObjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteBucketObjects")
            .field("bucket", &self.bucket)
            .field("batch_size", &self.batch_size)
            .field("delete_pieces", &self.delete_pieces.is_some())
            .finish()
    }
}

impl Metabase {
    /// Delete every object in `opts.bucket` and return how many were deleted.
    ///
    /// The piece-deletion hook runs once per batch, after the batch has
    /// committed, with exactly the segments that batch removed. A hook
    /// failure stops the run.
    ///
    /// The count only includes objects that had at least one segment.
    /// Objects without segments are still removed but are not counted.
    pub async fn delete_bucket_objects(
        &self,
        opts: DeleteBucketObjects,
        cancel: &CancellationToken,
    ) -> MetabaseResult<u64> {
        opts.bucket.verify()?;

        let batch_size = clamp_batch_size(opts.batch_size, DELETE_BATCH_SIZE_LIMIT);
        let mut start_after = ObjectStream {
            project_id: opts.bucket.project_id,
            bucket_name: opts.bucket.bucket_name.clone(),
            ..ObjectStream::default()
        };
        let mut deleted_total: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                info!(bucket = %opts.bucket, deleted = deleted_total, "bucket delete cancelled");
                return Err(MetabaseError::Cancelled);
            }

            let batch = self
                .scan_objects(&ScanObjects {
                    start_after: start_after.clone(),
                    filter: ScanFilter::Bucket(opts.bucket.clone()),
                    as_of_system_time: None,
                    limit: batch_size,
                })
                .await?;

            let Some(last) = batch.last() else {
                break;
            };
            let last = last.stream.clone();

            let streams: Vec<ObjectStream> = batch.iter().map(|object| object.stream.clone()).collect();
            let outcome = self.delete_objects_batch(&streams).await?;

            let deleted_segments = outcome.deleted_segments();
            let batch_count = outcome
                .deleted
                .iter()
                .filter(|object| !object.segments.is_empty())
                .count() as u64;
            deleted_total += batch_count;

            debug!(
                bucket = %opts.bucket,
                scanned = streams.len(),
                deleted = batch_count,
                segments = deleted_segments.len(),
                "bucket batch processed"
            );

            if let Some(deleter) = opts.delete_pieces.as_ref().filter(|_| !deleted_segments.is_empty()) {
                if let Err(err) = deleter.delete_pieces(&deleted_segments).await {
                    warn!(bucket = %opts.bucket, deleted = deleted_total, error = %err, "piece deletion failed");
                    return Err(MetabaseError::PieceDeletion {
                        deleted: deleted_total,
                        source: err.into(),
                    });
                }
            }

            if !outcome.failures.is_empty() {
                return Err(PartialBatchError {
                    succeeded: outcome.deleted.len(),
                    failures: outcome.failures,
                }
                .into());
            }

            if batch.len() < batch_size {
                break;
            }
            start_after = last;
        }

        info!(bucket = %opts.bucket, deleted = deleted_total, "bucket objects deleted");
        Ok(deleted_total)
    }
}
