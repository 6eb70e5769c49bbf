//! Expiration reclaimer: removes every object whose expiration has passed.

use crate::{
    errors::{MetabaseError, MetabaseResult, PartialBatchError},
    models::ObjectStream,
    services::{
        metabase::Metabase,
        scanner::{ScanFilter, ScanObjects},
    },
};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Upper bound on objects per expiration batch.
pub const EXPIRED_BATCH_SIZE_LIMIT: usize = 1000;

/// Parameters of one reclaimer run.
#[derive(Clone, Debug)]
pub struct DeleteExpiredObjects {
    /// Objects with `expires_at` strictly before this are deleted.
    pub expired_before: DateTime<Utc>,
    /// Scan at this historical timestamp where the store supports it.
    pub as_of_system_time: Option<DateTime<Utc>>,
    /// 0 or anything above [`EXPIRED_BATCH_SIZE_LIMIT`] means the limit.
    pub batch_size: usize,
}

impl DeleteExpiredObjects {
    fn effective_batch_size(&self) -> usize {
        clamp_batch_size(self.batch_size, EXPIRED_BATCH_SIZE_LIMIT)
    }
}

pub(crate) fn clamp_batch_size(requested: usize, limit: usize) -> usize {
    if requested == 0 || requested > limit {
        limit
    } else {
        requested
    }
}

impl Metabase {
    /// Delete all objects that expired before `opts.expired_before`.
    ///
    /// Runs scan/delete batches in ascending key order until a scan comes
    /// back short. Each batch commits independently, so a run that stops
    /// early (error or cancellation) leaves nothing half-deleted and the
    /// next run picks up the remainder. Pieces of expired objects are not
    /// reported; they are reclaimed by the storage nodes' own GC.
    pub async fn delete_expired_objects(
        &self,
        opts: DeleteExpiredObjects,
        cancel: &CancellationToken,
    ) -> MetabaseResult<()> {
        let batch_size = opts.effective_batch_size();
        let mut start_after = ObjectStream::default();

        loop {
            if cancel.is_cancelled() {
                return Err(MetabaseError::Cancelled);
            }

            let expired = self
                .scan_objects(&ScanObjects {
                    start_after: start_after.clone(),
                    filter: ScanFilter::ExpiredBefore(opts.expired_before),
                    as_of_system_time: opts.as_of_system_time,
                    limit: batch_size,
                })
                .await?;

            let Some(last) = expired.last() else {
                return Ok(());
            };
            let last = last.stream.clone();

            for object in &expired {
                info!(
                    project = %object.stream.project_id,
                    bucket = %object.stream.bucket_name,
                    object_key = %object.stream.object_key,
                    version = object.stream.version,
                    stream_id = %object.stream.stream_id,
                    expired_at = ?object.expires_at,
                    "Deleting expired object"
                );
            }

            let streams: Vec<ObjectStream> = expired.iter().map(|object| object.stream.clone()).collect();
            let outcome = self.delete_objects_batch(&streams).await?;
            debug!(
                scanned = streams.len(),
                deleted = outcome.deleted.len(),
                "expired batch processed"
            );

            if !outcome.failures.is_empty() {
                return Err(PartialBatchError {
                    succeeded: outcome.deleted.len(),
                    failures: outcome.failures,
                }
                .into());
            }

            if expired.len() < batch_size {
                return Ok(());
            }
            start_after = last;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_clamped_not_rejected() {
        assert_eq!(clamp_batch_size(0, EXPIRED_BATCH_SIZE_LIMIT), 1000);
        assert_eq!(clamp_batch_size(1, EXPIRED_BATCH_SIZE_LIMIT), 1);
        assert_eq!(clamp_batch_size(1000, EXPIRED_BATCH_SIZE_LIMIT), 1000);
        assert_eq!(clamp_batch_size(5000, EXPIRED_BATCH_SIZE_LIMIT), 1000);
    }
}
