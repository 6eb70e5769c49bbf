//! Piece-deletion hook.
//!
//! The bucket-wide deleter hands every batch of freed segments to a
//! [`PieceDeleter`] after their metadata has been committed. Implementations
//! decide how the pieces reach the storage nodes (enqueue for garbage
//! collection, direct RPC, ...).

use crate::models::DeletedSegmentInfo;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait PieceDeleter: Send + Sync {
    /// Called once per batch with the segments that batch removed. Never
    /// called with an empty slice.
    async fn delete_pieces(&self, segments: &[DeletedSegmentInfo]) -> anyhow::Result<()>;
}

/// Records freed pieces in the log and leaves reclamation to the storage
/// nodes' own garbage collection.
#[derive(Clone, Debug, Default)]
pub struct LoggingPieceDeleter;

#[async_trait]
impl PieceDeleter for LoggingPieceDeleter {
    async fn delete_pieces(&self, segments: &[DeletedSegmentInfo]) -> anyhow::Result<()> {
        for segment in segments {
            for piece in segment.pieces.iter() {
                info!(
                    stream_id = %segment.stream_id,
                    position = %segment.position,
                    root_piece_id = %segment.root_piece_id,
                    piece_number = piece.number,
                    node_id = %piece.storage_node,
                    "piece freed"
                );
            }
        }
        Ok(())
    }
}
