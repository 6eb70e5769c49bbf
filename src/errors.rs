use crate::models::ObjectStream;
use std::fmt;
use thiserror::Error;

/// Error type for hook implementations that live outside this crate.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum MetabaseError {
    /// The request was rejected before any query ran.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport or driver failure talking to the backing store. The whole
    /// operation may be retried.
    #[error("metabase store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error(transparent)]
    PartialBatch(#[from] PartialBatchError),

    /// The piece-deletion hook failed. Deletes committed before the failure
    /// stand; their pieces are left for a later sweep.
    #[error("piece deletion failed after {deleted} deleted objects: {source}")]
    PieceDeletion {
        deleted: u64,
        #[source]
        source: BoxError,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("corrupt {column} value in {table}: {reason}")]
    Corrupt {
        table: &'static str,
        column: &'static str,
        reason: String,
    },

    #[error("migration failed: {0}")]
    Migration(String),
}

pub type MetabaseResult<T> = Result<T, MetabaseError>;

/// Step of a per-object delete transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteStage {
    Begin,
    DeleteObject,
    DeleteSegments,
    Commit,
}

impl fmt::Display for DeleteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Begin => "begin",
            Self::DeleteObject => "delete object",
            Self::DeleteSegments => "delete segments",
            Self::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// One object of a batch whose delete transaction rolled back.
#[derive(Debug, Error)]
#[error("{stage} failed for {object}: {source}")]
pub struct ObjectDeleteFailure {
    pub object: ObjectStream,
    pub stage: DeleteStage,
    #[source]
    pub source: sqlx::Error,
}

/// Some objects of a batch failed while their siblings were deleted.
#[derive(Debug, Error)]
#[error(
    "{} of {} objects in batch failed to delete{}",
    .failures.len(),
    batch_total(.succeeded, .failures),
    first_failure(.failures)
)]
pub struct PartialBatchError {
    /// Objects deleted by the same batch.
    pub succeeded: usize,
    pub failures: Vec<ObjectDeleteFailure>,
}

fn batch_total(succeeded: &usize, failures: &[ObjectDeleteFailure]) -> usize {
    succeeded + failures.len()
}

fn first_failure(failures: &[ObjectDeleteFailure]) -> String {
    failures
        .first()
        .map(|failure| format!("; first: {failure}"))
        .unwrap_or_default()
}

impl PartialBatchError {
    /// Identities that still need to be re-driven.
    pub fn failed_objects(&self) -> impl Iterator<Item = &ObjectStream> {
        self.failures.iter().map(|failure| &failure.object)
    }
}
