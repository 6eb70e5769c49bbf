//! Metadata storage engine for a distributed object store.
//!
//! Tracks objects, their segments and the remote pieces of each segment,
//! and removes that metadata in bounded, per-object transactional batches:
//! expired objects through [`Metabase::delete_expired_objects`] and whole
//! buckets through [`Metabase::delete_bucket_objects`], which reports the
//! freed pieces to a [`PieceDeleter`].

pub mod config;
pub mod errors;
pub mod models;
pub mod services;

pub use errors::{
    BoxError, DeleteStage, MetabaseError, MetabaseResult, ObjectDeleteFailure, PartialBatchError,
};
pub use services::{
    batch_delete::{BatchOutcome, DeletedObject},
    delete_bucket::{DELETE_BATCH_SIZE_LIMIT, DeleteBucketObjects},
    delete_expired::{DeleteExpiredObjects, EXPIRED_BATCH_SIZE_LIMIT},
    metabase::{Implementation, Metabase, MetabaseOptions},
    pieces::{LoggingPieceDeleter, PieceDeleter},
    scanner::{ScanFilter, ScanObjects, ScannedObject},
};
