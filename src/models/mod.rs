//! Core data model of the metabase.
//!
//! Objects are addressed by (project, bucket, key, version) and own their
//! segments through the stream ID; segments embed the pieces that hold
//! their erasure-coded data on remote nodes. The types serialize with
//! `serde` and are mapped to table rows by the service layer.

pub mod bucket;
pub mod object;
pub mod segment;

pub use bucket::{Bucket, BucketLocation};
pub use object::{
    DEFAULT_VERSION, EncryptionParameters, ObjectKey, ObjectLocation, ObjectStatus, ObjectStream,
    RawObject, Version,
};
pub use segment::{
    DeletedSegmentInfo, NodeId, Piece, PieceId, Pieces, RawSegment, RedundancyScheme,
    SegmentPosition,
};
