//! Metabase operations, grouped by concern. Every operation is a method on
//! [`metabase::Metabase`].

pub mod batch_delete;
pub mod buckets;
pub mod delete_bucket;
pub mod delete_expired;
pub mod metabase;
pub mod pieces;
pub mod scanner;
pub mod testing;
