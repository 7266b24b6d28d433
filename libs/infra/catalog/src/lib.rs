//! The file-backed half of the coordinator's persistence: sharded catalog
//! files, the single-file resume checkpoint, and a best-effort external
//! mirror. None of this ever talks to SQL; see `xiebo-infra-store` for the
//! backing-store trait that unifies this with the SQL variant.

mod mirror;
mod resume_store;
mod shard;

pub use mirror::MirrorSink;
pub use resume_store::ResumeStore;
pub use shard::{BatchRow, CatalogStore, ShardIndex};
