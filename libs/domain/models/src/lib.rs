//! Shared domain types (DTOs) for the batch catalog and dispatch engines.
//! Single source of truth for the shapes that cross a crate boundary.

mod batch;
mod resume;

pub use batch::{Batch, BatchStatus, Found};
pub use resume::ResumeRecord;
