// [libs/infra/store/src/lib.rs]
//! The Backing Store Adapter (C6): a single polymorphic surface over the
//! SQL `Tbatch` table and the read-only catalog-file snapshot. Modeled as
//! an enum rather than a trait object, since there are exactly two
//! variants and neither the generator nor the dispatcher ever needs to
//! treat the set as open-ended.

mod file_store;
mod sql;

pub use file_store::FileBackingStore;
pub use sql::{SqlBackingStore, SQL_SCHEMA};

use xiebo_domain_models::{Batch, BatchStatus, Found};
use xiebo_shared_errors::CoordinatorError;

/// Unified store handle. Dispatch paths hold a `BackingStore::Sql`; the
/// generator's read side can use `BackingStore::File` directly via
/// [`FileBackingStore`] without going through this enum at all, since
/// generation never needs `mark_status`.
pub enum BackingStore {
    File(FileBackingStore),
    Sql(SqlBackingStore),
}

impl BackingStore {
    pub async fn fetch_by_id(&self, id: u64) -> Result<Option<Batch>, CoordinatorError> {
        match self {
            BackingStore::File(store) => store.fetch_by_id(id),
            BackingStore::Sql(store) => store.fetch_by_id(id).await,
        }
    }

    pub async fn fetch_pending(&self, from_id: u64, n: u64) -> Result<Vec<Batch>, CoordinatorError> {
        match self {
            BackingStore::File(store) => store.fetch_pending(from_id, n),
            BackingStore::Sql(store) => store.fetch_pending(from_id, n).await,
        }
    }

    /// Returns `true` when this call actually transitioned the row (the SQL
    /// variant's conditional `UPDATE` may no-op if another worker already
    /// claimed it; see §9(c)).
    pub async fn mark_status(
        &self,
        id: u64,
        status: BatchStatus,
        found: Found,
        wif: &str,
    ) -> Result<bool, CoordinatorError> {
        match self {
            BackingStore::File(store) => {
                store.mark_status_noop(id, status);
                Ok(true)
            }
            BackingStore::Sql(store) => store.mark_status(id, status, found, wif).await,
        }
    }
}
