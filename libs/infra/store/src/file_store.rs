//! The file variant of the Backing Store Adapter: read-only progression
//! over catalog shards. The catalog file format carries no status column,
//! so every id that exists is treated as pending and `mark_status` has
//! nowhere to persist to.

use xiebo_domain_models::{Batch, BatchStatus, Found};
use xiebo_infra_catalog::CatalogStore;
use xiebo_shared_errors::CoordinatorError;

pub struct FileBackingStore {
    catalog: CatalogStore,
}

impl FileBackingStore {
    pub fn new(catalog: CatalogStore) -> Self {
        Self { catalog }
    }

    pub fn fetch_by_id(&self, id: u64) -> Result<Option<Batch>, CoordinatorError> {
        let rows = self.catalog.read_all()?;
        Ok(rows.get(&id).map(|row| Batch {
            id: row.batch_id,
            start_hex: row.start_hex.clone(),
            end_hex: row.end_hex.clone(),
            status: BatchStatus::Pending,
            found: Found::Unknown,
            wif: String::new(),
        }))
    }

    /// Every id in `[from_id, from_id + n)` that exists in the merged
    /// snapshot is returned, in ascending id order; there is no status to
    /// filter on.
    pub fn fetch_pending(&self, from_id: u64, n: u64) -> Result<Vec<Batch>, CoordinatorError> {
        let rows = self.catalog.read_all()?;
        let upper = from_id.saturating_add(n);
        Ok(rows
            .range(from_id..upper)
            .map(|(_, row)| Batch {
                id: row.batch_id,
                start_hex: row.start_hex.clone(),
                end_hex: row.end_hex.clone(),
                status: BatchStatus::Pending,
                found: Found::Unknown,
                wif: String::new(),
            })
            .collect())
    }

    pub fn mark_status_noop(&self, id: u64, status: BatchStatus) {
        tracing::debug!(id, %status, "file backing store has no status column, ignoring");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;
    use xiebo_infra_catalog::BatchRow;

    #[test]
    fn fetch_pending_returns_existing_ids_in_range() {
        let dir = tempdir().unwrap();
        let catalog = CatalogStore::new(dir.path());
        let (path, _) = catalog.current_shard();
        let rows: BTreeMap<u64, BatchRow> = (0..10)
            .map(|i| {
                (
                    i,
                    BatchRow {
                        batch_id: i,
                        start_hex: format!("{:x}", i * 4),
                        end_hex: format!("{:x}", i * 4 + 3),
                    },
                )
            })
            .collect();
        catalog.write(&path, &rows).unwrap();

        let store = FileBackingStore::new(catalog);
        let pending = store.fetch_pending(2, 3).unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].id, 2);
        assert_eq!(pending[2].id, 4);
        assert!(pending.iter().all(|b| b.status == BatchStatus::Pending));
    }

    #[test]
    fn fetch_by_id_missing_returns_none() {
        let dir = tempdir().unwrap();
        let catalog = CatalogStore::new(dir.path());
        let store = FileBackingStore::new(catalog);
        assert!(store.fetch_by_id(999).unwrap().is_none());
    }
}
