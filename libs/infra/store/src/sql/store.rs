// [libs/infra/store/src/sql/store.rs]
/*!
 * APARATO: SQL BACKING STORE (ESTRATO L2-STORE)
 * RESPONSABILIDAD: PERSISTENCIA ACID DE LOTES VIA LIBSQL
 *
 * SQL variant of the Backing Store Adapter, backed by `libsql` (Turso /
 * local SQLite compatible). Each call opens a fresh short-lived
 * connection; there is no pooling, matching the teacher's own connection
 * discipline.
 */

use super::queries;
use super::schema::{INDEX_STATUS, SQL_SCHEMA};
use libsql::{params, Builder, Database};
use std::sync::Arc;
use xiebo_domain_models::{Batch, BatchStatus, Found};
use xiebo_shared_errors::CoordinatorError;

pub struct SqlBackingStore {
    database: Arc<Database>,
}

impl SqlBackingStore {
    pub async fn connect(url: &str, auth_token: Option<String>) -> Result<Self, CoordinatorError> {
        if url.is_empty() {
            return Err(CoordinatorError::Config("database url is empty".to_string()));
        }

        let is_remote = url.starts_with("libsql://") || url.starts_with("https://");
        let database = if is_remote {
            let token = auth_token.ok_or_else(|| {
                CoordinatorError::Config("remote database url requires an auth token".to_string())
            })?;
            Builder::new_remote(url.to_string(), token).build().await
        } else {
            Builder::new_local(url).build().await
        }
        .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;

        let store = Self {
            database: Arc::new(database),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    fn connection(&self) -> Result<libsql::Connection, CoordinatorError> {
        self.database
            .connect()
            .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))
    }

    pub async fn ensure_schema(&self) -> Result<(), CoordinatorError> {
        let conn = self.connection()?;
        conn.execute(SQL_SCHEMA, ())
            .await
            .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;
        conn.execute(INDEX_STATUS, ())
            .await
            .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;
        Ok(())
    }

    /// Resets every `in_progress` row to `pending`. Run once, before any
    /// worker is spawned.
    pub async fn recover_orphans(&self) -> Result<u64, CoordinatorError> {
        let conn = self.connection()?;
        let affected = conn
            .execute(queries::RECOVER_ORPHANED_BATCHES, ())
            .await
            .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;
        if affected > 0 {
            tracing::info!(count = affected, "recovered orphaned in_progress batches at startup");
        }
        Ok(affected)
    }

    pub async fn insert_pending(&self, batch: &Batch) -> Result<(), CoordinatorError> {
        let conn = self.connection()?;
        conn.execute(
            queries::INSERT_BATCH,
            params![batch.id as i64, batch.start_hex.clone(), batch.end_hex.clone()],
        )
        .await
        .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;
        Ok(())
    }

    pub async fn fetch_by_id(&self, id: u64) -> Result<Option<Batch>, CoordinatorError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(queries::FETCH_BY_ID, params![id as i64])
            .await
            .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;
        match rows
            .next()
            .await
            .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?
        {
            Some(row) => Ok(Some(map_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn fetch_pending(&self, from_id: u64, limit: u64) -> Result<Vec<Batch>, CoordinatorError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(queries::FETCH_PENDING, params![from_id as i64, limit as i64])
            .await
            .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;

        let mut batches = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?
        {
            batches.push(map_row(&row)?);
        }
        Ok(batches)
    }

    /// Commits a status transition. For a transition *into* `InProgress`
    /// this uses the conditional claim (§9c) and reports whether this
    /// caller actually won the row; every other transition is an
    /// unconditional terminal write.
    pub async fn mark_status(
        &self,
        id: u64,
        status: BatchStatus,
        found: Found,
        wif: &str,
    ) -> Result<bool, CoordinatorError> {
        let conn = self.connection()?;
        let affected = if status == BatchStatus::InProgress {
            conn.execute(queries::CLAIM_BATCH, params![id as i64])
                .await
                .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?
        } else {
            let truncated_wif: String = wif.chars().take(60).collect();
            conn.execute(
                queries::FINALIZE_BATCH,
                params![id as i64, status.as_store_str(), found.as_store_str(), truncated_wif],
            )
            .await
            .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?
        };
        Ok(affected > 0)
    }
}

fn map_row(row: &libsql::Row) -> Result<Batch, CoordinatorError> {
    let id: i64 = row
        .get(0)
        .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;
    let start_hex: String = row
        .get(1)
        .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;
    let end_hex: String = row
        .get(2)
        .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;
    let status_raw: String = row
        .get(3)
        .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;
    let found_raw: String = row
        .get(4)
        .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;
    let wif: String = row
        .get(5)
        .map_err(|err| CoordinatorError::StoreUnavailable(err.to_string()))?;

    Ok(Batch {
        id: id as u64,
        start_hex,
        end_hex,
        status: BatchStatus::parse_legacy(&status_raw),
        found: Found::parse_legacy(&found_raw),
        wif,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn in_memory_store() -> SqlBackingStore {
        // `:memory:` cannot be used here: `SqlBackingStore` opens a fresh
        // connection per call, and libsql's in-memory backend hands out an
        // unrelated empty database to every new connection. A temp file
        // gives each call the same on-disk database, matching what real
        // (file/remote) deployments see.
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        std::mem::forget(file);
        SqlBackingStore::connect(&path, None).await.unwrap()
    }

    fn sample_batch(id: u64) -> Batch {
        Batch::new_pending(id, format!("{:x}", id * 4), format!("{:x}", id * 4 + 3))
    }

    #[tokio::test]
    async fn insert_then_fetch_by_id() {
        let store = in_memory_store().await;
        store.insert_pending(&sample_batch(0)).await.unwrap();

        let fetched = store.fetch_by_id(0).await.unwrap().unwrap();
        assert_eq!(fetched.start_hex, "0");
        assert_eq!(fetched.status, BatchStatus::Pending);
    }

    #[tokio::test]
    async fn fetch_pending_excludes_done_and_in_progress() {
        let store = in_memory_store().await;
        for id in 0..3 {
            store.insert_pending(&sample_batch(id)).await.unwrap();
        }
        store.mark_status(0, BatchStatus::Done, Found::No, "").await.unwrap();
        store.mark_status(1, BatchStatus::InProgress, Found::Unknown, "").await.unwrap();

        let pending = store.fetch_pending(0, 10).await.unwrap();
        let ids: Vec<u64> = pending.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn claim_is_conditional_on_not_already_claimed() {
        let store = in_memory_store().await;
        store.insert_pending(&sample_batch(0)).await.unwrap();

        let first_claim = store.mark_status(0, BatchStatus::InProgress, Found::Unknown, "").await.unwrap();
        assert!(first_claim);

        let second_claim = store.mark_status(0, BatchStatus::InProgress, Found::Unknown, "").await.unwrap();
        assert!(!second_claim, "a second claim on an already in_progress row must not win");
    }

    #[tokio::test]
    async fn recover_orphans_resets_in_progress_rows() {
        let store = in_memory_store().await;
        store.insert_pending(&sample_batch(0)).await.unwrap();
        store.mark_status(0, BatchStatus::InProgress, Found::Unknown, "").await.unwrap();

        let recovered = store.recover_orphans().await.unwrap();
        assert_eq!(recovered, 1);

        let row = store.fetch_by_id(0).await.unwrap().unwrap();
        assert_eq!(row.status, BatchStatus::Pending);
    }

    #[tokio::test]
    async fn finalize_truncates_wif_to_sixty_chars() {
        let store = in_memory_store().await;
        store.insert_pending(&sample_batch(0)).await.unwrap();
        let long_wif = "K".repeat(120);

        store
            .mark_status(0, BatchStatus::Done, Found::Yes, &long_wif)
            .await
            .unwrap();

        let row = store.fetch_by_id(0).await.unwrap().unwrap();
        assert_eq!(row.wif.len(), 60);
        assert_eq!(row.found, Found::Yes);
    }
}
