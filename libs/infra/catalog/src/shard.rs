// [libs/infra/catalog/src/shard.rs]
/*!
 * APARATO: SHARDED CATALOG LEDGER (ESTRATO L2-CATALOG)
 * RESPONSABILIDAD: ROTACION DE ARCHIVOS Y ESCRITURA ATOMICA DE LOTES
 *
 * Append-only sharded catalog files (`generated_batches_NNN.txt`), rotated
 * once a shard crosses the row or byte threshold so no single file grows
 * without bound.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use xiebo_shared_errors::CoordinatorError;

/// Zero-based row count after which a shard is considered full, triggering
/// a rollover to the next index.
const SHARD_ROW_THRESHOLD: usize = 10_000;
/// Byte size after which a shard is considered full regardless of row count.
const SHARD_SIZE_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

pub type ShardIndex = u32;

/// One data row of a catalog shard: `batch_id|start_hex|end_hex`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRow {
    pub batch_id: u64,
    pub start_hex: String,
    pub end_hex: String,
}

/// Owns a directory of `generated_batches_NNN.txt` shards. Writes are
/// serialized by an internal mutex; reads are lock-free snapshots.
pub struct CatalogStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl CatalogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The on-disk path for a given shard index, whether or not that file
    /// exists yet. Exposed so callers can check existence of a specific
    /// index (e.g. adopting a resume checkpoint's recorded shard) without
    /// going through [`CatalogStore::current_shard`]'s highest-index scan.
    pub fn shard_path(&self, index: ShardIndex) -> PathBuf {
        self.dir.join(format!("generated_batches_{index:03}.txt"))
    }

    /// Reads one specific shard by index, keyed by `batch_id`. Unlike
    /// [`CatalogStore::read_current`], this does not consult
    /// [`CatalogStore::current_shard`] at all — it reads exactly the index
    /// asked for, which is what resume adoption needs.
    pub fn read_shard_at(&self, index: ShardIndex) -> Result<BTreeMap<u64, BatchRow>, CoordinatorError> {
        let path = self.shard_path(index);
        let rows = Self::read_shard(&path).map_err(|source| CoordinatorError::ShardIo { path, source })?;
        Ok(rows.into_iter().map(|r| (r.batch_id, r)).collect())
    }

    /// The highest-indexed shard that exists on disk, or index `1` if none
    /// has been created yet.
    pub fn current_shard(&self) -> (PathBuf, ShardIndex) {
        let mut highest = 0;
        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                if let Some(idx) = parse_shard_index(&entry.file_name().to_string_lossy()) {
                    highest = highest.max(idx);
                }
            }
        }
        let index = highest.max(1);
        (self.shard_path(index), index)
    }

    /// The first index whose shard file does not yet exist.
    pub fn next_shard(&self) -> (PathBuf, ShardIndex) {
        let mut index: ShardIndex = 1;
        while self.shard_path(index).exists() {
            index += 1;
        }
        (self.shard_path(index), index)
    }

    /// True when the current shard's size or row count would overflow the
    /// configured thresholds after absorbing `incoming_count` more rows.
    pub fn should_rollover(&self, current: &Path, incoming_count: usize) -> io::Result<bool> {
        if !current.exists() {
            return Ok(false);
        }
        let metadata = fs::metadata(current)?;
        if metadata.len() > SHARD_SIZE_THRESHOLD_BYTES {
            return Ok(true);
        }
        let rows = Self::read_shard(current)?;
        Ok(rows.len() + incoming_count > SHARD_ROW_THRESHOLD)
    }

    /// Scans every shard in index order; the first occurrence of an id wins
    /// on duplicates.
    pub fn read_all(&self) -> Result<BTreeMap<u64, BatchRow>, CoordinatorError> {
        let mut merged = BTreeMap::new();
        let mut index: ShardIndex = 1;
        loop {
            let path = self.shard_path(index);
            if !path.exists() {
                break;
            }
            let rows = Self::read_shard(&path).map_err(|source| CoordinatorError::ShardIo {
                path: path.clone(),
                source,
            })?;
            for row in rows {
                merged.entry(row.batch_id).or_insert(row);
            }
            index += 1;
        }
        Ok(merged)
    }

    pub fn read_current(&self) -> Result<BTreeMap<u64, BatchRow>, CoordinatorError> {
        let (path, _) = self.current_shard();
        let rows = Self::read_shard(&path).map_err(|source| CoordinatorError::ShardIo { path, source })?;
        Ok(rows.into_iter().map(|r| (r.batch_id, r)).collect())
    }

    /// Row count of one specific shard, by index, without merging it into
    /// the rest of the catalog. Used by the `info` verb's per-shard report.
    pub fn shard_row_count(&self, index: ShardIndex) -> Result<usize, CoordinatorError> {
        let path = self.shard_path(index);
        let rows = Self::read_shard(&path).map_err(|source| CoordinatorError::ShardIo { path, source })?;
        Ok(rows.len())
    }

    fn read_shard(path: &Path) -> io::Result<Vec<BatchRow>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'|')
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let mut rows = Vec::new();
        for result in reader.deserialize::<BatchRow>() {
            match result {
                Ok(row) => rows.push(row),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping malformed catalog row");
                }
            }
        }
        Ok(rows)
    }

    /// Writes a shard atomically: sort by `batch_id`, serialize, write to a
    /// sibling temp file, then rename over the target. Callers pass an
    /// already-sorted map (a `BTreeMap` iterates in key order).
    pub fn write(&self, shard: &Path, rows: &BTreeMap<u64, BatchRow>) -> Result<(), CoordinatorError> {
        let _guard = self.write_lock.lock().expect("catalog write lock poisoned");
        fs::create_dir_all(&self.dir).map_err(|source| CoordinatorError::ShardIo {
            path: self.dir.clone(),
            source,
        })?;

        let tmp_path = shard.with_extension("tmp");
        {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(b'|')
                .has_headers(true)
                .from_path(&tmp_path)
                .map_err(|err| io_error_from_csv(err, &tmp_path))?;
            for row in rows.values() {
                writer
                    .serialize(row)
                    .map_err(|err| io_error_from_csv(err, &tmp_path))?;
            }
            writer.flush().map_err(|source| CoordinatorError::ShardIo {
                path: tmp_path.clone(),
                source,
            })?;
        }
        fs::rename(&tmp_path, shard).map_err(|source| CoordinatorError::ShardIo {
            path: shard.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

fn io_error_from_csv(err: csv::Error, path: &Path) -> CoordinatorError {
    CoordinatorError::ShardIo {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::Other, err),
    }
}

fn parse_shard_index(file_name: &str) -> Option<ShardIndex> {
    let digits = file_name
        .strip_prefix("generated_batches_")?
        .strip_suffix(".txt")?;
    digits.parse().ok()
}
