// [libs/shared/errors/src/lib.rs]
/*!
 * APARATO: TAXONOMÍA DE ERRORES SOBERANA (ESTRATO L0-ERRORS)
 * RESPONSABILIDAD: CLASIFICACIÓN DE FALLOS PARA TODA LA FLOTA
 *
 * Crate-wide error taxonomy. Library crates return `Result<T,
 * CoordinatorError>` (or a narrower error that converts into it via
 * `#[from]`); the application boundary wraps these in `anyhow::Result`
 * for top-level context.
 */

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("[E_HEX] invalid hex string: {0:?}")]
    InvalidHex(String),

    #[error("[E_RANGE] invalid range bits: {0} (must be 1..=256)")]
    InvalidRangeBits(u32),

    #[error("[E_SHARD_IO] failed to read/write catalog shard {path}: {source}")]
    ShardIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[E_RESUME_IO] failed to persist resume checkpoint {path}: {source}")]
    ResumeIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[E_MIRROR] external mirror sink failed for {path}: {source}")]
    Mirror {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[E_STORE_UNAVAILABLE] backing store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("[E_WORKER_EXIT] worker process exited with non-zero status {code} for batch {batch_id}")]
    WorkerExitNonZero { batch_id: u64, code: i32 },

    #[error("[E_WORKER_INTERRUPTED] worker for batch {batch_id} was interrupted")]
    WorkerInterrupted { batch_id: u64 },

    #[error("[E_PARSE] failed to parse worker output line: {0:?}")]
    Parse(String),

    #[error("[E_CONFIG] invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
