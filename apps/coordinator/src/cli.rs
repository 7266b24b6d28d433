// [apps/coordinator/src/cli.rs]
//! The verb surface (C12). Each variant carries only the arguments that
//! verb needs beyond [`crate::config::GlobalOptions`]; no business logic
//! lives here, only the shape clap needs to parse it.

use clap::{Parser, Subcommand};

use crate::config::GlobalOptions;

#[derive(Parser, Debug)]
#[command(author, version, about = "Partitions key-range batches and dispatches a xiebo worker fleet against them.")]
pub struct Cli {
    #[command(flatten)]
    pub globals: GlobalOptions,

    #[command(subcommand)]
    pub verb: Verb,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Verb {
    /// Partitions a fresh range into the catalog.
    Generate {
        start_hex: String,
        range_bits: u32,
        #[arg(default_value = "")]
        address: String,
    },
    /// Auto-continues a partial partition until it is complete, with no
    /// operator confirmation between runs.
    Continue,
    /// Continues a partial partition for a single bounded run, using the
    /// bounded generator thread pool.
    ContinueSingle,
    /// Same as `continue-single` but forces a single-threaded generator
    /// pool, matching the original tool's single-thread fallback mode.
    ContinueSingleSt,
    /// Prints aggregate batch counts across every catalog shard.
    Summary,
    /// Exports the merged catalog to a comma-delimited CSV file.
    Export {
        #[arg(default_value = "batches.csv")]
        output_file: std::path::PathBuf,
    },
    /// Prints per-shard size and row-count statistics.
    Info,
    /// Validates and echoes a new batch-size override for this invocation.
    /// Like the tool this one was modeled on, the override does not persist
    /// past process exit; there is no flag to carry it into a later
    /// `generate`/`continue` invocation.
    SetSize { size: u64 },
    /// Validates and echoes a new thread-count override for this
    /// invocation; see `SetSize` for the persistence caveat.
    SetThreads { threads: usize },
    /// Dispatches pending batches across the given GPUs concurrently.
    BatchDbParallel {
        #[arg(value_delimiter = ',')]
        gpu_ids: Vec<u32>,
        start_id: u64,
        address: String,
    },
    /// Dispatches pending batches across the given GPUs one at a time.
    BatchDbSequential {
        #[arg(value_delimiter = ',')]
        gpu_ids: Vec<u32>,
        start_id: u64,
        address: String,
    },
    /// Runs exactly one batch on one GPU without touching the dispatcher's
    /// pending-batch supply; the direct single-run form.
    Run {
        gpu_id: u32,
        start_hex: String,
        range_bits: u32,
        address: String,
    },
}
