// [apps/coordinator/src/config.rs]
//! APARATO: CONFIGURACIÓN ESTRATIFICADA (ESTRATO L3-CONFIG)
//!
//! Layered configuration: CLI flags (highest precedence), then process
//! environment (itself optionally populated from a `.env` file), then
//! compiled-in defaults. `clap`'s `env` feature gives us the first two
//! layers for free; this module only adds the defaults and the numeric
//! tunables that aren't exposed as CLI flags directly.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_THREADS: usize = 24;
pub const DEFAULT_MAX_BATCHES_PER_RUN: u64 = 10_000;
pub const DEFAULT_STORE_BACKOFF_CAP_SECS: u64 = 30;
pub const DEFAULT_PRESENTER_CLEAR_INTERVAL_SECS: u64 = 180;
pub const DEFAULT_PRESENTER_CLEAR_LINES: u32 = 100;
pub const DEFAULT_SEQUENTIAL_DELAY_SECS: u64 = 3;

/// Global flags available on every verb. Verb-specific flags live on the
/// `Verb` enum in `cli.rs`; this struct only carries what every mode needs
/// to construct a `RunContext`.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOptions {
    /// Directory holding the `generated_batches_NNN.txt` shards and the
    /// resume checkpoint.
    #[arg(long, env = "XIEBO_CATALOG_DIR", default_value = "catalog", global = true)]
    pub catalog_dir: PathBuf,

    /// Optional external mirror destination; unset disables mirroring.
    #[arg(long, env = "XIEBO_MIRROR_DIR", global = true)]
    pub mirror_dir: Option<PathBuf>,

    /// `Tbatch` backing store URL (a local path or a `libsql://`/`https://`
    /// remote). Required only by dispatch verbs.
    #[arg(long, env = "XIEBO_DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Auth token for a remote database URL.
    #[arg(long, env = "XIEBO_DATABASE_AUTH_TOKEN", global = true)]
    pub database_auth_token: Option<String>,

    /// Path (or bare name, resolved via `PATH`) to the external search
    /// binary.
    #[arg(long, env = "XIEBO_BINARY", default_value = "xiebo", global = true)]
    pub xiebo_binary: String,

    /// Bounded generator thread pool size.
    #[arg(long, env = "XIEBO_MAX_THREADS", default_value_t = DEFAULT_MAX_THREADS, global = true)]
    pub max_threads: usize,

    /// Per-run cap on launched batches (dispatch verbs).
    #[arg(long, env = "XIEBO_MAX_BATCHES_PER_RUN", default_value_t = DEFAULT_MAX_BATCHES_PER_RUN, global = true)]
    pub max_batches_per_run: u64,

    /// Use the bounded presenter (periodic clearing), for hosted-notebook
    /// environments.
    #[arg(long, global = true)]
    pub bounded_output: bool,
}

impl GlobalOptions {
    pub fn store_backoff_cap(&self) -> Duration {
        Duration::from_secs(DEFAULT_STORE_BACKOFF_CAP_SECS)
    }

    pub fn presenter_clear_interval(&self) -> Duration {
        Duration::from_secs(DEFAULT_PRESENTER_CLEAR_INTERVAL_SECS)
    }

    pub fn presenter_clear_lines(&self) -> u32 {
        DEFAULT_PRESENTER_CLEAR_LINES
    }

    pub fn sequential_delay(&self) -> Duration {
        Duration::from_secs(DEFAULT_SEQUENTIAL_DELAY_SECS)
    }

    /// Loads a `.env` file from the working directory, if present, before
    /// any flag parsing happens. Absence of the file is not an error.
    pub fn load_dotenv() {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
            Err(dotenvy::Error::Io(_)) => {}
            Err(err) => tracing::warn!(error = %err, "failed to parse .env file, continuing with process environment"),
        }
    }
}
