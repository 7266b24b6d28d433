// [apps/coordinator/src/main.rs]
/*!
 * =================================================================
 * APARATO: COORDINATOR ENTRY POINT (ESTRATO L3-SHELL)
 * CLASIFICACIÓN: APPLICATION SHELL
 * RESPONSABILIDAD: BOOTSTRAP DE ENTORNO E IGNICIÓN DE VERBOS
 *
 * Entry point: parses a verb, wires telemetry/config/signal handling, and
 * composes the library crates into one of the scenarios the verb names.
 * No business logic lives here; see `generator.rs`, `dispatcher.rs`, and
 * `worker.rs` for that.
 * =================================================================
 */

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use xiebo_domain_models::{Batch, BatchStatus};
use xiebo_infra_catalog::{CatalogStore, MirrorSink, ResumeStore};
use xiebo_infra_store::{BackingStore, FileBackingStore, SqlBackingStore};
use xiebo_shared_presenter::Presenter;

use xiebo_coordinator::cli::{Cli, Verb};
use xiebo_coordinator::config::GlobalOptions;
use xiebo_coordinator::dispatcher::{Dispatcher, ExecutionMode};
use xiebo_coordinator::generator::{Generator, GeneratorInputs};
use xiebo_coordinator::stop::StopBroadcaster;
use xiebo_coordinator::worker::{found_for, WorkerRunner};

#[tokio::main]
async fn main() -> Result<()> {
    GlobalOptions::load_dotenv();
    xiebo_shared_telemetry::init("xiebo-coordinator");

    let cli = Cli::parse();
    let stop = StopBroadcaster::new();
    stop.install_signal_handler().context("failed to install SIGINT/SIGTERM handler")?;

    let presenter = Arc::new(if cli.globals.bounded_output {
        Presenter::bounded(cli.globals.presenter_clear_interval(), cli.globals.presenter_clear_lines())
    } else {
        Presenter::unbounded()
    });

    match cli.verb {
        Verb::Generate { start_hex, range_bits, address } => {
            run_generate(&cli.globals, start_hex, range_bits, address, &stop, &presenter, false)
        }
        Verb::Continue => {
            let resume = resume_store(&cli.globals);
            let record = resume.load().context("no resume checkpoint found; run `generate` first")?;
            run_generate(&cli.globals, record.original_start, record.original_range_bits, record.address, &stop, &presenter, true)
        }
        Verb::ContinueSingle => {
            let resume = resume_store(&cli.globals);
            let record = resume.load().context("no resume checkpoint found; run `generate` first")?;
            run_generate(&cli.globals, record.original_start, record.original_range_bits, record.address, &stop, &presenter, false)
        }
        Verb::ContinueSingleSt => {
            let resume = resume_store(&cli.globals);
            let record = resume.load().context("no resume checkpoint found; run `generate` first")?;
            let mut globals = cli.globals.clone();
            globals.max_threads = 1;
            run_generate(&globals, record.original_start, record.original_range_bits, record.address, &stop, &presenter, false)
        }
        Verb::Summary => print_summary(&cli.globals),
        Verb::Export { output_file } => export_csv(&cli.globals, &output_file),
        Verb::Info => print_info(&cli.globals),
        Verb::SetSize { size } => set_size(size),
        Verb::SetThreads { threads } => set_threads(threads),
        Verb::BatchDbParallel { gpu_ids, start_id, address } => {
            run_dispatch(&cli.globals, ExecutionMode::Parallel, gpu_ids, start_id, address, &stop, &presenter).await
        }
        Verb::BatchDbSequential { gpu_ids, start_id, address } => {
            run_dispatch(&cli.globals, ExecutionMode::Sequential, gpu_ids, start_id, address, &stop, &presenter).await
        }
        Verb::Run { gpu_id, start_hex, range_bits, address } => {
            run_single(&cli.globals, gpu_id, start_hex, range_bits, address, &stop, &presenter).await
        }
    }
}

fn resume_store(globals: &GlobalOptions) -> ResumeStore {
    ResumeStore::new(globals.catalog_dir.join("nextbatch.txt"))
}

fn catalog_store(globals: &GlobalOptions) -> CatalogStore {
    CatalogStore::new(globals.catalog_dir.clone())
}

fn mirror_sink(globals: &GlobalOptions) -> MirrorSink {
    MirrorSink::new(globals.mirror_dir.clone())
}

fn run_generate(
    globals: &GlobalOptions,
    start_hex: String,
    range_bits: u32,
    address: String,
    stop: &StopBroadcaster,
    presenter: &Presenter,
    auto_continue: bool,
) -> Result<()> {
    let generator = Generator::new(catalog_store(globals), resume_store(globals), mirror_sink(globals), globals.max_threads);
    let inputs = GeneratorInputs {
        start_hex,
        range_bits,
        address,
        target_batch_size: default_target_batch_size(),
        max_batches_per_run: globals.max_batches_per_run,
    };

    if auto_continue {
        let written = generator.run_auto_continue(inputs, stop, presenter)?;
        tracing::info!(written, "auto-continue generation finished");
    } else {
        generator.run_once(&inputs, stop, presenter)?;
    }
    Ok(())
}

/// The original tool's default batch size (`BATCH_SIZE` in the Python
/// source); not exposed as a CLI flag since the `generate` verb's
/// `RANGE_BITS` argument already determines the total key count and the
/// per-batch size only changes how finely it's sliced.
fn default_target_batch_size() -> u64 {
    1 << 20
}

fn print_summary(globals: &GlobalOptions) -> Result<()> {
    let catalog = catalog_store(globals);
    let rows = catalog.read_all()?;
    let resume = resume_store(globals).load();

    println!("total_batches={}", rows.len());
    if let Some(record) = &resume {
        println!("batches_generated={}", record.batches_generated);
        println!("total_batches_target={}", record.total_batches);
        println!("complete={}", record.is_complete());
    } else {
        println!("batches_generated={}", rows.len());
        println!("complete=true");
    }
    tracing::info!(total = rows.len(), "batch summary printed");
    Ok(())
}

fn print_info(globals: &GlobalOptions) -> Result<()> {
    let dir = &globals.catalog_dir;
    let catalog = catalog_store(globals);
    let mut index = 1u32;
    let mut total_size = 0u64;
    let mut total_rows = 0usize;
    loop {
        let path = dir.join(format!("generated_batches_{index:03}.txt"));
        if !path.exists() {
            break;
        }
        let metadata = std::fs::metadata(&path)?;
        let rows = catalog.shard_row_count(index)?;
        total_size += metadata.len();
        total_rows += rows;
        println!("{}: {} bytes, {} rows", path.display(), metadata.len(), rows);
        index += 1;
    }
    println!("total: {} bytes across {} shard(s), {} rows", total_size, index - 1, total_rows);
    Ok(())
}

fn export_csv(globals: &GlobalOptions, output_file: &PathBuf) -> Result<()> {
    let catalog = catalog_store(globals);
    let rows = catalog.read_all()?;
    if rows.is_empty() {
        println!("no batch data found to export");
        return Ok(());
    }

    let mut writer = csv::WriterBuilder::new().has_headers(true).from_path(output_file)?;
    for row in rows.values() {
        writer.serialize(row)?;
    }
    writer.flush()?;
    println!("exported {} batches to {}", rows.len(), output_file.display());
    Ok(())
}

fn set_size(size: u64) -> Result<()> {
    if size == 0 {
        anyhow::bail!("batch size must be positive");
    }
    println!("batch size set to {size} keys for this invocation");
    let _ = std::io::stdout().flush();
    Ok(())
}

fn set_threads(threads: usize) -> Result<()> {
    if threads == 0 || threads > 64 {
        anyhow::bail!("thread count must be between 1 and 64");
    }
    println!("thread count set to {threads} for this invocation");
    let _ = std::io::stdout().flush();
    Ok(())
}

async fn backing_store(globals: &GlobalOptions) -> Result<Arc<BackingStore>> {
    match &globals.database_url {
        Some(url) => {
            let sql = SqlBackingStore::connect(url, globals.database_auth_token.clone())
                .await
                .context("failed to connect to the Tbatch backing store")?;
            let recovered = sql.recover_orphans().await?;
            if recovered > 0 {
                tracing::warn!(recovered, "reset orphaned in_progress batches at dispatcher startup");
            }
            Ok(Arc::new(BackingStore::Sql(sql)))
        }
        None => Ok(Arc::new(BackingStore::File(FileBackingStore::new(catalog_store(globals))))),
    }
}

async fn run_dispatch(
    globals: &GlobalOptions,
    mode: ExecutionMode,
    gpu_ids: Vec<u32>,
    start_id: u64,
    address: String,
    stop: &StopBroadcaster,
    presenter: &Arc<Presenter>,
) -> Result<()> {
    if gpu_ids.is_empty() {
        anyhow::bail!("at least one GPU id is required");
    }
    let store = backing_store(globals).await?;
    let runner = WorkerRunner::new(globals.xiebo_binary.clone());
    let dispatcher = Dispatcher::new(
        store,
        runner,
        gpu_ids,
        address,
        globals.max_batches_per_run,
        globals.sequential_delay(),
        globals.store_backoff_cap(),
    )
    .starting_from(start_id);

    let summary = dispatcher.run(mode, stop, presenter).await?;
    presenter.print_status(&format!(
        "dispatch finished: launched={} found_yes={} failed={} interrupted={}",
        summary.launched, summary.found_yes, summary.failed, summary.interrupted
    ));
    Ok(())
}

async fn run_single(
    globals: &GlobalOptions,
    gpu_id: u32,
    start_hex: String,
    range_bits: u32,
    address: String,
    stop: &StopBroadcaster,
    presenter: &Presenter,
) -> Result<()> {
    let total = xiebo_core_range::total_keys(range_bits).context("invalid range bits")?;
    let end = &xiebo_core_range::parse_hex(&start_hex).context("invalid start hex")? + &total
        - num_bigint::BigUint::from(1u8);
    let batch = Batch::new_pending(0, start_hex, xiebo_core_range::format_hex(&end));

    let runner = WorkerRunner::new(globals.xiebo_binary.clone());
    let notify_hit = stop.notify_hit_capability();
    let outcome = runner.run_batch(gpu_id, &batch, &address, stop, presenter, notify_hit).await?;

    let found = found_for(&outcome.parsed, outcome.resulting_status);
    presenter.print_status(&format!(
        "single run finished: status={} found={:?} exit_code={:?}",
        status_label(outcome.resulting_status),
        found,
        outcome.exit_code
    ));
    Ok(())
}

fn status_label(status: BatchStatus) -> &'static str {
    status.as_store_str()
}
