// [apps/coordinator/src/generator.rs]
/*!
 * APARATO: RANGE PARTITIONER (ESTRATO L2-GENERATOR)
 * RESPONSABILIDAD: PARTICIONAMIENTO DE LOTES Y ROTACION DE ESTRATOS
 *
 * The Generator (C5): a bounded, multi-threaded producer that partitions
 * a huge integer range into power-of-two aligned batches and persists
 * them through the Catalog Store, Resume State, and External Mirror Sink.
 * Rolls the active shard over once it crosses the configured row or byte
 * ceiling, and on resume adopts whichever shard the checkpoint last wrote
 * to rather than assuming the highest-indexed file on disk is the right one.
 */

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use xiebo_core_range::{adjust_to_power_of_two, format_hex, parse_hex, total_keys};
use xiebo_domain_models::ResumeRecord;
use xiebo_infra_catalog::{BatchRow, CatalogStore, MirrorSink, ResumeStore};
use xiebo_shared_errors::CoordinatorError;
use xiebo_shared_presenter::Presenter;

use crate::stop::StopBroadcaster;

/// Ids are kept as `u64` (matching the domain model) rather than
/// arbitrary-precision: the generator's own id space is the count of
/// batches in one partitioning run, which stays far below `u64::MAX` for
/// any batch size a GPU-bound search would realistically use.
const PROGRESS_TICK_INTERVAL: Duration = Duration::from_millis(500);
const CHUNK_SIZE: u64 = 2_000;

pub struct GeneratorInputs {
    pub start_hex: String,
    pub range_bits: u32,
    pub address: String,
    pub target_batch_size: u64,
    pub max_batches_per_run: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The whole partition was generated; no resume record remains.
    Complete { batches_written: u64 },
    /// The run stopped short of `batches_needed` (per-run cap or a stop
    /// signal); a resume record was persisted.
    Partial { batches_written: u64 },
}

pub struct Generator {
    catalog: CatalogStore,
    resume: ResumeStore,
    mirror: MirrorSink,
    max_threads: usize,
}

impl Generator {
    pub fn new(catalog: CatalogStore, resume: ResumeStore, mirror: MirrorSink, max_threads: usize) -> Self {
        Self {
            catalog,
            resume,
            mirror,
            max_threads,
        }
    }

    /// Runs one generation pass (§4.5, steps 1-5). Does not itself
    /// auto-continue; see [`Generator::run_auto_continue`] for that.
    pub fn run_once(
        &self,
        inputs: &GeneratorInputs,
        stop: &StopBroadcaster,
        presenter: &Presenter,
    ) -> Result<GenerationOutcome, CoordinatorError> {
        let origin = parse_hex(&inputs.start_hex).map_err(|_| CoordinatorError::InvalidHex(inputs.start_hex.clone()))?;
        let total = total_keys(inputs.range_bits).map_err(|_| CoordinatorError::InvalidRangeBits(inputs.range_bits))?;
        let end_inclusive = &origin + &total - BigUint::from(1u8);
        let (adjusted_size, _batch_bits) = adjust_to_power_of_two(&BigUint::from(inputs.target_batch_size));
        let batches_needed = ceil_div(&total, &adjusted_size);

        let existing_resume = self.resume.load();
        let resuming_this_partition = existing_resume
            .as_ref()
            .map(|r| r.original_start == inputs.start_hex && r.address == inputs.address)
            .unwrap_or(false);

        let start_batch_id: u64 = if resuming_this_partition {
            existing_resume.as_ref().unwrap().batches_generated
        } else {
            0
        };

        let (mut shard_path, mut shard_index) = if start_batch_id == 0 {
            self.catalog.next_shard()
        } else if let Some(adopted) = existing_resume
            .as_ref()
            .filter(|_| resuming_this_partition)
            .map(|r| r.current_batch_index)
            .filter(|&idx| self.catalog.shard_path(idx).exists())
        {
            (self.catalog.shard_path(adopted), adopted)
        } else {
            self.catalog.current_shard()
        };

        let mut rows: BTreeMap<u64, BatchRow> = if start_batch_id != 0 {
            self.catalog.read_shard_at(shard_index)?
        } else {
            BTreeMap::new()
        };

        let remaining_in_partition = batches_needed.saturating_sub(start_batch_id);
        let this_run_count = remaining_in_partition.min(inputs.max_batches_per_run);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_threads.max(1))
            .build()
            .map_err(|err| CoordinatorError::Config(err.to_string()))?;

        let mut generated_this_run: u64 = 0;
        let mut last_tick = Instant::now();
        let eta_spinner = presenter.eta_spinner();
        eta_spinner.set_message(format!("partitioning {} batches", this_run_count));

        let mut offset = 0u64;
        while offset < this_run_count {
            if stop.is_set() {
                tracing::info!("generator observed stop signal, writing partial shard");
                break;
            }
            let chunk_len = CHUNK_SIZE.min(this_run_count - offset);

            let overflowing = self
                .catalog
                .should_rollover(&shard_path, chunk_len as usize)
                .map_err(|source| CoordinatorError::ShardIo {
                    path: shard_path.clone(),
                    source,
                })?;
            if overflowing {
                let (next_path, next_index) = self.catalog.next_shard();
                tracing::info!(from = shard_index, to = next_index, "shard full, rolling over");
                shard_path = next_path;
                shard_index = next_index;
                rows = BTreeMap::new();
            }

            let chunk_ids: Vec<u64> = (start_batch_id + offset..start_batch_id + offset + chunk_len).collect();

            let chunk_rows: Vec<BatchRow> = pool.install(|| {
                chunk_ids
                    .par_iter()
                    .map(|&id| {
                        let local_index = BigUint::from(id);
                        let batch_start = &origin + &local_index * &adjusted_size;
                        let candidate_end = &batch_start + &adjusted_size;
                        let partition_ceiling = &end_inclusive + BigUint::from(1u8);
                        let batch_end = candidate_end.min(partition_ceiling) - BigUint::from(1u8);
                        BatchRow {
                            batch_id: id,
                            start_hex: format_hex(&batch_start),
                            end_hex: format_hex(&batch_end),
                        }
                    })
                    .collect()
            });

            for row in chunk_rows {
                rows.insert(row.batch_id, row);
            }
            generated_this_run += chunk_len;
            offset += chunk_len;
            self.catalog.write(&shard_path, &rows)?;

            if last_tick.elapsed() >= PROGRESS_TICK_INTERVAL {
                eta_spinner.set_message(format!(
                    "{}/{} batches partitioned",
                    start_batch_id + offset,
                    batches_needed
                ));
                last_tick = Instant::now();
            }
        }
        eta_spinner.finish_and_clear();

        self.catalog.write(&shard_path, &rows)?;

        let progress = start_batch_id + generated_this_run;
        let outcome = if progress >= batches_needed {
            self.resume.clear()?;
            self.mirror.mirror_file(&shard_path);
            presenter.print_status(&format!("partition complete: {} batches written", progress));
            GenerationOutcome::Complete {
                batches_written: generated_this_run,
            }
        } else {
            let next_start = &origin + BigUint::from(progress) * &adjusted_size;
            let record = ResumeRecord {
                original_start: inputs.start_hex.clone(),
                original_range_bits: inputs.range_bits,
                address: inputs.address.clone(),
                next_start_hex: format_hex(&next_start),
                batches_generated: progress,
                total_batches: batches_needed,
                timestamp: chrono::Utc::now(),
                current_batch_file: shard_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                current_batch_index: shard_index,
            };
            self.resume.save(&record)?;
            self.mirror.mirror_file(&shard_path);
            self.mirror.mirror_file(self.resume.path());
            presenter.print_status(&format!("partial run: {}/{} batches written", progress, batches_needed));
            GenerationOutcome::Partial {
                batches_written: generated_this_run,
            }
        };

        Ok(outcome)
    }

    /// Auto-continue mode (§4.5): reloads the resume record and starts the
    /// next run, with no operator prompt, until it is absent or progress
    /// has reached the total. A short pause between runs allows signal
    /// delivery.
    pub fn run_auto_continue(
        &self,
        inputs: GeneratorInputs,
        stop: &StopBroadcaster,
        presenter: &Presenter,
    ) -> Result<u64, CoordinatorError> {
        let mut total_written = 0u64;
        loop {
            let outcome = self.run_once(&inputs, stop, presenter)?;
            match outcome {
                GenerationOutcome::Complete { batches_written } => {
                    total_written += batches_written;
                    break;
                }
                GenerationOutcome::Partial { batches_written } => {
                    total_written += batches_written;
                    if stop.is_set() || batches_written == 0 {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(500));
                }
            }
        }
        Ok(total_written)
    }
}

fn ceil_div(a: &BigUint, b: &BigUint) -> u64 {
    let one = BigUint::from(1u8);
    ((a + b - &one) / b).to_u64().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn harness() -> (Generator, StopBroadcaster, Presenter, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let catalog = CatalogStore::new(dir.path().join("catalog"));
        let resume = ResumeStore::new(dir.path().join("nextbatch.txt"));
        let mirror = MirrorSink::new(None);
        let generator = Generator::new(catalog, resume, mirror, 2);
        (generator, StopBroadcaster::new(), Presenter::unbounded(), dir)
    }

    #[test]
    fn tiny_power_of_two_partition_matches_scenario_one() {
        let (generator, stop, presenter, _dir) = harness();
        let inputs = GeneratorInputs {
            start_hex: "100".to_string(),
            range_bits: 4,
            address: "addr".to_string(),
            target_batch_size: 4,
            max_batches_per_run: 100,
        };
        let outcome = generator.run_once(&inputs, &stop, &presenter).unwrap();
        assert_eq!(outcome, GenerationOutcome::Complete { batches_written: 4 });

        let rows = generator.catalog.read_all().unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[&0].start_hex, "100");
        assert_eq!(rows[&0].end_hex, "103");
        assert_eq!(rows[&3].start_hex, "10c");
        assert_eq!(rows[&3].end_hex, "10f");
    }

    #[test]
    fn non_power_of_two_target_size_adjusts_up() {
        let (generator, stop, presenter, _dir) = harness();
        let inputs = GeneratorInputs {
            start_hex: "100".to_string(),
            range_bits: 4,
            address: "addr".to_string(),
            target_batch_size: 3,
            max_batches_per_run: 100,
        };
        generator.run_once(&inputs, &stop, &presenter).unwrap();
        let rows = generator.catalog.read_all().unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[&1].start_hex, "104");
    }

    #[test]
    fn truncated_final_batch_scenario_four() {
        let (generator, stop, presenter, _dir) = harness();
        let inputs = GeneratorInputs {
            start_hex: "0".to_string(),
            range_bits: 3,
            address: "addr".to_string(),
            target_batch_size: 6,
            max_batches_per_run: 100,
        };
        let outcome = generator.run_once(&inputs, &stop, &presenter).unwrap();
        assert_eq!(outcome, GenerationOutcome::Complete { batches_written: 1 });
        let rows = generator.catalog.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[&0].start_hex, "0");
        assert_eq!(rows[&0].end_hex, "7");
    }

    #[test]
    fn per_run_cap_leaves_resume_record() {
        let (generator, stop, presenter, _dir) = harness();
        let inputs = GeneratorInputs {
            start_hex: "0".to_string(),
            range_bits: 4,
            address: "addr".to_string(),
            target_batch_size: 1,
            max_batches_per_run: 10,
        };
        let outcome = generator.run_once(&inputs, &stop, &presenter).unwrap();
        assert_eq!(outcome, GenerationOutcome::Partial { batches_written: 10 });
        let resume = generator.resume.load().unwrap();
        assert_eq!(resume.batches_generated, 10);
        assert_eq!(resume.total_batches, 16);
    }

    #[test]
    fn resume_idempotence_matches_single_run() {
        let (generator, stop, presenter, _dir) = harness();
        let inputs = GeneratorInputs {
            start_hex: "0".to_string(),
            range_bits: 4,
            address: "addr".to_string(),
            target_batch_size: 1,
            max_batches_per_run: 10,
        };
        generator.run_once(&inputs, &stop, &presenter).unwrap();
        generator.run_once(&inputs, &stop, &presenter).unwrap();
        let rows = generator.catalog.read_all().unwrap();
        assert_eq!(rows.len(), 16);
        assert!(generator.resume.load().is_none());
    }

    #[test]
    fn rollover_on_row_threshold_advances_shard_index_scenario_five() {
        let (generator, stop, presenter, _dir) = harness();
        let inputs = GeneratorInputs {
            start_hex: "0".to_string(),
            range_bits: 16,
            address: "addr".to_string(),
            target_batch_size: 1,
            max_batches_per_run: 20_000,
        };
        let outcome = generator.run_once(&inputs, &stop, &presenter).unwrap();
        assert_eq!(outcome, GenerationOutcome::Partial { batches_written: 20_000 });

        assert_eq!(generator.catalog.shard_row_count(1).unwrap(), 10_000);
        assert_eq!(generator.catalog.shard_row_count(2).unwrap(), 10_000);

        let resume = generator.resume.load().unwrap();
        assert_eq!(resume.current_batch_index, 2);
    }

    #[test]
    fn resume_adopts_recorded_shard_over_a_stale_higher_indexed_file() {
        let (generator, stop, presenter, _dir) = harness();
        let inputs = GeneratorInputs {
            start_hex: "0".to_string(),
            range_bits: 4,
            address: "addr".to_string(),
            target_batch_size: 1,
            max_batches_per_run: 10,
        };
        generator.run_once(&inputs, &stop, &presenter).unwrap();

        // A higher-indexed shard left behind by an unrelated partition must
        // not be mistaken for this partition's current shard on resume.
        generator
            .catalog
            .write(&generator.catalog.shard_path(99), &BTreeMap::new())
            .unwrap();

        generator.run_once(&inputs, &stop, &presenter).unwrap();
        let rows = generator.catalog.read_all().unwrap();
        assert_eq!(rows.len(), 16);
    }
}
