// [apps/coordinator/src/worker.rs]
/*!
 * =================================================================
 * APARATO: WORKER PROCESS RUNNER (ESTRATO L1-WORKER)
 * CLASIFICACIÓN: PROCESS EXECUTION LAYER
 * RESPONSABILIDAD: CICLO DE VIDA DEL PROCESO HIJO Y CLASIFICACIÓN DE SALIDA
 *
 * The Worker Runner (C8): spawns one `xiebo` child process for one batch
 * on one GPU, streams its output through the parser, and folds the
 * result into a backing-store status transition.
 *
 * # Mathematical Proof (Channel-Fed Line Pump):
 * Two independent readers (stdout, stderr) feed one `mpsc` channel so the
 * main loop can `select!` on a single `recv()` alongside `child.wait()`.
 * Racing two independently-EOF-able streams directly would busy-spin once
 * one side finishes before the child itself exits.
 * =================================================================
 */

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use xiebo_core_range::{bits_for, parse_hex};
use xiebo_domain_models::{Batch, BatchStatus, Found};
use xiebo_infra_parser::{OutputParser, ParsedOutcome};
use xiebo_shared_errors::CoordinatorError;
use xiebo_shared_presenter::Presenter;

use crate::stop::StopBroadcaster;

#[derive(Debug)]
pub struct RunnerOutcome {
    pub batch_id: u64,
    pub exit_code: Option<i32>,
    pub parsed: ParsedOutcome,
    pub resulting_status: BatchStatus,
}

pub struct WorkerRunner {
    xiebo_binary: String,
}

impl WorkerRunner {
    pub fn new(xiebo_binary: impl Into<String>) -> Self {
        Self {
            xiebo_binary: xiebo_binary.into(),
        }
    }

    /// Runs one batch on `gpu_id`. `notify_hit` is the stop broadcaster's
    /// injected capability (§4.7); this crate never imports
    /// `StopBroadcaster` for that purpose, only to poll `is_set()` for
    /// cancellation.
    pub async fn run_batch(
        &self,
        gpu_id: u32,
        batch: &Batch,
        address: &str,
        stop: &StopBroadcaster,
        presenter: &Presenter,
        notify_hit: impl Fn() + Send + Sync + 'static,
    ) -> Result<RunnerOutcome, CoordinatorError> {
        let range_bits = batch_range_bits(batch)?;

        let mut command = Command::new(&self.xiebo_binary);
        command
            .arg("-gpuId")
            .arg(gpu_id.to_string())
            .arg("-start")
            .arg(&batch.start_hex)
            .arg("-range")
            .arg(range_bits.to_string())
            .arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|err| {
            CoordinatorError::Config(format!("failed to spawn {}: {err}", self.xiebo_binary))
        })?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        let (lines_tx, mut lines_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        spawn_line_pump(BufReader::new(stdout), lines_tx.clone());
        spawn_line_pump(BufReader::new(stderr), lines_tx);

        let mut parser = OutputParser::new(notify_hit);

        let exit_code = loop {
            if stop.is_set() {
                tracing::warn!(gpu_id, batch_id = batch.id, "stop signal observed, terminating worker");
                let _ = child.start_kill();
                let _ = child.wait().await;
                let interrupted = CoordinatorError::WorkerInterrupted { batch_id: batch.id };
                tracing::warn!(error = %interrupted, "worker interrupted before completion");
                return Ok(RunnerOutcome {
                    batch_id: batch.id,
                    exit_code: None,
                    parsed: parser.into_outcome(),
                    resulting_status: BatchStatus::Interrupted,
                });
            }

            tokio::select! {
                line = lines_rx.recv() => {
                    match line {
                        Some(text) => {
                            presenter.print_worker_line(gpu_id, Some(batch.id), &text);
                            parser.feed_line(&text);
                        }
                        None => {
                            // Both pumps have closed their sender; the child
                            // is still the authority on when the run ends.
                        }
                    }
                }
                status = child.wait() => {
                    let status = status.map_err(|err| CoordinatorError::Config(err.to_string()))?;
                    break status.code();
                }
            }
        };

        // Drain whatever lines buffered between the child exiting and this
        // task last polling the channel.
        while let Ok(text) = lines_rx.try_recv() {
            presenter.print_worker_line(gpu_id, Some(batch.id), &text);
            parser.feed_line(&text);
        }

        let outcome = parser.into_outcome();
        let resulting_status = match exit_code {
            Some(0) if outcome.any_hit => BatchStatus::Done,
            Some(0) => BatchStatus::Done,
            _ => {
                let failure = CoordinatorError::WorkerExitNonZero {
                    batch_id: batch.id,
                    code: exit_code.unwrap_or(-1),
                };
                tracing::error!(gpu_id, error = %failure, "worker exited abnormally");
                BatchStatus::Failed
            }
        };

        Ok(RunnerOutcome {
            batch_id: batch.id,
            exit_code,
            parsed: outcome,
            resulting_status,
        })
    }
}

/// `found` is derived from the parsed outcome rather than the exit code
/// alone, so a zero-exit run with no hit still reports `found = No`.
pub fn found_for(outcome: &ParsedOutcome, status: BatchStatus) -> Found {
    match status {
        BatchStatus::Done if outcome.any_hit => Found::Yes,
        BatchStatus::Done => Found::No,
        _ => Found::Unknown,
    }
}

/// Drains one child pipe line-by-line into `tx`, dropping its sender on
/// EOF. Two of these racing into the same channel is what lets the caller
/// `select!` on a single `recv()` instead of polling each stream, which
/// would busy-spin once one side finishes before the other.
fn spawn_line_pump<R>(reader: BufReader<R>, tx: UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(text)) => {
                    if tx.send(text).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "error reading worker output stream");
                    break;
                }
            }
        }
    });
}

fn batch_range_bits(batch: &Batch) -> Result<u32, CoordinatorError> {
    let start = parse_hex(&batch.start_hex).map_err(|_| CoordinatorError::InvalidHex(batch.start_hex.clone()))?;
    let end = parse_hex(&batch.end_hex).map_err(|_| CoordinatorError::InvalidHex(batch.end_hex.clone()))?;
    let count = &end - &start + num_bigint::BigUint::from(1u8);
    Ok(bits_for(&count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_range_bits_matches_interval_size() {
        let batch = Batch::new_pending(0, "0", "3");
        assert_eq!(batch_range_bits(&batch).unwrap(), 2);
    }

    #[test]
    fn found_for_reflects_any_hit() {
        let mut outcome = ParsedOutcome::default();
        assert_eq!(found_for(&outcome, BatchStatus::Done), Found::No);
        outcome.any_hit = true;
        assert_eq!(found_for(&outcome, BatchStatus::Done), Found::Yes);
        assert_eq!(found_for(&outcome, BatchStatus::Failed), Found::Unknown);
    }
}
