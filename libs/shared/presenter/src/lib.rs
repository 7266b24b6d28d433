//! Thread-safe output formatter shared by the generator and the dispatcher.
//!
//! A single mutex serializes every user-visible line so interleaved worker
//! output never tears mid-line. The bounded mode exists for hosted-notebook
//! environments whose output cell grows unusably long otherwise: after a
//! wall-clock interval or a line count, whichever triggers first, the
//! presenter clears the visible area and reprints only the latest progress
//! line.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Unbounded,
    /// Clears after `clear_lines` printed lines or `clear_interval`
    /// elapsed, whichever comes first.
    Bounded,
}

pub struct Presenter {
    mode: Mode,
    clear_interval: Duration,
    clear_lines: u32,
    state: Mutex<State>,
}

struct State {
    lines_since_clear: u32,
    last_clear: Instant,
    last_progress_line: String,
}

impl Presenter {
    pub fn unbounded() -> Self {
        Self::new(Mode::Unbounded, Duration::from_secs(180), 100)
    }

    pub fn bounded(clear_interval: Duration, clear_lines: u32) -> Self {
        Self::new(Mode::Bounded, clear_interval, clear_lines)
    }

    fn new(mode: Mode, clear_interval: Duration, clear_lines: u32) -> Self {
        Self {
            mode,
            clear_interval,
            clear_lines,
            state: Mutex::new(State {
                lines_since_clear: 0,
                last_clear: Instant::now(),
                last_progress_line: String::new(),
            }),
        }
    }

    /// Prints one line of worker output, prefixed with its GPU (and,
    /// when known, batch) identity.
    pub fn print_worker_line(&self, gpu_id: u32, batch_id: Option<u64>, line: &str) {
        let prefix = match batch_id {
            Some(b) => format!("[GPU {gpu_id}][Batch {b}] "),
            None => format!("[GPU {gpu_id}] "),
        };
        self.emit(&prefix, line);
    }

    /// Prints a presenter-originated status line (no GPU prefix), e.g. a
    /// generator ETA tick or a dispatcher summary.
    pub fn print_status(&self, line: &str) {
        self.emit("", line);
    }

    /// Builds a spinner used by the generator's 0.5s ETA tick. Rendered
    /// independently of the line-printing discipline above since it
    /// overwrites its own line rather than appending new ones.
    pub fn eta_spinner(&self) -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(500));
        bar
    }

    fn emit(&self, prefix: &str, line: &str) {
        if self.mode == Mode::Bounded && should_suppress(line) {
            return;
        }
        let full = format!("{prefix}{line}");
        let mut state = self.state.lock().expect("presenter mutex poisoned");

        if is_progress_line(line) {
            state.last_progress_line = full.clone();
        }

        println!("{full}");
        let _ = std::io::stdout().flush();
        state.lines_since_clear += 1;

        if self.mode == Mode::Bounded {
            let line_threshold_hit = state.lines_since_clear >= self.clear_lines;
            let time_threshold_hit = state.last_clear.elapsed() >= self.clear_interval;
            if line_threshold_hit || time_threshold_hit {
                clear_screen();
                if !state.last_progress_line.is_empty() {
                    println!("{}", state.last_progress_line);
                }
                state.lines_since_clear = 0;
                state.last_clear = Instant::now();
            }
        }
    }
}

fn clear_screen() {
    // ANSI "clear screen, cursor home" — a no-op visually when stdout isn't
    // a terminal, but harmless either way.
    print!("\x1B[2J\x1B[H");
}

fn is_progress_line(line: &str) -> bool {
    line.contains('%') || line.to_ascii_lowercase().contains("speed:")
}

/// Suppresses percent-wise progress reports that aren't on a 5% boundary,
/// so the bounded mode's reprinted line is usually a meaningful one.
fn should_suppress(line: &str) -> bool {
    match extract_percent(line) {
        Some(pct) => pct % 5 != 0,
        None => false,
    }
}

/// Pulls the integer immediately preceding a `%` character, if any.
fn extract_percent(line: &str) -> Option<u32> {
    let pct_pos = line.find('%')?;
    let digits_end = pct_pos;
    let digits_start = line[..digits_end]
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    if digits_start == digits_end {
        return None;
    }
    line[digits_start..digits_end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_percent_from_progress_line() {
        assert_eq!(extract_percent("Progress: 37%"), Some(37));
        assert_eq!(extract_percent("no percent here"), None);
        assert_eq!(extract_percent("100% complete"), Some(100));
    }

    #[test]
    fn suppresses_non_boundary_percentages() {
        assert!(should_suppress("Progress: 37%"));
        assert!(!should_suppress("Progress: 35%"));
        assert!(!should_suppress("Range Finished! Found: 0"));
    }

    #[test]
    fn bounded_presenter_clears_after_line_threshold() {
        let presenter = Presenter::bounded(Duration::from_secs(600), 3);
        presenter.print_status("Progress: 5%");
        presenter.print_status("Progress: 10%");
        presenter.print_status("Progress: 15%");
        let state = presenter.state.lock().unwrap();
        assert_eq!(state.lines_since_clear, 0);
    }
}
