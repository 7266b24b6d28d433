//! Line-oriented streaming parser for `xiebo` stdout.
//!
//! This crate must never depend on the dispatcher or the stop broadcaster:
//! the "raise the fleet-wide stop on first hit" behavior is injected as a
//! plain capability (`Fn()`), so the parser can be unit-tested with a mock
//! and the dispatcher can be swapped without touching this crate.

use regex::Regex;
use std::sync::OnceLock;
use xiebo_shared_errors::CoordinatorError;

fn hit_count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)range finished!.*found:\s*(\d+)").expect("static regex is valid")
    })
}

/// Accumulated state for one `xiebo` child's entire run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutcome {
    pub hit_count: u64,
    pub any_hit: bool,
    pub speed_summary: String,
    pub private_hex: String,
    pub private_wif: String,
    pub wif_short: String,
    pub address: String,
    pub raw_hits: Vec<String>,
}

/// Streaming parser: feed it one line at a time via [`OutputParser::feed_line`].
pub struct OutputParser<F: Fn()> {
    outcome: ParsedOutcome,
    notify_hit: F,
    notified: bool,
}

impl<F: Fn()> OutputParser<F> {
    pub fn new(notify_hit: F) -> Self {
        Self {
            outcome: ParsedOutcome::default(),
            notify_hit,
            notified: false,
        }
    }

    /// Feeds one line of (already UTF-8-decoded) child stdout. Never fails:
    /// unrecognized lines are simply not matched, per the spec's
    /// `ParseError` disposition of "never fatal".
    pub fn feed_line(&mut self, line: &str) {
        let trimmed = line.trim();

        if let Some(captures) = hit_count_pattern().captures(trimmed) {
            self.outcome.speed_summary = trimmed.to_string();
            match captures.get(1).map(|m| m.as_str()).unwrap_or_default().parse::<u64>() {
                Ok(count) => {
                    self.outcome.hit_count = count;
                    self.outcome.raw_hits.push(trimmed.to_string());
                    if count >= 1 {
                        self.mark_hit();
                    }
                }
                Err(_) => {
                    let err = CoordinatorError::Parse(trimmed.to_string());
                    tracing::warn!(error = %err, "unparseable hit count, line ignored");
                }
            }
            return;
        }

        if let Some(rest) = strip_prefix_ci(trimmed, "priv (hex):") {
            self.outcome.private_hex = rest.trim().to_string();
            self.outcome.raw_hits.push(trimmed.to_string());
            self.refresh_wif_short();
            self.mark_hit();
            return;
        }

        if let Some(rest) = strip_prefix_ci(trimmed, "priv (wif):") {
            self.outcome.private_wif = rest.trim().to_string();
            self.outcome.raw_hits.push(trimmed.to_string());
            self.refresh_wif_short();
            self.mark_hit();
            return;
        }

        if self.outcome.any_hit {
            if let Some(rest) = strip_prefix_ci(trimmed, "address:") {
                self.outcome.address = rest.trim().to_string();
                self.outcome.raw_hits.push(trimmed.to_string());
            }
        }
    }

    fn refresh_wif_short(&mut self) {
        let source = if !self.outcome.private_wif.is_empty() {
            &self.outcome.private_wif
        } else {
            &self.outcome.private_hex
        };
        self.outcome.wif_short = source.chars().take(60).collect();
    }

    fn mark_hit(&mut self) {
        self.outcome.any_hit = true;
        if !self.notified {
            self.notified = true;
            tracing::info!("🎯 hit detected, notifying fleet");
            (self.notify_hit)();
        }
    }

    pub fn into_outcome(self) -> ParsedOutcome {
        self.outcome
    }

    pub fn outcome(&self) -> &ParsedOutcome {
        &self.outcome
    }
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() < prefix.len() {
        return None;
    }
    let (head, tail) = line.split_at(prefix.len());
    if head.eq_ignore_ascii_case(prefix) {
        Some(tail)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn mock_notifier() -> (Rc<Cell<u32>>, impl Fn()) {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        (calls, move || calls_clone.set(calls_clone.get() + 1))
    }

    #[test]
    fn no_hit_transcript_leaves_any_hit_false() {
        let (calls, notify) = mock_notifier();
        let mut parser = OutputParser::new(notify);
        parser.feed_line("Setting starting keys...");
        parser.feed_line("Speed: 3500 Mkey/s");
        parser.feed_line("Range Finished! Time: 00:01:02 Found: 0");
        let outcome = parser.into_outcome();
        assert_eq!(outcome.hit_count, 0);
        assert!(!outcome.any_hit);
        assert_eq!(outcome.speed_summary, "Range Finished! Time: 00:01:02 Found: 0");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn hit_transcript_populates_key_material_and_notifies_once() {
        let (calls, notify) = mock_notifier();
        let mut parser = OutputParser::new(notify);
        parser.feed_line("Range Finished! Time: 00:02:00 Found: 1");
        parser.feed_line("Priv (HEX): DEADBEEF");
        let wif = "K".to_string() + &"x".repeat(59);
        parser.feed_line(&format!("Priv (WIF): {wif}"));
        parser.feed_line("Address: 1abcXYZ");

        let outcome = parser.into_outcome();
        assert_eq!(outcome.hit_count, 1);
        assert!(outcome.any_hit);
        assert_eq!(outcome.private_hex, "DEADBEEF");
        assert_eq!(outcome.private_wif, wif);
        assert_eq!(outcome.wif_short.len(), 60);
        assert_eq!(outcome.address, "1abcXYZ");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let (_, notify) = mock_notifier();
        let mut parser = OutputParser::new(notify);
        parser.feed_line("RANGE FINISHED! found: 2");
        parser.feed_line("priv (hex): cafebabe");
        let outcome = parser.into_outcome();
        assert_eq!(outcome.hit_count, 2);
        assert_eq!(outcome.private_hex, "cafebabe");
    }

    #[test]
    fn address_before_any_hit_is_ignored() {
        let (_, notify) = mock_notifier();
        let mut parser = OutputParser::new(notify);
        parser.feed_line("Address: 1ignored");
        assert!(parser.outcome().address.is_empty());
    }
}
