use serde::{Deserialize, Serialize};
use std::fmt;

/// A contiguous integer interval `[start, end]` of candidate keys, identified
/// by a dense, zero-based, globally ordered id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: u64,
    /// Lowercase hex, no prefix, no leading zeros.
    pub start_hex: String,
    /// Lowercase hex, no prefix, no leading zeros. Inclusive.
    pub end_hex: String,
    pub status: BatchStatus,
    pub found: Found,
    /// Truncated to at most 60 characters; empty when not found.
    pub wif: String,
}

impl Batch {
    pub fn new_pending(id: u64, start_hex: impl Into<String>, end_hex: impl Into<String>) -> Self {
        Self {
            id,
            start_hex: start_hex.into(),
            end_hex: end_hex.into(),
            status: BatchStatus::Pending,
            found: Found::Unknown,
            wif: String::new(),
        }
    }
}

/// `status` only moves forward in this DAG: `Pending -> InProgress -> {Done,
/// Failed, Interrupted}`. `InProgress -> Pending` is permitted only as
/// orphan recovery at dispatcher startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Interrupted,
}

impl BatchStatus {
    /// Parses a raw store value, folding the legacy empty-string and
    /// `uncheck` spellings into `Pending`.
    pub fn parse_legacy(raw: &str) -> Self {
        match raw.trim() {
            "" | "uncheck" | "pending" => BatchStatus::Pending,
            "in_progress" => BatchStatus::InProgress,
            "done" => BatchStatus::Done,
            "failed" => BatchStatus::Failed,
            "interrupted" => BatchStatus::Interrupted,
            other => {
                tracing::warn!(raw = other, "unrecognized batch status, treating as pending");
                BatchStatus::Pending
            }
        }
    }

    pub fn as_store_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Done => "done",
            BatchStatus::Failed => "failed",
            BatchStatus::Interrupted => "interrupted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Done | BatchStatus::Failed | BatchStatus::Interrupted)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_store_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Found {
    Unknown,
    Yes,
    No,
}

impl Found {
    pub fn parse_legacy(raw: &str) -> Self {
        match raw.trim() {
            "yes" => Found::Yes,
            "no" => Found::No,
            _ => Found::Unknown,
        }
    }

    pub fn as_store_str(&self) -> &'static str {
        match self {
            Found::Unknown => "",
            Found::Yes => "yes",
            Found::No => "no",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_status_equivalence() {
        assert_eq!(BatchStatus::parse_legacy(""), BatchStatus::Pending);
        assert_eq!(BatchStatus::parse_legacy("uncheck"), BatchStatus::Pending);
        assert_eq!(BatchStatus::parse_legacy("pending"), BatchStatus::Pending);
        assert_eq!(BatchStatus::parse_legacy("done"), BatchStatus::Done);
    }

    #[test]
    fn terminal_statuses() {
        assert!(BatchStatus::Done.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
        assert!(BatchStatus::Interrupted.is_terminal());
        assert!(!BatchStatus::Pending.is_terminal());
        assert!(!BatchStatus::InProgress.is_terminal());
    }
}
