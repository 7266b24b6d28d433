use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single-file checkpoint (`nextbatch.txt`) capturing a partitioning
/// run's origin, progress, and current shard pointer. Serialized as
/// `key=value` lines, one pair per line; unknown keys are ignored on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRecord {
    pub original_start: String,
    pub original_range_bits: u32,
    pub address: String,
    pub next_start_hex: String,
    pub batches_generated: u64,
    pub total_batches: u64,
    pub timestamp: DateTime<Utc>,
    pub current_batch_file: String,
    pub current_batch_index: u32,
}

impl ResumeRecord {
    pub fn is_complete(&self) -> bool {
        self.batches_generated >= self.total_batches
    }

    pub fn to_kv_string(&self) -> String {
        format!(
            "original_start={}\n\
             original_range_bits={}\n\
             address={}\n\
             next_start_hex={}\n\
             batches_generated={}\n\
             total_batches={}\n\
             timestamp={}\n\
             current_batch_file={}\n\
             current_batch_index={}\n",
            self.original_start,
            self.original_range_bits,
            self.address,
            self.next_start_hex,
            self.batches_generated,
            self.total_batches,
            self.timestamp.to_rfc3339(),
            self.current_batch_file,
            self.current_batch_index,
        )
    }

    pub fn from_kv_string(raw: &str) -> Option<Self> {
        let mut map = std::collections::HashMap::new();
        for line in raw.lines() {
            if let Some((k, v)) = line.split_once('=') {
                map.insert(k.trim().to_string(), v.trim().to_string());
            }
        }
        Some(Self {
            original_start: map.get("original_start")?.clone(),
            original_range_bits: map.get("original_range_bits")?.parse().ok()?,
            address: map.get("address").cloned().unwrap_or_default(),
            next_start_hex: map.get("next_start_hex")?.clone(),
            batches_generated: map.get("batches_generated")?.parse().ok()?,
            total_batches: map.get("total_batches")?.parse().ok()?,
            timestamp: map
                .get("timestamp")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now),
            current_batch_file: map.get("current_batch_file").cloned().unwrap_or_default(),
            current_batch_index: map
                .get("current_batch_index")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResumeRecord {
        ResumeRecord {
            original_start: "100".into(),
            original_range_bits: 16,
            address: "1abc".into(),
            next_start_hex: "200".into(),
            batches_generated: 4,
            total_batches: 16,
            timestamp: Utc::now(),
            current_batch_file: "generated_batches_001.txt".into(),
            current_batch_index: 1,
        }
    }

    #[test]
    fn round_trips_through_kv_string() {
        let rec = sample();
        let serialized = rec.to_kv_string();
        let parsed = ResumeRecord::from_kv_string(&serialized).unwrap();
        assert_eq!(rec.original_start, parsed.original_start);
        assert_eq!(rec.next_start_hex, parsed.next_start_hex);
        assert_eq!(rec.batches_generated, parsed.batches_generated);
        assert_eq!(rec.total_batches, parsed.total_batches);
        assert_eq!(rec.current_batch_index, parsed.current_batch_index);
    }

    #[test]
    fn ignores_unknown_keys() {
        let mut serialized = sample().to_kv_string();
        serialized.push_str("some_future_field=surprise\n");
        assert!(ResumeRecord::from_kv_string(&serialized).is_some());
    }

    #[test]
    fn is_complete_when_progress_reaches_total() {
        let mut rec = sample();
        rec.batches_generated = rec.total_batches;
        assert!(rec.is_complete());
    }
}
