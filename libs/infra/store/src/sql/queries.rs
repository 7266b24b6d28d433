//! Raw SQL constants for the `Tbatch` repository. Kept apart from
//! `store.rs` so the statements can be read and audited as a single block.

/// Tolerates the legacy equivalence `status IN ('', 'uncheck', 'pending')`.
pub const FETCH_PENDING: &str = "
SELECT id, start_range, end_range, status, found, wif
FROM Tbatch
WHERE id >= ?1 AND status IN ('', 'uncheck', 'pending')
ORDER BY id
LIMIT ?2";

pub const FETCH_BY_ID: &str = "
SELECT id, start_range, end_range, status, found, wif
FROM Tbatch
WHERE id = ?1";

pub const INSERT_BATCH: &str = "
INSERT INTO Tbatch (id, start_range, end_range, status, found, wif)
VALUES (?1, ?2, ?3, 'pending', '', '')
ON CONFLICT(id) DO NOTHING";

/// Conditional claim: only transitions a row that isn't already
/// `in_progress` or `done`, closing the race described in §9(c). The
/// caller inspects the affected-row count to learn whether it actually won
/// the claim.
pub const CLAIM_BATCH: &str = "
UPDATE Tbatch
SET status = 'in_progress'
WHERE id = ?1 AND status NOT IN ('in_progress', 'done')";

pub const FINALIZE_BATCH: &str = "
UPDATE Tbatch
SET status = ?2, found = ?3, wif = ?4
WHERE id = ?1";

/// Dispatcher-startup sweep: any row left `in_progress` by a crashed
/// previous run is orphaned and must be reset before new work is claimed.
pub const RECOVER_ORPHANED_BATCHES: &str = "
UPDATE Tbatch SET status = 'pending' WHERE status = 'in_progress'";
