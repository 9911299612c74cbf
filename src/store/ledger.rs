//! SQLite-backed idempotency ledger.
//!
//! One row per terminal job outcome, keyed by the job identifier. This
//! table is the sole exactly-once gate: the orchestrator consults
//! `is_processed` before doing anything and writes exactly one record at
//! the terminal point of every job. Records are never deleted here.
//!
//! The same database carries per-account remote listing state (cursor +
//! scaffold-initialized flag), persisted so a restart neither re-lists
//! seen pages nor re-runs folder initialization.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("ledger lock poisoned")]
    Poisoned,
}

/// Terminal status of a processed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        }
    }
}

/// One terminal outcome, as written
#[derive(Debug, Clone)]
pub struct LedgerRecord {
    pub identifier: String,
    pub status: JobStatus,
    pub hash: Option<String>,
    pub account_id: Option<String>,
    pub error_message: Option<String>,
    pub output_path: Option<String>,
}

/// One terminal outcome, as read back
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub identifier: String,
    pub status: String,
    pub hash: Option<String>,
    pub account_id: Option<String>,
    pub processed_at: String,
    pub error_message: Option<String>,
    pub output_path: Option<String>,
}

/// Durable record of job outcomes and remote account state
pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    /// Open (or create) the ledger database at the given path
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        tracing::info!(path = %path.display(), "Opened ledger database");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory ledger for tests
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS processed_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identifier TEXT NOT NULL UNIQUE,
                hash TEXT,
                account_id TEXT,
                processed_at TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                output_path TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_identifier ON processed_jobs(identifier);
            CREATE INDEX IF NOT EXISTS idx_account_id ON processed_jobs(account_id);
            CREATE TABLE IF NOT EXISTS account_state (
                account_id TEXT PRIMARY KEY,
                cursor TEXT,
                initialized INTEGER NOT NULL DEFAULT 0
            );",
        )?;
        Ok(())
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(f(&conn)?)
    }

    /// True only if a record exists with status `success`
    pub fn is_processed(&self, identifier: &str) -> Result<bool, LedgerError> {
        self.with_conn(|conn| {
            let status: Option<String> = conn
                .query_row(
                    "SELECT status FROM processed_jobs WHERE identifier = ?1",
                    params![identifier],
                    |row| row.get(0),
                )
                .optional()?;

            Ok(status.as_deref() == Some("success"))
        })
    }

    /// Upsert the terminal record for a job
    pub fn mark_processed(&self, record: &LedgerRecord) -> Result<(), LedgerError> {
        let processed_at = Utc::now().to_rfc3339();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO processed_jobs
                 (identifier, hash, account_id, processed_at, status, error_message, output_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.identifier,
                    record.hash,
                    record.account_id,
                    processed_at,
                    record.status.as_str(),
                    record.error_message,
                    record.output_path,
                ],
            )?;
            Ok(())
        })?;

        tracing::debug!(
            identifier = %record.identifier,
            status = record.status.as_str(),
            "Recorded job outcome"
        );
        Ok(())
    }

    /// Read a record back by identifier
    pub fn get(&self, identifier: &str) -> Result<Option<StoredRecord>, LedgerError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT identifier, status, hash, account_id, processed_at, error_message, output_path
                 FROM processed_jobs WHERE identifier = ?1",
                params![identifier],
                |row| {
                    Ok(StoredRecord {
                        identifier: row.get(0)?,
                        status: row.get(1)?,
                        hash: row.get(2)?,
                        account_id: row.get(3)?,
                        processed_at: row.get(4)?,
                        error_message: row.get(5)?,
                        output_path: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Counts by status, optionally filtered by account
    pub fn stats(&self, account_id: Option<&str>) -> Result<Vec<(String, u64)>, LedgerError> {
        self.with_conn(|conn| {
            let mut rows = Vec::new();

            if let Some(account) = account_id {
                let mut stmt = conn.prepare(
                    "SELECT status, COUNT(*) FROM processed_jobs
                     WHERE account_id = ?1 GROUP BY status",
                )?;
                let mapped = stmt.query_map(params![account], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
                })?;
                for row in mapped {
                    rows.push(row?);
                }
            } else {
                let mut stmt =
                    conn.prepare("SELECT status, COUNT(*) FROM processed_jobs GROUP BY status")?;
                let mapped = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
                })?;
                for row in mapped {
                    rows.push(row?);
                }
            }

            Ok(rows)
        })
    }

    /// Last saved listing cursor for an account
    pub fn cursor(&self, account_id: &str) -> Result<Option<String>, LedgerError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT cursor FROM account_state WHERE account_id = ?1",
                params![account_id],
                |row| row.get(0),
            )
            .optional()
            .map(Option::flatten)
        })
    }

    /// Persist the listing cursor after a page is consumed
    pub fn set_cursor(&self, account_id: &str, cursor: &str) -> Result<(), LedgerError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO account_state (account_id, cursor) VALUES (?1, ?2)
                 ON CONFLICT(account_id) DO UPDATE SET cursor = excluded.cursor",
                params![account_id, cursor],
            )?;
            Ok(())
        })
    }

    /// Whether the account's remote folder scaffold has been created
    pub fn is_initialized(&self, account_id: &str) -> Result<bool, LedgerError> {
        self.with_conn(|conn| {
            let initialized: Option<i64> = conn
                .query_row(
                    "SELECT initialized FROM account_state WHERE account_id = ?1",
                    params![account_id],
                    |row| row.get(0),
                )
                .optional()?;

            Ok(initialized == Some(1))
        })
    }

    /// Record that scaffold initialization has run for an account
    pub fn mark_initialized(&self, account_id: &str) -> Result<(), LedgerError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO account_state (account_id, initialized) VALUES (?1, 1)
                 ON CONFLICT(account_id) DO UPDATE SET initialized = 1",
                params![account_id],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_processed_only_for_success() {
        let ledger = Ledger::in_memory().unwrap();

        assert!(!ledger.is_processed("job-1").unwrap());

        ledger
            .mark_processed(&LedgerRecord {
                identifier: "job-1".to_string(),
                status: JobStatus::Error,
                hash: None,
                account_id: Some("local".to_string()),
                error_message: Some("boom".to_string()),
                output_path: None,
            })
            .unwrap();

        // Error records do not gate re-processing
        assert!(!ledger.is_processed("job-1").unwrap());

        ledger
            .mark_processed(&LedgerRecord {
                identifier: "job-1".to_string(),
                status: JobStatus::Success,
                hash: Some("abc".to_string()),
                account_id: Some("local".to_string()),
                error_message: None,
                output_path: Some("/out/folder".to_string()),
            })
            .unwrap();

        assert!(ledger.is_processed("job-1").unwrap());
    }

    #[test]
    fn test_upsert_replaces_by_identifier() {
        let ledger = Ledger::in_memory().unwrap();

        for status in [JobStatus::Error, JobStatus::Success] {
            ledger
                .mark_processed(&LedgerRecord {
                    identifier: "job-1".to_string(),
                    status,
                    hash: None,
                    account_id: None,
                    error_message: None,
                    output_path: None,
                })
                .unwrap();
        }

        let stats = ledger.stats(None).unwrap();
        assert_eq!(stats, vec![("success".to_string(), 1)]);
    }

    #[test]
    fn test_stats_filtered_by_account() {
        let ledger = Ledger::in_memory().unwrap();

        for (id, account) in [("a", "acct-1"), ("b", "acct-1"), ("c", "acct-2")] {
            ledger
                .mark_processed(&LedgerRecord {
                    identifier: id.to_string(),
                    status: JobStatus::Success,
                    hash: None,
                    account_id: Some(account.to_string()),
                    error_message: None,
                    output_path: None,
                })
                .unwrap();
        }

        let stats = ledger.stats(Some("acct-1")).unwrap();
        assert_eq!(stats, vec![("success".to_string(), 2)]);
    }

    #[test]
    fn test_cursor_roundtrip() {
        let ledger = Ledger::in_memory().unwrap();

        assert_eq!(ledger.cursor("acct").unwrap(), None);

        ledger.set_cursor("acct", "cursor-1").unwrap();
        assert_eq!(ledger.cursor("acct").unwrap().as_deref(), Some("cursor-1"));

        ledger.set_cursor("acct", "cursor-2").unwrap();
        assert_eq!(ledger.cursor("acct").unwrap().as_deref(), Some("cursor-2"));
    }

    #[test]
    fn test_initialized_flag_survives_cursor_updates() {
        let ledger = Ledger::in_memory().unwrap();

        assert!(!ledger.is_initialized("acct").unwrap());
        ledger.mark_initialized("acct").unwrap();
        ledger.set_cursor("acct", "c1").unwrap();

        assert!(ledger.is_initialized("acct").unwrap());
        assert_eq!(ledger.cursor("acct").unwrap().as_deref(), Some("c1"));
    }
}
