// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail — append-only SQLite log of every compliance-relevant action.
//
// Schema:
//   audit_log(
//     id           INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp    TEXT    NOT NULL,   -- RFC 3339
//     action       TEXT    NOT NULL,   -- e.g. "certificate.issue", "delivery.retry"
//     subject      TEXT    NOT NULL,   -- asset tag, certificate ID, partner name
//     content_hash TEXT,               -- SHA-256 hex of the artifact, if any
//     success      INTEGER NOT NULL,   -- 0 = failure, 1 = success
//     details      TEXT
//   )

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use trustwipe_core::error::{Result, TrustwipeError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp    TEXT    NOT NULL,
    action       TEXT    NOT NULL,
    subject      TEXT    NOT NULL,
    content_hash TEXT,
    success      INTEGER NOT NULL,
    details      TEXT
);
CREATE INDEX IF NOT EXISTS idx_audit_subject ON audit_log(subject);";

const COLUMNS: &str = "id, timestamp, action, subject, content_hash, success, details";

fn db_err(e: rusqlite::Error) -> TrustwipeError {
    TrustwipeError::Database(e.to_string())
}

/// A single entry in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub action: String,
    pub subject: String,
    pub content_hash: Option<String>,
    pub success: bool,
    pub details: Option<String>,
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        action: row.get(2)?,
        subject: row.get(3)?,
        content_hash: row.get(4)?,
        success: row.get::<_, i32>(5)? != 0,
        details: row.get(6)?,
    })
}

/// Append-only audit log backed by SQLite. There is no update or delete.
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;").map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!("audit log opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self { conn })
    }

    #[instrument(skip(self, content_hash, details), fields(%action, %subject, success))]
    pub fn record(
        &self,
        action: &str,
        subject: &str,
        content_hash: Option<&str>,
        success: bool,
        details: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO audit_log (timestamp, action, subject, content_hash, success, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Utc::now().to_rfc3339(),
                    action,
                    subject,
                    content_hash,
                    success as i32,
                    details
                ],
            )
            .map_err(db_err)?;
        debug!("audit entry recorded");
        Ok(())
    }

    /// All entries about `subject`, oldest first.
    pub fn entries_for_subject(&self, subject: &str) -> Result<Vec<AuditEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM audit_log WHERE subject = ?1 ORDER BY id ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map(params![subject], row_to_entry).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM audit_log ORDER BY id DESC LIMIT ?1"))
            .map_err(db_err)?;
        let rows = stmt.query_map(params![limit], row_to_entry).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_log() -> AuditLog {
        AuditLog::open_in_memory().unwrap()
    }

    #[test]
    fn record_and_count() {
        let log = make_log();
        assert_eq!(log.count().unwrap(), 0);
        log.record("asset.intake", "DT-001-2025", None, true, None).unwrap();
        log.record("certificate.issue", "swc-2025-09-08-ABC123", Some("c3d4"), true, None)
            .unwrap();
        assert_eq!(log.count().unwrap(), 2);
    }

    #[test]
    fn entries_for_subject_in_order() {
        let log = make_log();
        log.record("delivery.attempt", "swc-2025-09-08-A1B2C3", None, false, Some("timed out"))
            .unwrap();
        log.record("asset.queue", "DT-001-2025", None, true, None).unwrap();
        log.record("delivery.retry", "swc-2025-09-08-A1B2C3", None, true, Some("manual"))
            .unwrap();

        let entries = log.entries_for_subject("swc-2025-09-08-A1B2C3").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "delivery.attempt");
        assert!(!entries[0].success);
        assert_eq!(entries[0].details.as_deref(), Some("timed out"));
        assert_eq!(entries[1].action, "delivery.retry");
        assert!(entries[1].content_hash.is_none());
    }

    #[test]
    fn recent_entries_newest_first() {
        let log = make_log();
        for i in 0..5 {
            log.record("op", &format!("subject-{i}"), None, true, None).unwrap();
        }
        let recent = log.recent_entries(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].subject, "subject-4");
        assert!(recent[1].id > recent[2].id);
    }

    #[test]
    fn file_backed_log_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        AuditLog::open(&path)
            .unwrap()
            .record("init", "station", None, true, None)
            .unwrap();
        assert_eq!(AuditLog::open(&path).unwrap().count().unwrap(), 1);
    }
}
