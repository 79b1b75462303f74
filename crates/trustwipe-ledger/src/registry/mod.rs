// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent registry backed by SQLite.
//
// One database (`ledger.db`) holds every entity. Invariants that must hold
// even if a bug slips past the domain layer are also written into the schema:
// certificates cannot be updated or deleted, a certificate can be superseded
// only once, and a certificate has at most one live anchor and at most one
// confirmed anchor.

pub mod anchors;
mod assets;
mod certificates;
mod deliveries;
mod partners;

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, instrument};
use trustwipe_core::error::{Result, TrustwipeError};

pub use certificates::StoredCertificate;

const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS assets (
        id                   TEXT PRIMARY KEY,
        asset_tag            TEXT NOT NULL UNIQUE,
        asset_type           TEXT NOT NULL,
        manufacturer         TEXT NOT NULL,
        model                TEXT NOT NULL,
        serial_number        TEXT NOT NULL,
        status               TEXT NOT NULL,
        assigned_to          TEXT,
        recycler_destination TEXT,
        intake_at            TEXT NOT NULL,
        updated_at           TEXT NOT NULL,
        failure_reason       TEXT
    );

    CREATE TABLE IF NOT EXISTS drives (
        id               TEXT PRIMARY KEY,
        asset_id         TEXT NOT NULL REFERENCES assets(id),
        position         INTEGER NOT NULL,
        path             TEXT NOT NULL,
        model            TEXT NOT NULL,
        serial           TEXT NOT NULL,
        drive_type       TEXT NOT NULL,
        capacity_bytes   INTEGER NOT NULL,
        status           TEXT NOT NULL,
        method           TEXT,
        progress         INTEGER NOT NULL DEFAULT 0,
        wipe_started_at  TEXT,
        wipe_finished_at TEXT,
        failure_reason   TEXT,
        UNIQUE (asset_id, path)
    );

    CREATE TABLE IF NOT EXISTS certificates (
        id           TEXT PRIMARY KEY,
        asset_tag    TEXT NOT NULL,
        drive_serial TEXT NOT NULL,
        content_hash TEXT NOT NULL UNIQUE,
        supersedes   TEXT UNIQUE REFERENCES certificates(id),
        issued_at    TEXT NOT NULL,
        bundle       TEXT NOT NULL
    );

    CREATE TRIGGER IF NOT EXISTS certificates_no_update
    BEFORE UPDATE ON certificates
    BEGIN
        SELECT RAISE(ABORT, 'certificates are immutable');
    END;

    CREATE TRIGGER IF NOT EXISTS certificates_no_delete
    BEFORE DELETE ON certificates
    BEGIN
        SELECT RAISE(ABORT, 'certificates are immutable');
    END;

    -- Only a drive's first certificate may stand alone; later ones must
    -- amend a certificate for the same drive.
    CREATE TRIGGER IF NOT EXISTS certificates_one_root_per_drive
    BEFORE INSERT ON certificates
    WHEN NEW.supersedes IS NULL
    BEGIN
        SELECT RAISE(ABORT, 'drive already certified')
        WHERE EXISTS (SELECT 1 FROM certificates
                      WHERE asset_tag = NEW.asset_tag AND drive_serial = NEW.drive_serial);
    END;

    CREATE TRIGGER IF NOT EXISTS certificates_amend_same_drive
    BEFORE INSERT ON certificates
    WHEN NEW.supersedes IS NOT NULL
    BEGIN
        SELECT RAISE(ABORT, 'amendment is for a different drive')
        WHERE NOT EXISTS (SELECT 1 FROM certificates
                          WHERE id = NEW.supersedes
                            AND asset_tag = NEW.asset_tag
                            AND drive_serial = NEW.drive_serial);
    END;

    CREATE TABLE IF NOT EXISTS anchors (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        certificate_id   TEXT NOT NULL REFERENCES certificates(id),
        transaction_hash TEXT NOT NULL UNIQUE,
        cert_hash        TEXT NOT NULL,
        network          TEXT NOT NULL,
        block_number     INTEGER,
        gas_used         INTEGER,
        status           TEXT NOT NULL,
        submitted_at     TEXT NOT NULL,
        resolved_at      TEXT,
        failure_reason   TEXT,
        metadata         TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS anchors_one_confirmed
        ON anchors(certificate_id) WHERE status = 'confirmed';
    CREATE UNIQUE INDEX IF NOT EXISTS anchors_one_live
        ON anchors(certificate_id) WHERE status != 'failed';

    CREATE TABLE IF NOT EXISTS partners (
        id                     TEXT PRIMARY KEY,
        name                   TEXT NOT NULL UNIQUE,
        contact_email          TEXT NOT NULL,
        api_endpoint           TEXT NOT NULL,
        webhook_url            TEXT,
        status                 TEXT NOT NULL,
        certification_level    TEXT NOT NULL,
        auto_delivery          INTEGER NOT NULL DEFAULT 0,
        certificates_delivered INTEGER NOT NULL DEFAULT 0,
        last_delivery          TEXT,
        sealed_api_key         BLOB,
        created_at             TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS deliveries (
        id              TEXT PRIMARY KEY,
        certificate_id  TEXT NOT NULL REFERENCES certificates(id),
        partner_id      TEXT NOT NULL REFERENCES partners(id),
        partner_name    TEXT NOT NULL,
        method          TEXT NOT NULL,
        status          TEXT NOT NULL,
        retry_count     INTEGER NOT NULL DEFAULT 0,
        max_retries     INTEGER NOT NULL,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL,
        next_attempt_at TEXT,
        delivered_at    TEXT,
        last_error      TEXT,
        error_class     TEXT,
        error_history   TEXT NOT NULL DEFAULT '[]',
        UNIQUE (certificate_id, partner_id)
    );
"#;

/// The TrustWipe registry.
///
/// All methods are synchronous because `rusqlite` is. Async callers should
/// hold the registry behind a mutex and never across an `.await`.
pub struct Registry {
    conn: Connection,
}

impl Registry {
    /// Open (or create) the registry at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| db_err("open", e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| db_err("WAL pragma", e))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| db_err("open in-memory", e))?;
        debug!("in-memory registry opened");
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| db_err("foreign_keys pragma", e))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| db_err("create schema", e))?;
        info!("registry ready");
        Ok(Self { conn })
    }
}

// ---------------------------------------------------------------------------
// Column helpers shared by the entity modules
// ---------------------------------------------------------------------------

pub(crate) fn db_err(context: &str, e: rusqlite::Error) -> TrustwipeError {
    TrustwipeError::Database(format!("{context}: {e}"))
}

/// Whether `e` is a UNIQUE or trigger constraint violation.
pub(crate) fn is_constraint(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339()
}

pub(crate) fn opt_ts(at: &Option<DateTime<Utc>>) -> Option<String> {
    at.as_ref().map(ts)
}

pub(crate) fn get_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

pub(crate) fn get_opt_ts(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

/// Read a keyword column into any enum with a `FromStr` impl.
pub(crate) fn get_kw<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = TrustwipeError>,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion_err(idx, e))
}

pub(crate) fn get_opt_kw<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = TrustwipeError>,
{
    let s: Option<String> = row.get(idx)?;
    s.map(|s| s.parse().map_err(|e| conversion_err(idx, e)))
        .transpose()
}

pub(crate) fn get_uuid(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<uuid::Uuid> {
    let s: String = row.get(idx)?;
    uuid::Uuid::parse_str(&s).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn get_json<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conversion_err(idx, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopening_a_file_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        drop(Registry::open(&path).unwrap());
        let registry = Registry::open(&path).unwrap();
        assert!(registry.list_assets(&Default::default()).unwrap().is_empty());
    }
}
