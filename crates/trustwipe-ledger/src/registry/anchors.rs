// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Anchor records: the ledger transactions that carry a certificate's
// content hash. No chain client lives here; transaction hashes and block
// numbers are reported by whoever submitted the transaction.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;
use tracing::{info, instrument, warn};
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::inventory::record_matches;
use trustwipe_core::types::{AnchorStatus, BlockchainRecord, CertificateId};

use super::{
    Registry, StoredCertificate, db_err, get_json, get_kw, get_opt_ts, get_ts, is_constraint,
    opt_ts, ts,
};

const ANCHOR_COLUMNS: &str = "certificate_id, transaction_hash, cert_hash, network, block_number,
    gas_used, status, submitted_at, resolved_at, failure_reason, metadata";

/// Outcome of checking a certificate against its anchor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchorVerification {
    pub certificate_id: CertificateId,
    /// Content hash recomputed from the stored certificate.
    pub computed_hash: String,
    pub record: Option<BlockchainRecord>,
    pub hash_matches: bool,
    pub confirmations: u64,
    pub valid: bool,
    /// Why `valid` is false.
    pub reason: Option<String>,
}

impl Registry {
    /// Record a submitted anchor transaction.
    ///
    /// The anchored hash must be the stored certificate's content hash, and
    /// a certificate may only have one pending or confirmed anchor at a time.
    #[instrument(skip(self, record), fields(certificate = %record.certificate_id, tx = %record.transaction_hash))]
    pub fn submit_anchor(&self, record: &BlockchainRecord) -> Result<()> {
        let stored = self.certificate(&record.certificate_id)?;
        if !stored.content_hash.eq_ignore_ascii_case(&record.cert_hash) {
            return Err(TrustwipeError::IntegrityMismatch {
                expected: stored.content_hash,
                actual: record.cert_hash.clone(),
            });
        }
        if let Some(live) = self.live_anchor(&record.certificate_id)? {
            return Err(TrustwipeError::AnchorConflict {
                certificate_id: record.certificate_id.to_string(),
                status: live.status.to_string(),
            });
        }

        self.conn
            .execute(
                &format!(
                    "INSERT INTO anchors ({ANCHOR_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    record.certificate_id.as_str(),
                    record.transaction_hash,
                    record.cert_hash.to_ascii_lowercase(),
                    record.network,
                    record.block_number.map(|b| b as i64),
                    record.gas_used.map(|g| g as i64),
                    record.status.as_str(),
                    ts(&record.submitted_at),
                    opt_ts(&record.resolved_at),
                    record.failure_reason,
                    serde_json::to_string(&record.metadata)?,
                ],
            )
            .map_err(|e| {
                if is_constraint(&e) {
                    TrustwipeError::Duplicate {
                        kind: "anchor transaction",
                        id: record.transaction_hash.clone(),
                    }
                } else {
                    db_err("insert anchor", e)
                }
            })?;

        info!(network = %record.network, "anchor submitted");
        Ok(())
    }

    /// Mark the anchor with `tx_hash` as included in `block_number`.
    #[instrument(skip(self))]
    pub fn confirm_anchor(
        &self,
        tx_hash: &str,
        block_number: u64,
        gas_used: u64,
        at: DateTime<Utc>,
    ) -> Result<BlockchainRecord> {
        let mut record = self.anchor_by_tx(tx_hash)?;
        record.confirm(block_number, gas_used, at)?;
        self.write_resolution(&record).map_err(|e| match e {
            TrustwipeError::Duplicate { .. } => TrustwipeError::AnchorConflict {
                certificate_id: record.certificate_id.to_string(),
                status: AnchorStatus::Confirmed.to_string(),
            },
            other => other,
        })?;
        info!(block = block_number, "anchor confirmed");
        Ok(record)
    }

    /// Mark the anchor with `tx_hash` as failed. The certificate may then be
    /// anchored again.
    #[instrument(skip(self, reason))]
    pub fn fail_anchor(
        &self,
        tx_hash: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<BlockchainRecord> {
        let mut record = self.anchor_by_tx(tx_hash)?;
        record.fail(reason, at)?;
        self.write_resolution(&record)?;
        warn!(reason, "anchor failed");
        Ok(record)
    }

    /// Fail every pending anchor submitted more than `timeout` before `now`.
    /// Returns the records that were expired.
    #[instrument(skip(self))]
    pub fn expire_pending(
        &self,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<BlockchainRecord>> {
        let pending = self.query_anchors(
            &format!("SELECT {ANCHOR_COLUMNS} FROM anchors WHERE status = ?1 ORDER BY id ASC"),
            params![AnchorStatus::Pending.as_str()],
        )?;

        let mut expired = Vec::new();
        for mut record in pending {
            if record.submitted_at + timeout > now {
                continue;
            }
            record.fail(
                format!("not confirmed within {} minutes", timeout.num_minutes()),
                now,
            )?;
            self.write_resolution(&record)?;
            warn!(certificate = %record.certificate_id, tx = %record.transaction_hash, "pending anchor expired");
            expired.push(record);
        }
        Ok(expired)
    }

    /// Find an anchor by transaction hash, certificate ID, or anchored
    /// content hash. For a certificate with several records the live one
    /// wins, otherwise the most recent.
    pub fn lookup_anchor(&self, query: &str) -> Result<Option<BlockchainRecord>> {
        let query = query.trim();
        let lower = query.to_ascii_lowercase();
        self.conn
            .query_row(
                &format!(
                    "SELECT {ANCHOR_COLUMNS} FROM anchors
                     WHERE transaction_hash = ?1 OR cert_hash = ?1 OR certificate_id = ?2
                     ORDER BY (status = 'failed') ASC, id DESC
                     LIMIT 1"
                ),
                params![lower, query],
                row_to_record,
            )
            .optional()
            .map_err(|e| db_err("lookup anchor", e))
    }

    /// Pending or confirmed anchor for `certificate_id`.
    pub fn live_anchor(&self, certificate_id: &CertificateId) -> Result<Option<BlockchainRecord>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ANCHOR_COLUMNS} FROM anchors
                     WHERE certificate_id = ?1 AND status != 'failed'"
                ),
                params![certificate_id.as_str()],
                row_to_record,
            )
            .optional()
            .map_err(|e| db_err("get live anchor", e))
    }

    pub fn confirmed_anchor(
        &self,
        certificate_id: &CertificateId,
    ) -> Result<Option<BlockchainRecord>> {
        Ok(self
            .live_anchor(certificate_id)?
            .filter(|r| r.status == AnchorStatus::Confirmed))
    }

    /// Every anchor record for a certificate, oldest first.
    pub fn anchors_for_certificate(
        &self,
        certificate_id: &CertificateId,
    ) -> Result<Vec<BlockchainRecord>> {
        self.query_anchors(
            &format!(
                "SELECT {ANCHOR_COLUMNS} FROM anchors WHERE certificate_id = ?1 ORDER BY id ASC"
            ),
            params![certificate_id.as_str()],
        )
    }

    /// Records matching `term` by certificate ID, transaction hash, or
    /// device model, newest first. An empty term lists everything.
    pub fn search_anchors(&self, term: &str) -> Result<Vec<BlockchainRecord>> {
        let all = self.query_anchors(
            &format!("SELECT {ANCHOR_COLUMNS} FROM anchors ORDER BY id DESC"),
            [],
        )?;
        Ok(all.into_iter().filter(|r| record_matches(r, term)).collect())
    }

    /// Check a stored certificate against the chain record.
    ///
    /// Valid only when a confirmed record exists, its anchored hash equals
    /// the recomputed content hash, and it is at least `min_confirmations`
    /// deep at `current_block`.
    #[instrument(skip(self, stored), fields(certificate = %stored.id()))]
    pub fn verify_anchor(
        &self,
        stored: &StoredCertificate,
        current_block: u64,
        min_confirmations: u64,
    ) -> Result<AnchorVerification> {
        let computed_hash = stored.signed.content_hash()?;
        let record = self.confirmed_anchor(stored.id())?;

        let (hash_matches, confirmations, reason) = match &record {
            None => (false, 0, Some("no confirmed anchor for this certificate".to_owned())),
            Some(r) => {
                let matches = r.cert_hash.eq_ignore_ascii_case(&computed_hash);
                let confirmations = r.confirmations(current_block);
                let reason = if !matches {
                    Some(format!(
                        "anchored hash {} does not match certificate hash {computed_hash}",
                        r.cert_hash
                    ))
                } else if confirmations < min_confirmations {
                    Some(format!(
                        "{confirmations} confirmations, {min_confirmations} required"
                    ))
                } else {
                    None
                };
                (matches, confirmations, reason)
            }
        };

        let valid = reason.is_none();
        info!(valid, confirmations, "anchor verified");
        Ok(AnchorVerification {
            certificate_id: stored.id().clone(),
            computed_hash,
            record,
            hash_matches,
            confirmations,
            valid,
            reason,
        })
    }

    fn anchor_by_tx(&self, tx_hash: &str) -> Result<BlockchainRecord> {
        let tx_hash = tx_hash.trim().to_ascii_lowercase();
        self.conn
            .query_row(
                &format!("SELECT {ANCHOR_COLUMNS} FROM anchors WHERE transaction_hash = ?1"),
                params![tx_hash],
                row_to_record,
            )
            .optional()
            .map_err(|e| db_err("get anchor", e))?
            .ok_or_else(|| TrustwipeError::NotFound {
                kind: "anchor",
                id: tx_hash.clone(),
            })
    }

    fn write_resolution(&self, record: &BlockchainRecord) -> Result<()> {
        self.conn
            .execute(
                "UPDATE anchors SET status = ?1, block_number = ?2, gas_used = ?3,
                    resolved_at = ?4, failure_reason = ?5
                 WHERE transaction_hash = ?6",
                params![
                    record.status.as_str(),
                    record.block_number.map(|b| b as i64),
                    record.gas_used.map(|g| g as i64),
                    opt_ts(&record.resolved_at),
                    record.failure_reason,
                    record.transaction_hash,
                ],
            )
            .map_err(|e| {
                if is_constraint(&e) {
                    TrustwipeError::Duplicate {
                        kind: "anchor",
                        id: record.certificate_id.to_string(),
                    }
                } else {
                    db_err("update anchor", e)
                }
            })?;
        Ok(())
    }

    fn query_anchors(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<BlockchainRecord>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| db_err("prepare anchors", e))?;
        stmt.query_map(params, row_to_record)
            .map_err(|e| db_err("query anchors", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("collect anchors", e))
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<BlockchainRecord> {
    Ok(BlockchainRecord {
        certificate_id: CertificateId(row.get(0)?),
        transaction_hash: row.get(1)?,
        cert_hash: row.get(2)?,
        network: row.get(3)?,
        block_number: row.get::<_, Option<i64>>(4)?.map(|b| b as u64),
        gas_used: row.get::<_, Option<i64>>(5)?.map(|g| g as u64),
        status: get_kw(row, 6)?,
        submitted_at: get_ts(row, 7)?,
        resolved_at: get_opt_ts(row, 8)?,
        failure_reason: row.get(9)?,
        metadata: get_json(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use trustwipe_certificate::SignedCertificate;
    use trustwipe_core::types::AnchorMetadata;
    use trustwipe_security::CertificateSigner;

    use super::*;
    use crate::test_support::certified;

    fn tx(n: u8) -> String {
        format!("0x{}", format!("{n:02x}").repeat(32))
    }

    fn pending_for(signed: &SignedCertificate, tx_hash: &str, at: DateTime<Utc>) -> BlockchainRecord {
        BlockchainRecord::pending(
            signed.id().clone(),
            tx_hash,
            signed.content_hash().unwrap(),
            "Ethereum Sepolia",
            AnchorMetadata {
                device_model: "Samsung 980 Pro".into(),
                method: "NVMe Sanitize".into(),
                operator: Some("J. Smith".into()),
            },
            at,
        )
        .unwrap()
    }

    #[test]
    fn submit_confirm_verify() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (_, signed) = certified(&registry, &signer, "LT-002-2025");

        registry.submit_anchor(&pending_for(&signed, &tx(0xab), Utc::now())).unwrap();
        let confirmed = registry
            .confirm_anchor(&tx(0xab).to_uppercase().replace("0X", "0x"), 18_234_567, 21_000, Utc::now())
            .unwrap();
        assert_eq!(confirmed.status, AnchorStatus::Confirmed);

        let stored = registry.certificate(signed.id()).unwrap();
        let check = registry.verify_anchor(&stored, 18_234_578, 12).unwrap();
        assert!(check.valid, "{:?}", check.reason);
        assert_eq!(check.confirmations, 12);

        let shallow = registry.verify_anchor(&stored, 18_234_570, 12).unwrap();
        assert!(!shallow.valid);
        assert!(shallow.hash_matches);
    }

    #[test]
    fn one_live_anchor_per_certificate() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (_, signed) = certified(&registry, &signer, "LT-002-2025");

        registry.submit_anchor(&pending_for(&signed, &tx(1), Utc::now())).unwrap();
        assert!(matches!(
            registry.submit_anchor(&pending_for(&signed, &tx(2), Utc::now())),
            Err(TrustwipeError::AnchorConflict { .. })
        ));

        registry.fail_anchor(&tx(1), "reverted", Utc::now()).unwrap();
        registry.submit_anchor(&pending_for(&signed, &tx(2), Utc::now())).unwrap();
        registry.confirm_anchor(&tx(2), 100, 21_000, Utc::now()).unwrap();
        assert!(matches!(
            registry.submit_anchor(&pending_for(&signed, &tx(3), Utc::now())),
            Err(TrustwipeError::AnchorConflict { .. })
        ));
        assert_eq!(registry.anchors_for_certificate(signed.id()).unwrap().len(), 2);
    }

    #[test]
    fn schema_blocks_a_second_confirmed_record() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (_, signed) = certified(&registry, &signer, "LT-002-2025");

        let mut first = pending_for(&signed, &tx(1), Utc::now());
        first.confirm(10, 21_000, Utc::now()).unwrap();
        registry.submit_anchor(&first).unwrap();

        // Bypass the live-anchor check to exercise the partial index.
        let res = registry.conn.execute(
            "INSERT INTO anchors (certificate_id, transaction_hash, cert_hash, network, status,
                submitted_at, metadata)
             VALUES (?1, ?2, ?3, 'x', 'confirmed', ?4, '{}')",
            params![signed.id().as_str(), tx(2), first.cert_hash, ts(&Utc::now())],
        );
        assert!(res.is_err());
    }

    #[test]
    fn wrong_hash_rejected() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (_, signed) = certified(&registry, &signer, "LT-002-2025");

        let mut record = pending_for(&signed, &tx(1), Utc::now());
        record.cert_hash = "0".repeat(64);
        assert!(matches!(
            registry.submit_anchor(&record),
            Err(TrustwipeError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn stale_pending_expires() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (_, old) = certified(&registry, &signer, "LT-002-2025");
        let (_, fresh) = certified(&registry, &signer, "LT-003-2025");
        let now = Utc::now();

        registry
            .submit_anchor(&pending_for(&old, &tx(1), now - Duration::minutes(90)))
            .unwrap();
        registry
            .submit_anchor(&pending_for(&fresh, &tx(2), now - Duration::minutes(5)))
            .unwrap();

        let expired = registry.expire_pending(Duration::minutes(60), now).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(&expired[0].certificate_id, old.id());
        assert_eq!(expired[0].status, AnchorStatus::Failed);
        assert!(registry.live_anchor(old.id()).unwrap().is_none());
        assert!(registry.live_anchor(fresh.id()).unwrap().is_some());
    }

    #[test]
    fn lookup_and_search() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (_, signed) = certified(&registry, &signer, "LT-002-2025");
        registry.submit_anchor(&pending_for(&signed, &tx(7), Utc::now())).unwrap();

        let by_cert = registry.lookup_anchor(signed.id().as_str()).unwrap().unwrap();
        let by_tx = registry.lookup_anchor(&tx(7)).unwrap().unwrap();
        let by_hash = registry
            .lookup_anchor(&signed.content_hash().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(by_cert, by_tx);
        assert_eq!(by_tx, by_hash);
        assert!(registry.lookup_anchor("swc-1999-01-01-NOPE00").unwrap().is_none());

        assert_eq!(registry.search_anchors("samsung").unwrap().len(), 1);
        assert_eq!(registry.search_anchors("").unwrap().len(), 1);
        assert!(registry.search_anchors("toshiba").unwrap().is_empty());
    }

    #[test]
    fn verify_without_anchor_is_invalid() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (_, signed) = certified(&registry, &signer, "LT-002-2025");
        let stored = registry.certificate(signed.id()).unwrap();

        let check = registry.verify_anchor(&stored, 1_000, 1).unwrap();
        assert!(!check.valid);
        assert!(check.record.is_none());
    }
}
