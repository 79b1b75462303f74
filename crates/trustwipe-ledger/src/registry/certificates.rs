// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Issued certificates. Rows are insert-only; corrections are new rows that
// point back at the certificate they supersede.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use tracing::{info, instrument};
use trustwipe_certificate::SignedCertificate;
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::types::CertificateId;

use super::{Registry, db_err, get_json, get_ts, is_constraint, ts};

/// A certificate as stored, with the row metadata the registry derives.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCertificate {
    pub signed: SignedCertificate,
    pub content_hash: String,
    pub issued_at: DateTime<Utc>,
    /// Set when a later amendment replaced this certificate.
    pub superseded_by: Option<CertificateId>,
}

impl StoredCertificate {
    pub fn id(&self) -> &CertificateId {
        self.signed.id()
    }

    pub fn is_current(&self) -> bool {
        self.superseded_by.is_none()
    }
}

const CERT_SELECT: &str = "SELECT c.bundle, c.content_hash, c.issued_at,
        (SELECT n.id FROM certificates n WHERE n.supersedes = c.id)
     FROM certificates c";

impl Registry {
    /// Store a signed certificate. An amendment must point at an existing
    /// certificate that nothing else has superseded yet; anything else must be
    /// the drive's first certificate.
    #[instrument(skip(self, signed), fields(certificate = %signed.id()))]
    pub fn insert_certificate(&self, signed: &SignedCertificate) -> Result<()> {
        let cert = &signed.certificate;
        if self.find_certificate(&cert.certificate_id)?.is_some() {
            return Err(TrustwipeError::Duplicate {
                kind: "certificate",
                id: cert.certificate_id.to_string(),
            });
        }
        if let Some(previous) = &cert.supersedes {
            if self.find_certificate(previous)?.is_none() {
                return Err(TrustwipeError::NotFound {
                    kind: "certificate",
                    id: previous.to_string(),
                });
            }
            if self.superseded_by(previous)?.is_some() {
                return Err(TrustwipeError::AlreadySuperseded(previous.to_string()));
            }
        } else if let Some(current) =
            self.current_certificate_for_drive(&cert.asset_tag, &cert.device.serial)?
        {
            return Err(TrustwipeError::AlreadyCertified {
                asset_tag: cert.asset_tag.clone(),
                serial: cert.device.serial.clone(),
                current: current.id().to_string(),
            });
        }

        let content_hash = signed.content_hash()?;
        let bundle = serde_json::to_string(signed)?;
        self.conn
            .execute(
                "INSERT INTO certificates (id, asset_tag, drive_serial, content_hash, supersedes,
                    issued_at, bundle)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    cert.certificate_id.as_str(),
                    cert.asset_tag,
                    cert.device.serial,
                    content_hash,
                    cert.supersedes.as_ref().map(|p| p.as_str()),
                    ts(&cert.issued_at),
                    bundle,
                ],
            )
            .map_err(|e| {
                if is_constraint(&e) {
                    TrustwipeError::Duplicate {
                        kind: "certificate",
                        id: cert.certificate_id.to_string(),
                    }
                } else {
                    db_err("insert certificate", e)
                }
            })?;

        info!(hash = %content_hash, "certificate stored");
        Ok(())
    }

    pub fn find_certificate(&self, id: &CertificateId) -> Result<Option<StoredCertificate>> {
        self.conn
            .query_row(
                &format!("{CERT_SELECT} WHERE c.id = ?1"),
                params![id.as_str()],
                row_to_stored,
            )
            .optional()
            .map_err(|e| db_err("get certificate", e))
    }

    pub fn certificate(&self, id: &CertificateId) -> Result<StoredCertificate> {
        self.find_certificate(id)?
            .ok_or_else(|| TrustwipeError::NotFound {
                kind: "certificate",
                id: id.to_string(),
            })
    }

    /// Look a certificate up by the SHA-256 of its canonical body.
    pub fn certificate_by_hash(&self, content_hash: &str) -> Result<Option<StoredCertificate>> {
        self.conn
            .query_row(
                &format!("{CERT_SELECT} WHERE c.content_hash = ?1"),
                params![content_hash.to_ascii_lowercase()],
                row_to_stored,
            )
            .optional()
            .map_err(|e| db_err("get certificate by hash", e))
    }

    /// The amendment that replaced `id`, if any.
    pub fn superseded_by(&self, id: &CertificateId) -> Result<Option<CertificateId>> {
        self.conn
            .query_row(
                "SELECT id FROM certificates WHERE supersedes = ?1",
                params![id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map(|found| found.map(CertificateId))
            .map_err(|e| db_err("get superseding certificate", e))
    }

    /// Every certificate issued for `asset_tag`, oldest first, amendments
    /// included.
    pub fn certificates_for_asset(&self, asset_tag: &str) -> Result<Vec<StoredCertificate>> {
        self.query_certificates(
            &format!("{CERT_SELECT} WHERE c.asset_tag = ?1 ORDER BY c.issued_at ASC, c.id ASC"),
            params![asset_tag],
        )
    }

    /// The non-superseded certificate for the drive with `serial` on
    /// `asset_tag`.
    pub fn current_certificate_for_drive(
        &self,
        asset_tag: &str,
        serial: &str,
    ) -> Result<Option<StoredCertificate>> {
        Ok(self
            .certificates_for_asset(asset_tag)?
            .into_iter()
            .filter(|c| c.signed.certificate.device.serial == serial)
            .find(StoredCertificate::is_current))
    }

    /// Every certificate, newest first.
    pub fn list_certificates(&self) -> Result<Vec<StoredCertificate>> {
        self.query_certificates(
            &format!("{CERT_SELECT} ORDER BY c.issued_at DESC, c.id DESC"),
            [],
        )
    }

    fn query_certificates(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<StoredCertificate>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| db_err("prepare certificates", e))?;
        stmt.query_map(params, row_to_stored)
            .map_err(|e| db_err("query certificates", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("collect certificates", e))
    }
}

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredCertificate> {
    Ok(StoredCertificate {
        signed: get_json(row, 0)?,
        content_hash: row.get(1)?,
        issued_at: get_ts(row, 2)?,
        superseded_by: row.get::<_, Option<String>>(3)?.map(CertificateId),
    })
}

#[cfg(test)]
mod tests {
    use trustwipe_certificate::{amend_certificate, issue_certificate};
    use trustwipe_security::CertificateSigner;

    use super::*;
    use crate::test_support::{certified, sample_run};

    #[test]
    fn stores_and_loads_bundle() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (_, signed) = certified(&registry, &signer, "LT-002-2025");

        let stored = registry.certificate(signed.id()).unwrap();
        assert_eq!(stored.signed, signed);
        assert_eq!(stored.content_hash, signed.content_hash().unwrap());
        assert!(stored.is_current());
        stored.signed.verify_signature().unwrap();

        let by_hash = registry.certificate_by_hash(&stored.content_hash).unwrap().unwrap();
        assert_eq!(by_hash.id(), signed.id());
    }

    #[test]
    fn same_certificate_twice_is_duplicate() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (_, signed) = certified(&registry, &signer, "LT-002-2025");
        assert!(matches!(
            registry.insert_certificate(&signed),
            Err(TrustwipeError::Duplicate { kind: "certificate", .. })
        ));
    }

    #[test]
    fn amendment_supersedes_exactly_once() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (asset, original) = certified(&registry, &signer, "LT-002-2025");
        let drive_id = asset.drives[0].id;

        let amended = amend_certificate(
            &original.certificate,
            &asset,
            drive_id,
            &sample_run(),
            &signer,
            None,
            "serial number typo",
        )
        .unwrap();
        registry.insert_certificate(&amended).unwrap();

        assert_eq!(
            registry.superseded_by(original.id()).unwrap().as_ref(),
            Some(amended.id())
        );
        assert!(!registry.certificate(original.id()).unwrap().is_current());

        let current = registry
            .current_certificate_for_drive("LT-002-2025", "S6B2NS0R123456A")
            .unwrap()
            .unwrap();
        assert_eq!(current.id(), amended.id());
        assert_eq!(registry.certificates_for_asset("LT-002-2025").unwrap().len(), 2);

        let second = amend_certificate(
            &original.certificate,
            &asset,
            drive_id,
            &sample_run(),
            &signer,
            None,
            "another fix",
        )
        .unwrap();
        assert!(matches!(
            registry.insert_certificate(&second),
            Err(TrustwipeError::AlreadySuperseded(_))
        ));
    }

    #[test]
    fn second_unlinked_certificate_for_a_drive_is_rejected() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (asset, original) = certified(&registry, &signer, "LT-002-2025");

        let again =
            issue_certificate(&asset, asset.drives[0].id, &sample_run(), &signer, None).unwrap();
        match registry.insert_certificate(&again) {
            Err(TrustwipeError::AlreadyCertified { current, serial, .. }) => {
                assert_eq!(current, original.id().to_string());
                assert_eq!(serial, "S6B2NS0R123456A");
            }
            other => panic!("expected AlreadyCertified, got {other:?}"),
        }

        let current: Vec<_> = registry
            .certificates_for_asset("LT-002-2025")
            .unwrap()
            .into_iter()
            .filter(StoredCertificate::is_current)
            .collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id(), original.id());
    }

    #[test]
    fn schema_refuses_a_second_root_for_a_drive() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (_, original) = certified(&registry, &signer, "LT-002-2025");

        let raw = registry.conn.execute(
            "INSERT INTO certificates (id, asset_tag, drive_serial, content_hash, supersedes,
                issued_at, bundle)
             VALUES ('swc-2026-10-16-AAAAAA', 'LT-002-2025', 'S6B2NS0R123456A', 'ff', NULL,
                ?1, '{}')",
            params![ts(&original.certificate.issued_at)],
        );
        assert!(raw.is_err_and(|e| is_constraint(&e)));

        let cross_drive = registry.conn.execute(
            "INSERT INTO certificates (id, asset_tag, drive_serial, content_hash, supersedes,
                issued_at, bundle)
             VALUES ('swc-2026-10-16-BBBBBB', 'LT-002-2025', 'OTHER-SERIAL', 'ee', ?1, ?2, '{}')",
            params![original.id().as_str(), ts(&original.certificate.issued_at)],
        );
        assert!(cross_drive.is_err_and(|e| is_constraint(&e)));
    }

    #[test]
    fn rows_cannot_be_rewritten() {
        let registry = Registry::open_in_memory().unwrap();
        let signer = CertificateSigner::generate().unwrap();
        let (_, signed) = certified(&registry, &signer, "LT-002-2025");

        let update = registry.conn.execute(
            "UPDATE certificates SET asset_tag = 'X' WHERE id = ?1",
            params![signed.id().as_str()],
        );
        assert!(update.is_err());
        let delete = registry
            .conn
            .execute("DELETE FROM certificates WHERE id = ?1", params![signed.id().as_str()]);
        assert!(delete.is_err());
        assert_eq!(registry.list_certificates().unwrap().len(), 1);
    }
}
