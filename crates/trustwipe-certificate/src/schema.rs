// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certificate schema (`https://example.org/securewipe/v1`).
//
// The signed content is the compact serde_json encoding of
// `SanitizationCertificate`. Field order is fixed by the struct definitions,
// and unknown fields are rejected on parse, so re-encoding a parsed
// certificate reproduces the signed bytes exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::types::{
    CertificateId, DriveType, NistCategory, SanitizationMethod, VerificationSummary,
};
use trustwipe_security::{hash_bytes, verify_signature};

pub const SCHEMA_URL: &str = "https://example.org/securewipe/v1";

/// The sanitized drive as described on the certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceInfo {
    pub model: String,
    pub serial: String,
    #[serde(rename = "type")]
    pub drive_type: DriveType,
    pub capacity_bytes: u64,
    /// Vendor label, e.g. "2TB".
    pub capacity_label: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningInfo {
    pub sig_alg: String,
    /// File name of the detached signature, `<certificate_id>.json.sig`.
    pub detached_signature: String,
    pub signer_fingerprint: String,
    /// Signed by the station's own CA key. Always true for certificates
    /// issued here, as there is no external CA chain; verifiers decide trust
    /// from their trust store, not from this flag.
    pub ca_verified: bool,
    /// Countersigned by a timestamp authority. Always false until a TSA is
    /// configured.
    pub timestamp_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplianceInfo {
    pub nist_sp_800_88: String,
    pub iso_iec_27040: String,
    pub method_rationale: String,
}

/// Proof that one drive was sanitized. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SanitizationCertificate {
    pub schema: String,
    pub certificate_id: CertificateId,
    pub asset_tag: String,
    pub device: DeviceInfo,
    pub nist_category: NistCategory,
    /// Human-readable technique, e.g. "NVMe Sanitize (Block Erase)".
    pub algorithm: String,
    pub method: SanitizationMethod,
    pub hpa_dco_removed: bool,
    pub start_time_utc: DateTime<Utc>,
    pub end_time_utc: DateTime<Utc>,
    pub verification: VerificationSummary,
    pub run_log_sha256: String,
    pub signing: SigningInfo,
    pub compliance: ComplianceInfo,
    pub operator: Option<String>,
    pub issued_at: DateTime<Utc>,
    /// The certificate this one amends.
    pub supersedes: Option<CertificateId>,
    pub amendment_reason: Option<String>,
}

impl SanitizationCertificate {
    /// Compact JSON encoding covered by the signature.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Wall-clock duration of the wipe, formatted as `"2m 42s"`.
    pub fn duration_label(&self) -> String {
        let secs = (self.end_time_utc - self.start_time_utc).num_seconds().max(0);
        format!("{}m {}s", secs / 60, secs % 60)
    }

    /// One-line device description, e.g. "Samsung 980 Pro 2TB NVMe".
    pub fn device_label(&self) -> String {
        format!(
            "{} {} {}",
            self.device.model, self.device.capacity_label, self.device.drive_type
        )
    }
}

/// Contents of the `<id>.json.sig` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedSignature {
    pub sig_alg: String,
    /// Hex-encoded uncompressed P-256 point.
    pub signer_public_key: String,
    /// Hex-encoded ASN.1 DER signature.
    pub signature: String,
}

/// A certificate together with its detached signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCertificate {
    pub certificate: SanitizationCertificate,
    pub signature: DetachedSignature,
}

impl SignedCertificate {
    pub fn id(&self) -> &CertificateId {
        &self.certificate.certificate_id
    }

    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        self.certificate.canonical_bytes()
    }

    /// SHA-256 of the canonical body. This is the value anchored on the
    /// ledger.
    pub fn content_hash(&self) -> Result<String> {
        Ok(hash_bytes(&self.canonical_bytes()?))
    }

    /// Check the signature against the embedded public key. Whether that key
    /// is trusted is a separate question for the trust store.
    pub fn verify_signature(&self) -> Result<()> {
        if self.signature.sig_alg != self.certificate.signing.sig_alg {
            return Err(TrustwipeError::SignatureInvalid(format!(
                "signature algorithm {} does not match certificate ({})",
                self.signature.sig_alg, self.certificate.signing.sig_alg
            )));
        }
        verify_signature(
            &self.signature.signer_public_key,
            &self.canonical_bytes()?,
            &self.signature.signature,
        )
    }
}
