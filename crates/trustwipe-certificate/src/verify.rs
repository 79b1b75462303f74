// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Verification of uploaded certificates.
//
// Checks, in order: file name, parse, signature over the canonical body,
// signer fingerprint, trust store membership, and the compliance rules that
// applied at issuance. Anything that fails lands in the error branch of the
// report; soft findings downgrade success to a warning.

use serde::Serialize;
use tracing::{info, instrument, warn};
use trustwipe_core::compliance::{check_method, check_verification};
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::human_errors::humanize_error;
use trustwipe_core::types::{CertificateId, DriveType};
use trustwipe_security::signing::fingerprint_hex;
use trustwipe_security::{SIG_ALG, TrustStore};

use crate::schema::{DetachedSignature, SCHEMA_URL, SanitizationCertificate, SignedCertificate};

pub const SUCCESS_MESSAGE: &str =
    "Certificate verified successfully. NIST SP 800-88 compliant sanitization confirmed.";
pub const WARNING_MESSAGE: &str = "Certificate signature is valid, but it needs review.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
    Warning,
}

/// Summary shown for a certificate that passed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportDetails {
    pub certificate_id: CertificateId,
    pub device: String,
    pub method: String,
    pub timestamp: String,
    pub verified_by: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub status: ReportStatus,
    pub message: String,
    pub details: Option<ReportDetails>,
    /// Warnings on success, or the technical cause on error.
    pub notes: Vec<String>,
}

impl VerificationReport {
    fn error(err: &TrustwipeError) -> Self {
        Self {
            status: ReportStatus::Error,
            message: humanize_error(err).message,
            details: None,
            notes: vec![err.to_string()],
        }
    }

    /// Add a finding. A successful report becomes a warning; an error stays
    /// an error.
    pub fn warn(&mut self, note: impl Into<String>) {
        if self.status == ReportStatus::Success {
            self.status = ReportStatus::Warning;
            self.message = WARNING_MESSAGE.to_owned();
        }
        self.notes.push(note.into());
    }

    pub fn is_error(&self) -> bool {
        self.status == ReportStatus::Error
    }
}

/// A certificate whose signature and issuer checked out.
#[derive(Debug, Clone)]
pub struct VerifiedCertificate {
    pub signed: SignedCertificate,
    /// Trust store name of the signing key.
    pub issuer: String,
    pub warnings: Vec<String>,
}

/// Upload file names must mention `.json` or `cert`.
pub fn accepts_file_name(file_name: &str) -> bool {
    file_name.contains(".json") || file_name.contains("cert")
}

/// Verify an uploaded file and report the outcome. Never fails: every
/// problem becomes an error report.
#[instrument(skip(contents, signature, trust), fields(len = contents.len()))]
pub fn verify_upload(
    file_name: &str,
    contents: &[u8],
    signature: Option<&[u8]>,
    trust: &TrustStore,
) -> VerificationReport {
    if !accepts_file_name(file_name) {
        let err = TrustwipeError::UnsupportedFormat(file_name.to_owned());
        warn!(%file_name, "upload rejected by file name");
        return VerificationReport::error(&err);
    }

    match verify_certificate(contents, signature, trust) {
        Ok(verified) => {
            let cert = &verified.signed.certificate;
            let content_hash = match verified.signed.content_hash() {
                Ok(h) => h,
                Err(e) => return VerificationReport::error(&e),
            };
            let mut report = VerificationReport {
                status: ReportStatus::Success,
                message: SUCCESS_MESSAGE.to_owned(),
                details: Some(ReportDetails {
                    certificate_id: cert.certificate_id.clone(),
                    device: cert.device_label(),
                    method: format!("{} ({})", cert.algorithm, cert.nist_category),
                    timestamp: cert.end_time_utc.to_rfc3339(),
                    verified_by: verified.issuer.clone(),
                    content_hash,
                }),
                notes: Vec::new(),
            };
            for w in verified.warnings {
                report.warn(w);
            }
            report
        }
        Err(e) => {
            warn!(%file_name, error = %e, "certificate verification failed");
            VerificationReport::error(&e)
        }
    }
}

/// Parse and fully verify a certificate.
///
/// `contents` is either a bundle (`{certificate, signature}`) or a bare
/// certificate, in which case `signature` must hold the `.sig` file.
pub fn verify_certificate(
    contents: &[u8],
    signature: Option<&[u8]>,
    trust: &TrustStore,
) -> Result<VerifiedCertificate> {
    let signed = parse(contents, signature)?;
    let cert = &signed.certificate;

    if signed.signature.sig_alg != SIG_ALG {
        return Err(TrustwipeError::SignatureInvalid(format!(
            "unsupported signature algorithm {}",
            signed.signature.sig_alg
        )));
    }
    signed.verify_signature()?;

    let fingerprint = fingerprint_hex(&signed.signature.signer_public_key)?;
    if fingerprint != cert.signing.signer_fingerprint {
        return Err(TrustwipeError::SignatureInvalid(format!(
            "signed by {fingerprint}, certificate names {}",
            cert.signing.signer_fingerprint
        )));
    }
    let issuer = trust
        .lookup(&signed.signature.signer_public_key)
        .ok_or_else(|| TrustwipeError::UntrustedSigner(fingerprint.clone()))?
        .name
        .clone();

    check_rules(cert)?;

    let mut warnings = Vec::new();
    if cert.device.drive_type == DriveType::Hdd && !cert.hpa_dco_removed {
        warnings.push("HPA/DCO areas were not removed before sanitizing this HDD".to_owned());
    }
    if !cert.signing.timestamp_verified {
        info!(certificate = %cert.certificate_id, "no timestamp authority countersignature");
    }

    info!(certificate = %cert.certificate_id, %issuer, "certificate verified");
    Ok(VerifiedCertificate {
        signed,
        issuer,
        warnings,
    })
}

fn parse(contents: &[u8], signature: Option<&[u8]>) -> Result<SignedCertificate> {
    if let Ok(bundle) = serde_json::from_slice::<SignedCertificate>(contents) {
        return Ok(bundle);
    }
    let certificate: SanitizationCertificate = serde_json::from_slice(contents)?;
    let signature = signature.ok_or_else(|| {
        TrustwipeError::SignatureInvalid(format!(
            "no detached signature supplied (expected {})",
            certificate.signing.detached_signature
        ))
    })?;
    let signature: DetachedSignature = serde_json::from_slice(signature)?;
    Ok(SignedCertificate {
        certificate,
        signature,
    })
}

/// The issuance rules, re-applied to what the certificate claims.
fn check_rules(cert: &SanitizationCertificate) -> Result<()> {
    if cert.schema != SCHEMA_URL {
        return Err(TrustwipeError::UnsupportedFormat(format!("schema {}", cert.schema)));
    }
    if cert.method.nist_category() != cert.nist_category {
        return Err(TrustwipeError::ComplianceViolation(format!(
            "{} is {}, certificate claims {}",
            cert.algorithm,
            cert.method.nist_category(),
            cert.nist_category
        )));
    }
    if cert.end_time_utc <= cert.start_time_utc {
        return Err(TrustwipeError::Validation("wipe ends before it starts".into()));
    }
    check_method(cert.device.drive_type, cert.method)?;
    check_verification(cert.nist_category, &cert.verification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::issue_certificate;
    use crate::issue::tests::{sample_run, wiped_asset};
    use trustwipe_core::types::SanitizationMethod;
    use trustwipe_security::CertificateSigner;

    fn setup() -> (SignedCertificate, TrustStore) {
        let signer = CertificateSigner::generate().unwrap();
        let (asset, drive_id) = wiped_asset(SanitizationMethod::NvmeSanitizeBlockErase);
        let signed = issue_certificate(&asset, drive_id, &sample_run(), &signer, None).unwrap();
        let mut trust = TrustStore::default();
        trust.add("SecureWipe CA v2.1", &signer.public_key_hex()).unwrap();
        (signed, trust)
    }

    fn files(signed: &SignedCertificate) -> (Vec<u8>, Vec<u8>) {
        (
            serde_json::to_vec_pretty(&signed.certificate).unwrap(),
            serde_json::to_vec(&signed.signature).unwrap(),
        )
    }

    #[test]
    fn file_name_gate() {
        assert!(accepts_file_name("swc-2025-09-08-ABC123.json"));
        assert!(accepts_file_name("certificate.p7s"));
        assert!(!accepts_file_name("report.pdf"));
        assert!(!accepts_file_name("notes.txt"));
    }

    #[test]
    fn rejected_names_always_error() {
        let (signed, trust) = setup();
        let (body, sig) = files(&signed);
        for name in ["report.pdf", "wipe.log", "JSON.TXT", ""] {
            let report = verify_upload(name, &body, Some(&sig), &trust);
            assert_eq!(report.status, ReportStatus::Error, "{name}");
            assert_eq!(
                report.message,
                "Invalid certificate format. Expected JSON or P7S file."
            );
        }
    }

    #[test]
    fn genuine_certificate_verifies() {
        let (signed, trust) = setup();
        let (body, sig) = files(&signed);
        let report = verify_upload("swc.json", &body, Some(&sig), &trust);
        assert_eq!(report.status, ReportStatus::Success, "{:?}", report.notes);
        assert_eq!(report.message, SUCCESS_MESSAGE);
        let details = report.details.unwrap();
        assert_eq!(details.verified_by, "SecureWipe CA v2.1");
        assert_eq!(details.device, "Samsung 980 Pro 2TB NVMe");
        assert_eq!(details.method, "NVMe Sanitize (Block Erase) (Purge)");
        assert_eq!(details.content_hash, signed.content_hash().unwrap());
    }

    #[test]
    fn bundle_needs_no_separate_signature() {
        let (signed, trust) = setup();
        let bundle = serde_json::to_vec(&signed).unwrap();
        let report = verify_upload("bundle.json", &bundle, None, &trust);
        assert_eq!(report.status, ReportStatus::Success);
    }

    #[test]
    fn tampered_body_fails() {
        let (signed, trust) = setup();
        let (_, sig) = files(&signed);
        let mut cert = signed.certificate.clone();
        cert.verification.percent = 50;
        let body = serde_json::to_vec(&cert).unwrap();
        let report = verify_upload("cert.json", &body, Some(&sig), &trust);
        assert!(report.is_error());
        assert_eq!(
            report.message,
            "Signature verification failed. Certificate may be tampered with."
        );
    }

    #[test]
    fn extra_field_fails() {
        let (signed, trust) = setup();
        let (_, sig) = files(&signed);
        let mut value = serde_json::to_value(&signed.certificate).unwrap();
        value["note"] = serde_json::json!("added later");
        let body = serde_json::to_vec(&value).unwrap();
        assert!(verify_upload("cert.json", &body, Some(&sig), &trust).is_error());
    }

    #[test]
    fn untrusted_signer_fails() {
        let (signed, _) = setup();
        let (body, sig) = files(&signed);
        let err = verify_certificate(&body, Some(&sig), &TrustStore::default()).unwrap_err();
        assert!(matches!(err, TrustwipeError::UntrustedSigner(_)));
    }

    #[test]
    fn missing_signature_fails() {
        let (signed, trust) = setup();
        let (body, _) = files(&signed);
        assert!(matches!(
            verify_certificate(&body, None, &trust),
            Err(TrustwipeError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn warning_keeps_details() {
        let (signed, trust) = setup();
        let (body, sig) = files(&signed);
        let mut report = verify_upload("cert.json", &body, Some(&sig), &trust);
        report.warn("superseded by swc-2025-09-09-DEF456");
        assert_eq!(report.status, ReportStatus::Warning);
        assert!(report.details.is_some());
    }
}
