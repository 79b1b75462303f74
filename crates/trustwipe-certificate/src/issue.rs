// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certificate issuance and amendment.
//
// A certificate can only be issued for a drive that reached `verified`, with
// a technique valid for its media and verification evidence that meets the
// NIST category's bar. Amendments never edit: they issue a fresh certificate
// that points back at the one it supersedes.

use chrono::Utc;
use tracing::{info, instrument, warn};
use trustwipe_core::compliance::{
    ISO_IEC_27040_TAG, NIST_SP_800_88_TAG, check_method, check_verification, method_rationale,
};
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::types::{
    Asset, CertificateId, Drive, DriveId, DriveStatus, DriveType, VerificationSummary,
    format_capacity,
};
use trustwipe_security::{CertificateSigner, SIG_ALG, hash_bytes};

use crate::export::signature_file_name;
use crate::schema::{
    ComplianceInfo, DetachedSignature, DeviceInfo, SCHEMA_URL, SanitizationCertificate,
    SignedCertificate, SigningInfo,
};

/// Evidence reported by the wiping station for one drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WipeRun {
    pub verification: VerificationSummary,
    pub hpa_dco_removed: bool,
    /// SHA-256 hex of the station's run log.
    pub run_log_sha256: String,
}

impl WipeRun {
    /// Build from the raw run log, hashing it.
    pub fn from_log(verification: VerificationSummary, hpa_dco_removed: bool, run_log: &[u8]) -> Self {
        Self {
            verification,
            hpa_dco_removed,
            run_log_sha256: hash_bytes(run_log),
        }
    }

    fn validate(&self) -> Result<()> {
        let h = &self.run_log_sha256;
        if h.len() != 64 || !h.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TrustwipeError::Validation(format!(
                "run log hash must be 64 hex digits, got {h:?}"
            )));
        }
        Ok(())
    }
}

/// Issue and sign a certificate for `drive_id` in `asset`.
#[instrument(skip_all, fields(asset = %asset.asset_tag, drive = %drive_id))]
pub fn issue_certificate(
    asset: &Asset,
    drive_id: DriveId,
    run: &WipeRun,
    signer: &CertificateSigner,
    operator: Option<&str>,
) -> Result<SignedCertificate> {
    build(asset, drive_id, run, signer, operator, None)
}

/// Issue a replacement for `previous`, recording why it was amended.
///
/// The registry refuses to store a second amendment of the same certificate.
#[instrument(skip_all, fields(supersedes = %previous.certificate_id))]
pub fn amend_certificate(
    previous: &SanitizationCertificate,
    asset: &Asset,
    drive_id: DriveId,
    run: &WipeRun,
    signer: &CertificateSigner,
    operator: Option<&str>,
    reason: &str,
) -> Result<SignedCertificate> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(TrustwipeError::Validation("an amendment needs a reason".into()));
    }
    let drive = find_drive(asset, drive_id)?;
    if previous.asset_tag != asset.asset_tag || previous.device.serial != drive.serial {
        return Err(TrustwipeError::Validation(format!(
            "certificate {} was issued for {} / {}, not {} / {}",
            previous.certificate_id,
            previous.asset_tag,
            previous.device.serial,
            asset.asset_tag,
            drive.serial
        )));
    }
    build(
        asset,
        drive_id,
        run,
        signer,
        operator,
        Some((previous.certificate_id.clone(), reason.to_owned())),
    )
}

fn find_drive(asset: &Asset, drive_id: DriveId) -> Result<&Drive> {
    asset.drive(drive_id).ok_or_else(|| TrustwipeError::NotFound {
        kind: "drive",
        id: format!("{drive_id} in asset {}", asset.asset_tag),
    })
}

fn build(
    asset: &Asset,
    drive_id: DriveId,
    run: &WipeRun,
    signer: &CertificateSigner,
    operator: Option<&str>,
    amends: Option<(CertificateId, String)>,
) -> Result<SignedCertificate> {
    let drive = find_drive(asset, drive_id)?;
    if drive.status != DriveStatus::Verified {
        return Err(TrustwipeError::Validation(format!(
            "drive {} is {}; certificates are only issued for verified drives",
            drive.path, drive.status
        )));
    }
    let method = drive.method.ok_or_else(|| {
        TrustwipeError::Validation(format!("drive {} has no recorded method", drive.path))
    })?;
    let (start, end) = match (drive.wipe_started_at, drive.wipe_finished_at) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err(TrustwipeError::Validation(format!(
                "drive {} has no recorded wipe times",
                drive.path
            )));
        }
    };
    if end <= start {
        return Err(TrustwipeError::Validation(format!(
            "wipe of {} ends ({end}) before it starts ({start})",
            drive.path
        )));
    }
    run.validate()?;

    let category = method.nist_category();
    check_method(drive.drive_type, method)?;
    check_verification(category, &run.verification)?;
    if drive.drive_type == DriveType::Hdd && !run.hpa_dco_removed {
        warn!(drive = %drive.path, "HPA/DCO not removed before HDD sanitization");
    }

    let issued_at = Utc::now();
    let certificate_id = CertificateId::generate(issued_at);
    let (supersedes, amendment_reason) = match amends {
        Some((id, reason)) => (Some(id), Some(reason)),
        None => (None, None),
    };

    let certificate = SanitizationCertificate {
        schema: SCHEMA_URL.to_owned(),
        signing: SigningInfo {
            sig_alg: SIG_ALG.to_owned(),
            detached_signature: signature_file_name(&certificate_id),
            signer_fingerprint: signer.fingerprint(),
            // Local signer: the station key is the CA.
            ca_verified: true,
            timestamp_verified: false,
        },
        certificate_id,
        asset_tag: asset.asset_tag.clone(),
        device: DeviceInfo {
            model: drive.model.clone(),
            serial: drive.serial.clone(),
            drive_type: drive.drive_type,
            capacity_bytes: drive.capacity_bytes,
            capacity_label: format_capacity(drive.capacity_bytes),
            path: drive.path.clone(),
        },
        nist_category: category,
        algorithm: method.display_name().to_owned(),
        method,
        hpa_dco_removed: run.hpa_dco_removed,
        start_time_utc: start,
        end_time_utc: end,
        verification: run.verification.clone(),
        run_log_sha256: run.run_log_sha256.to_ascii_lowercase(),
        compliance: ComplianceInfo {
            nist_sp_800_88: NIST_SP_800_88_TAG.to_owned(),
            iso_iec_27040: ISO_IEC_27040_TAG.to_owned(),
            method_rationale: method_rationale(method),
        },
        operator: operator.map(str::to_owned),
        issued_at,
        supersedes,
        amendment_reason,
    };

    let signature = signer.sign(&certificate.canonical_bytes()?)?;
    info!(
        certificate = %certificate.certificate_id,
        category = %category,
        method = %method,
        "certificate issued"
    );
    Ok(SignedCertificate {
        certificate,
        signature: DetachedSignature {
            sig_alg: SIG_ALG.to_owned(),
            signer_public_key: signer.public_key_hex(),
            signature,
        },
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use trustwipe_core::types::{
        AssetType, SanitizationMethod, VerificationMode, VerificationOutcome,
    };

    pub(crate) fn sample_run() -> WipeRun {
        WipeRun::from_log(
            VerificationSummary {
                mode: VerificationMode::Sample,
                percent: 5,
                result: VerificationOutcome::Pass,
                blocks_verified: 102_400,
                errors: 0,
            },
            false,
            b"nvme sanitize --sanact=2 /dev/nvme0n1\nsanitize complete\n",
        )
    }

    /// A laptop with one NVMe drive that went through a full Purge wipe.
    pub(crate) fn wiped_asset(method: SanitizationMethod) -> (Asset, DriveId) {
        let drive = Drive::new(
            "/dev/nvme0n1",
            "Samsung 980 Pro",
            "S6B2NS0R123456A",
            DriveType::Nvme,
            2_000_398_934_016,
        );
        let drive_id = drive.id;
        let mut asset = Asset::new(
            "LT-002-2025",
            AssetType::Laptop,
            "HP",
            "EliteBook 850",
            "HP850-XYZ789",
            vec![drive],
        )
        .unwrap();
        let start = Utc::now() - Duration::seconds(162);
        asset.enqueue().unwrap();
        asset.start_wipe(method, start).unwrap();
        asset.complete_drive(drive_id, Utc::now()).unwrap();
        (asset, drive_id)
    }

    #[test]
    fn issued_certificate_is_signed_and_complete() {
        let signer = CertificateSigner::generate().unwrap();
        let (asset, drive_id) = wiped_asset(SanitizationMethod::NvmeSanitizeBlockErase);
        let signed =
            issue_certificate(&asset, drive_id, &sample_run(), &signer, Some("operator-001")).unwrap();

        let cert = &signed.certificate;
        assert_eq!(cert.schema, SCHEMA_URL);
        assert!(cert.certificate_id.as_str().starts_with("swc-"));
        assert_eq!(cert.nist_category, trustwipe_core::NistCategory::Purge);
        assert_eq!(cert.algorithm, "NVMe Sanitize (Block Erase)");
        assert_eq!(cert.device.capacity_label, "2TB");
        assert_eq!(cert.compliance.nist_sp_800_88, "Rev.1 Compliant");
        assert_eq!(cert.signing.signer_fingerprint, signer.fingerprint());
        assert!(cert.signing.ca_verified);
        assert!(!cert.signing.timestamp_verified);
        assert_eq!(
            cert.signing.detached_signature,
            format!("{}.json.sig", cert.certificate_id)
        );
        assert_eq!(cert.duration_label(), "2m 42s");
        assert!(cert.supersedes.is_none());
        signed.verify_signature().unwrap();
        assert_eq!(signed.content_hash().unwrap().len(), 64);
    }

    #[test]
    fn unverified_drive_rejected() {
        let signer = CertificateSigner::generate().unwrap();
        let drive = Drive::new("/dev/sda", "Seagate Exos 7E10", "ZA1B2C3D", DriveType::Hdd, 4_000_000_000_000);
        let drive_id = drive.id;
        let mut asset = Asset::new("SV-003-2025", AssetType::Server, "Lenovo", "ThinkSystem SR650", "LS650-789ABC", vec![drive]).unwrap();
        asset.enqueue().unwrap();
        asset
            .start_wipe(SanitizationMethod::AtaSecureErase, Utc::now())
            .unwrap();

        let err = issue_certificate(&asset, drive_id, &sample_run(), &signer, None).unwrap_err();
        assert!(matches!(err, TrustwipeError::Validation(_)));
    }

    #[test]
    fn method_must_suit_media() {
        let signer = CertificateSigner::generate().unwrap();
        // ATA Secure Erase is not an NVMe technique.
        let (asset, drive_id) = wiped_asset(SanitizationMethod::AtaSecureErase);
        assert!(matches!(
            issue_certificate(&asset, drive_id, &sample_run(), &signer, None),
            Err(TrustwipeError::ComplianceViolation(_))
        ));
    }

    #[test]
    fn purge_without_sampling_rejected() {
        let signer = CertificateSigner::generate().unwrap();
        let (asset, drive_id) = wiped_asset(SanitizationMethod::NvmeSanitizeCryptoErase);
        let mut run = sample_run();
        run.verification.percent = 0;
        assert!(issue_certificate(&asset, drive_id, &run, &signer, None).is_err());
    }

    #[test]
    fn amendment_points_back() {
        let signer = CertificateSigner::generate().unwrap();
        let (asset, drive_id) = wiped_asset(SanitizationMethod::NvmeSanitizeBlockErase);
        let original = issue_certificate(&asset, drive_id, &sample_run(), &signer, None).unwrap();

        let mut corrected = sample_run();
        corrected.verification.percent = 10;
        let amended = amend_certificate(
            &original.certificate,
            &asset,
            drive_id,
            &corrected,
            &signer,
            Some("operator-002"),
            "sample percentage misreported",
        )
        .unwrap();

        assert_ne!(amended.id(), original.id());
        assert_eq!(amended.certificate.supersedes.as_ref(), Some(original.id()));
        assert_eq!(
            amended.certificate.amendment_reason.as_deref(),
            Some("sample percentage misreported")
        );
        assert_eq!(amended.certificate.verification.percent, 10);
    }

    #[test]
    fn amendment_needs_reason_and_same_drive() {
        let signer = CertificateSigner::generate().unwrap();
        let (asset, drive_id) = wiped_asset(SanitizationMethod::NvmeSanitizeBlockErase);
        let original = issue_certificate(&asset, drive_id, &sample_run(), &signer, None).unwrap();
        assert!(
            amend_certificate(&original.certificate, &asset, drive_id, &sample_run(), &signer, None, "  ")
                .is_err()
        );

        let (other, other_drive) = wiped_asset(SanitizationMethod::NvmeSanitizeBlockErase);
        let mut other = other;
        other.asset_tag = "DT-001-2025".into();
        assert!(
            amend_certificate(&original.certificate, &other, other_drive, &sample_run(), &signer, None, "typo")
                .is_err()
        );
    }

    #[test]
    fn bad_run_log_hash_rejected() {
        let signer = CertificateSigner::generate().unwrap();
        let (asset, drive_id) = wiped_asset(SanitizationMethod::NvmeSanitizeBlockErase);
        let mut run = sample_run();
        run.run_log_sha256 = "a1b2c3".into();
        assert!(issue_certificate(&asset, drive_id, &run, &signer, None).is_err());
    }
}
