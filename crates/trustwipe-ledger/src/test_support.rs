// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared fixtures for registry and dispatcher tests.

use chrono::{Duration, Utc};
use trustwipe_certificate::{SignedCertificate, WipeRun, issue_certificate};
use trustwipe_core::types::{
    Asset, AssetType, CertificationLevel, Drive, DriveType, PartnerStatus, RecyclerPartner,
    SanitizationMethod, VerificationMode, VerificationOutcome, VerificationSummary,
};
use trustwipe_security::CertificateSigner;

use crate::registry::Registry;

/// A desktop with an NVMe system drive and an HDD data drive, at intake.
pub(crate) fn workstation(tag: &str) -> Asset {
    Asset::new(
        tag,
        AssetType::Desktop,
        "Dell",
        "OptiPlex 7090",
        "DL7090-ABC123",
        vec![
            Drive::new("/dev/nvme0n1", "Samsung 980 Pro", "S6B2NS0R123456A", DriveType::Nvme, 2_000_398_934_016),
            Drive::new("/dev/sda", "WD Blue", "WD-WCC4N1234567", DriveType::Hdd, 1_000_204_886_016),
        ],
    )
    .unwrap()
}

/// A single-NVMe laptop that finished a Purge wipe.
pub(crate) fn wiped_laptop(tag: &str) -> Asset {
    let drive = Drive::new(
        "/dev/nvme0n1",
        "Samsung 980 Pro",
        "S6B2NS0R123456A",
        DriveType::Nvme,
        2_000_398_934_016,
    );
    let drive_id = drive.id;
    let mut asset = Asset::new(tag, AssetType::Laptop, "HP", "EliteBook 850", "HP850-XYZ789", vec![drive]).unwrap();
    asset.enqueue().unwrap();
    asset
        .start_wipe(SanitizationMethod::NvmeSanitizeBlockErase, Utc::now() - Duration::minutes(3))
        .unwrap();
    asset.complete_drive(drive_id, Utc::now()).unwrap();
    asset
}

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
        b"sanitize complete",
    )
}

/// Register a wiped laptop and issue a certificate for its drive.
pub(crate) fn certified(
    registry: &Registry,
    signer: &CertificateSigner,
    tag: &str,
) -> (Asset, SignedCertificate) {
    let asset = wiped_laptop(tag);
    registry.insert_asset(&asset).unwrap();
    let signed = issue_certificate(&asset, asset.drives[0].id, &sample_run(), signer, None).unwrap();
    registry.insert_certificate(&signed).unwrap();
    (asset, signed)
}

pub(crate) fn active_partner(name: &str) -> RecyclerPartner {
    let mut partner = RecyclerPartner::new(
        name,
        "certificates@greentech-recycling.com",
        "https://api.greentech-recycling.com/v1/certificates",
        CertificationLevel::R2,
    );
    partner.status = PartnerStatus::Active;
    partner
}
