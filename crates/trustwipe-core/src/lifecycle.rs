// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Asset and drive state machines.
//
// Asset:  intake → queued → wiping → verified → released
//                              │          │
//                              └──────────┴──→ failed (terminal)
// Drive:  detected → wiping → verified | failed
//
// The asset status is derived from its drives after every drive change: the
// asset becomes `verified` only when all drives are verified and `failed` as
// soon as any drive fails.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{Result, TrustwipeError};
use crate::types::{
    AnchorMetadata, AnchorStatus, Asset, AssetId, AssetStatus, AssetType, BlockchainRecord,
    CertificateDelivery, CertificateId, DeliveryStatus, Drive, DriveId, DriveStatus, ErrorClass,
    SanitizationMethod,
};

impl AssetStatus {
    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: AssetStatus) -> bool {
        use AssetStatus::*;
        matches!(
            (self, next),
            (Intake, Queued)
                | (Queued, Wiping)
                | (Wiping, Verified)
                | (Wiping, Failed)
                | (Verified, Released)
                | (Verified, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AssetStatus::Released | AssetStatus::Failed)
    }
}

impl DriveStatus {
    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: DriveStatus) -> bool {
        use DriveStatus::*;
        matches!(
            (self, next),
            (Detected, Wiping) | (Wiping, Verified) | (Wiping, Failed)
        )
    }
}

fn asset_transition_error(from: AssetStatus, to: AssetStatus) -> TrustwipeError {
    TrustwipeError::InvalidTransition {
        entity: "asset",
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn drive_transition_error(from: DriveStatus, to: DriveStatus) -> TrustwipeError {
    TrustwipeError::InvalidTransition {
        entity: "drive",
        from: from.to_string(),
        to: to.to_string(),
    }
}

impl Drive {
    fn transition(&mut self, next: DriveStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(drive_transition_error(self.status, next));
        }
        self.status = next;
        Ok(())
    }
}

impl Asset {
    /// Register a new asset at intake.
    ///
    /// Fails when the tag is blank, no drives are supplied, or two drives
    /// share a device path or serial number.
    pub fn new(
        asset_tag: impl Into<String>,
        asset_type: AssetType,
        manufacturer: impl Into<String>,
        model: impl Into<String>,
        serial_number: impl Into<String>,
        drives: Vec<Drive>,
    ) -> Result<Self> {
        let asset_tag = asset_tag.into().trim().to_owned();
        if asset_tag.is_empty() {
            return Err(TrustwipeError::Validation("asset tag must not be empty".into()));
        }
        if drives.is_empty() {
            return Err(TrustwipeError::Validation(format!(
                "asset {asset_tag} must contain at least one drive"
            )));
        }

        let mut paths = HashSet::new();
        let mut serials = HashSet::new();
        for drive in &drives {
            if drive.capacity_bytes == 0 {
                return Err(TrustwipeError::Validation(format!(
                    "drive {} has zero capacity",
                    drive.path
                )));
            }
            if !paths.insert(drive.path.as_str()) {
                return Err(TrustwipeError::Validation(format!(
                    "duplicate drive path {} in asset {asset_tag}",
                    drive.path
                )));
            }
            if !serials.insert(drive.serial.as_str()) {
                return Err(TrustwipeError::Validation(format!(
                    "duplicate drive serial {} in asset {asset_tag}",
                    drive.serial
                )));
            }
        }

        let now = Utc::now();
        Ok(Self {
            id: AssetId::new(),
            asset_tag,
            asset_type,
            manufacturer: manufacturer.into(),
            model: model.into(),
            serial_number: serial_number.into(),
            status: AssetStatus::Intake,
            drives,
            assigned_to: None,
            recycler_destination: None,
            intake_at: now,
            updated_at: now,
            failure_reason: None,
        })
    }

    pub fn drive(&self, id: DriveId) -> Option<&Drive> {
        self.drives.iter().find(|d| d.id == id)
    }

    pub fn drive_by_path(&self, path: &str) -> Option<&Drive> {
        self.drives.iter().find(|d| d.path == path)
    }

    fn drive_mut(&mut self, id: DriveId) -> Result<&mut Drive> {
        let tag = self.asset_tag.clone();
        self.drives
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| TrustwipeError::NotFound {
                kind: "drive",
                id: format!("{id} in asset {tag}"),
            })
    }

    fn transition(&mut self, next: AssetStatus, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(asset_transition_error(self.status, next));
        }
        debug!(asset = %self.asset_tag, from = %self.status, to = %next, "asset transition");
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// Schedule the asset for sanitization.
    pub fn enqueue(&mut self) -> Result<()> {
        self.transition(AssetStatus::Queued, Utc::now())
    }

    /// Begin sanitizing every drive with `method`.
    ///
    /// All drives move to `wiping` with progress reset to 0.
    pub fn start_wipe(&mut self, method: SanitizationMethod, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(AssetStatus::Wiping) {
            return Err(asset_transition_error(self.status, AssetStatus::Wiping));
        }
        if let Some(drive) = self
            .drives
            .iter()
            .find(|d| !d.status.can_transition_to(DriveStatus::Wiping))
        {
            return Err(drive_transition_error(drive.status, DriveStatus::Wiping));
        }

        for drive in &mut self.drives {
            drive.transition(DriveStatus::Wiping)?;
            drive.method = Some(method);
            drive.progress = 0;
            drive.wipe_started_at = Some(at);
        }
        self.transition(AssetStatus::Wiping, at)?;
        info!(asset = %self.asset_tag, method = %method, drives = self.drives.len(), "wipe started");
        Ok(())
    }

    /// Record progress reported by the wiping station.
    ///
    /// Progress must stay within 0..=100 and may not go backwards.
    pub fn update_drive_progress(&mut self, drive_id: DriveId, progress: u8) -> Result<()> {
        if progress > 100 {
            return Err(TrustwipeError::Validation(format!(
                "progress {progress} exceeds 100"
            )));
        }
        let drive = self.drive_mut(drive_id)?;
        if drive.status != DriveStatus::Wiping {
            return Err(TrustwipeError::Validation(format!(
                "drive {} is {}, not wiping",
                drive.path, drive.status
            )));
        }
        if progress < drive.progress {
            return Err(TrustwipeError::Validation(format!(
                "progress for {} cannot go backwards ({} -> {progress})",
                drive.path, drive.progress
            )));
        }
        drive.progress = progress;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark a drive as sanitized and verified.
    ///
    /// When it is the last outstanding drive the asset becomes `verified`.
    pub fn complete_drive(&mut self, drive_id: DriveId, at: DateTime<Utc>) -> Result<()> {
        let drive = self.drive_mut(drive_id)?;
        drive.transition(DriveStatus::Verified)?;
        drive.progress = 100;
        drive.wipe_finished_at = Some(at);
        info!(drive = %drive.path, "drive verified");
        self.roll_up(at)
    }

    /// Mark a drive as failed. The asset fails with it.
    pub fn fail_drive(
        &mut self,
        drive_id: DriveId,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let reason = reason.into();
        let drive = self.drive_mut(drive_id)?;
        drive.transition(DriveStatus::Failed)?;
        drive.wipe_finished_at = Some(at);
        drive.failure_reason = Some(reason.clone());
        warn!(drive = %drive.path, %reason, "drive failed");
        let path = drive.path.clone();
        self.failure_reason = Some(format!("drive {path}: {reason}"));
        self.roll_up(at)
    }

    /// Fail the whole asset, e.g. when the station aborts a wipe or a
    /// post-wipe audit finds residue. Drives still wiping fail with it;
    /// verified drives keep their status.
    pub fn fail(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        self.transition(AssetStatus::Failed, at)?;
        let reason = reason.into();
        for drive in self.drives.iter_mut().filter(|d| d.status == DriveStatus::Wiping) {
            drive.transition(DriveStatus::Failed)?;
            drive.wipe_finished_at = Some(at);
            drive.failure_reason = Some(reason.clone());
        }
        warn!(asset = %self.asset_tag, %reason, "asset failed");
        self.failure_reason = Some(reason);
        Ok(())
    }

    /// Hand a verified asset over to its recycler.
    pub fn release(&mut self, recycler: Option<String>, at: DateTime<Utc>) -> Result<()> {
        self.transition(AssetStatus::Released, at)?;
        if recycler.is_some() {
            self.recycler_destination = recycler;
        }
        info!(asset = %self.asset_tag, recycler = ?self.recycler_destination, "asset released");
        Ok(())
    }

    /// Re-derive the asset status from its drives.
    fn roll_up(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.status != AssetStatus::Wiping {
            return Ok(());
        }
        if self.drives.iter().any(|d| d.status == DriveStatus::Failed) {
            self.transition(AssetStatus::Failed, at)?;
        } else if self.drives.iter().all(|d| d.status == DriveStatus::Verified) {
            self.transition(AssetStatus::Verified, at)?;
        } else {
            self.updated_at = at;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Anchor records
// ---------------------------------------------------------------------------

/// Check that `hash` looks like a 32-byte `0x`-prefixed transaction hash.
pub fn validate_tx_hash(hash: &str) -> Result<()> {
    let ok = hash
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()));
    if ok {
        Ok(())
    } else {
        Err(TrustwipeError::Validation(format!(
            "transaction hash must be 0x followed by 64 hex digits, got {hash:?}"
        )))
    }
}

fn anchor_transition_error(from: AnchorStatus, to: AnchorStatus) -> TrustwipeError {
    TrustwipeError::InvalidTransition {
        entity: "anchor",
        from: from.to_string(),
        to: to.to_string(),
    }
}

impl BlockchainRecord {
    /// A freshly submitted, unconfirmed anchor.
    pub fn pending(
        certificate_id: CertificateId,
        transaction_hash: impl Into<String>,
        cert_hash: impl Into<String>,
        network: impl Into<String>,
        metadata: AnchorMetadata,
        submitted_at: DateTime<Utc>,
    ) -> Result<Self> {
        let transaction_hash = transaction_hash.into().to_ascii_lowercase();
        validate_tx_hash(&transaction_hash)?;
        Ok(Self {
            certificate_id,
            transaction_hash,
            cert_hash: cert_hash.into(),
            network: network.into(),
            block_number: None,
            gas_used: None,
            status: AnchorStatus::Pending,
            submitted_at,
            resolved_at: None,
            failure_reason: None,
            metadata,
        })
    }

    /// Record inclusion in `block_number`.
    pub fn confirm(&mut self, block_number: u64, gas_used: u64, at: DateTime<Utc>) -> Result<()> {
        if self.status != AnchorStatus::Pending {
            return Err(anchor_transition_error(self.status, AnchorStatus::Confirmed));
        }
        if block_number == 0 {
            return Err(TrustwipeError::Validation("block number must be positive".into()));
        }
        self.status = AnchorStatus::Confirmed;
        self.block_number = Some(block_number);
        self.gas_used = Some(gas_used);
        self.resolved_at = Some(at);
        Ok(())
    }

    /// Record that the transaction was dropped or reverted.
    pub fn fail(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        if self.status != AnchorStatus::Pending {
            return Err(anchor_transition_error(self.status, AnchorStatus::Failed));
        }
        self.status = AnchorStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.resolved_at = Some(at);
        Ok(())
    }

    /// Confirmations at `current_block`, counting the inclusion block itself.
    pub fn confirmations(&self, current_block: u64) -> u64 {
        match (self.status, self.block_number) {
            (AnchorStatus::Confirmed, Some(block)) if current_block >= block => {
                current_block - block + 1
            }
            _ => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

fn delivery_transition_error(from: DeliveryStatus, to: DeliveryStatus) -> TrustwipeError {
    TrustwipeError::InvalidTransition {
        entity: "delivery",
        from: from.to_string(),
        to: to.to_string(),
    }
}

impl CertificateDelivery {
    pub fn mark_delivered(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.status != DeliveryStatus::Pending {
            return Err(delivery_transition_error(self.status, DeliveryStatus::Delivered));
        }
        self.status = DeliveryStatus::Delivered;
        self.delivered_at = Some(at);
        self.next_attempt_at = None;
        self.updated_at = at;
        Ok(())
    }

    /// Record a failed attempt and schedule retry number `retry_count + 1`
    /// at `next_attempt_at`.
    pub fn schedule_retry(
        &mut self,
        error: impl Into<String>,
        class: ErrorClass,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != DeliveryStatus::Pending {
            return Err(delivery_transition_error(self.status, DeliveryStatus::Pending));
        }
        self.record_error(error.into(), class, Utc::now());
        self.retry_count += 1;
        self.next_attempt_at = Some(next_attempt_at);
        Ok(())
    }

    /// Record a failed attempt and stop. Only an operator can re-arm it.
    pub fn fail_terminal(
        &mut self,
        error: impl Into<String>,
        class: ErrorClass,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != DeliveryStatus::Pending {
            return Err(delivery_transition_error(self.status, DeliveryStatus::Failed));
        }
        self.record_error(error.into(), class, at);
        self.status = DeliveryStatus::Failed;
        self.next_attempt_at = None;
        warn!(
            delivery = %self.id,
            partner = %self.partner_name,
            attempts = self.retry_count,
            "delivery failed permanently, manual intervention required"
        );
        Ok(())
    }

    /// Push the next attempt back without counting a failure.
    pub fn defer(&mut self, until: DateTime<Utc>) {
        self.next_attempt_at = Some(until);
        self.updated_at = Utc::now();
    }

    /// Operator "Retry": re-arm a failed delivery with a fresh retry budget.
    pub fn manual_retry(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.status != DeliveryStatus::Failed {
            return Err(delivery_transition_error(self.status, DeliveryStatus::Pending));
        }
        self.status = DeliveryStatus::Pending;
        self.retry_count = 0;
        self.next_attempt_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    fn record_error(&mut self, error: String, class: ErrorClass, at: DateTime<Utc>) {
        self.error_class = Some(class);
        self.error_history.push(error.clone());
        self.last_error = Some(error);
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DriveType;

    fn server() -> Asset {
        Asset::new(
            "SV-003-2025",
            AssetType::Server,
            "Lenovo",
            "ThinkSystem SR650",
            "LS650-789ABC",
            vec![
                Drive::new("/dev/sda", "Seagate Exos 7E10", "ST10TB-001", DriveType::Hdd, 10_000_000_000_000),
                Drive::new("/dev/sdb", "Seagate Exos 7E10", "ST10TB-002", DriveType::Hdd, 10_000_000_000_000),
            ],
        )
        .expect("valid asset")
    }

    fn wiping_server() -> Asset {
        let mut asset = server();
        asset.enqueue().unwrap();
        asset.start_wipe(SanitizationMethod::AtaSecureErase, Utc::now()).unwrap();
        asset
    }

    #[test]
    fn asset_requires_drives() {
        let err = Asset::new("DT-001-2025", AssetType::Desktop, "Dell", "OptiPlex 7090", "X", vec![])
            .unwrap_err();
        assert!(matches!(err, TrustwipeError::Validation(_)));
    }

    #[test]
    fn duplicate_drive_paths_rejected() {
        let drives = vec![
            Drive::new("/dev/sda", "A", "1", DriveType::Hdd, 1),
            Drive::new("/dev/sda", "B", "2", DriveType::Hdd, 1),
        ];
        assert!(Asset::new("T", AssetType::Server, "M", "M", "S", drives).is_err());
    }

    #[test]
    fn duplicate_drive_serials_rejected() {
        let drives = vec![
            Drive::new("/dev/sda", "Seagate Exos 7E10", "ST10TB-001", DriveType::Hdd, 1),
            Drive::new("/dev/sdb", "Seagate Exos 7E10", "ST10TB-001", DriveType::Hdd, 1),
        ];
        let err = Asset::new("SV-004-2025", AssetType::Server, "Lenovo", "SR650", "S", drives)
            .unwrap_err();
        assert!(matches!(err, TrustwipeError::Validation(ref m) if m.contains("ST10TB-001")));
    }

    #[test]
    fn cannot_skip_queue() {
        let mut asset = server();
        let err = asset
            .start_wipe(SanitizationMethod::AtaSecureErase, Utc::now())
            .unwrap_err();
        assert!(matches!(err, TrustwipeError::InvalidTransition { entity: "asset", .. }));
        assert_eq!(asset.status, AssetStatus::Intake);
        assert!(asset.drives.iter().all(|d| d.status == DriveStatus::Detected));
    }

    #[test]
    fn start_wipe_resets_drives() {
        let asset = wiping_server();
        assert_eq!(asset.status, AssetStatus::Wiping);
        for drive in &asset.drives {
            assert_eq!(drive.status, DriveStatus::Wiping);
            assert_eq!(drive.progress, 0);
            assert_eq!(drive.method, Some(SanitizationMethod::AtaSecureErase));
        }
    }

    #[test]
    fn verified_only_after_all_drives() {
        let mut asset = wiping_server();
        let first = asset.drives[0].id;
        let second = asset.drives[1].id;

        asset.complete_drive(first, Utc::now()).unwrap();
        assert_eq!(asset.status, AssetStatus::Wiping);

        asset.complete_drive(second, Utc::now()).unwrap();
        assert_eq!(asset.status, AssetStatus::Verified);
        assert!(asset.drives.iter().all(|d| d.progress == 100));
    }

    #[test]
    fn any_drive_failure_fails_asset() {
        let mut asset = wiping_server();
        let first = asset.drives[0].id;
        let second = asset.drives[1].id;

        asset.complete_drive(first, Utc::now()).unwrap();
        asset.fail_drive(second, "sanitize command aborted", Utc::now()).unwrap();

        assert_eq!(asset.status, AssetStatus::Failed);
        assert!(asset.failure_reason.as_deref().unwrap().contains("/dev/sdb"));
        assert!(asset.status.is_terminal());
    }

    #[test]
    fn progress_is_monotonic_and_bounded() {
        let mut asset = wiping_server();
        let drive = asset.drives[0].id;

        asset.update_drive_progress(drive, 40).unwrap();
        asset.update_drive_progress(drive, 67).unwrap();
        assert!(asset.update_drive_progress(drive, 50).is_err());
        assert!(asset.update_drive_progress(drive, 101).is_err());
        assert_eq!(asset.drive(drive).unwrap().progress, 67);
    }

    #[test]
    fn progress_rejected_outside_wiping() {
        let mut asset = server();
        let drive = asset.drives[0].id;
        assert!(asset.update_drive_progress(drive, 10).is_err());
    }

    #[test]
    fn verified_drive_cannot_fail() {
        let mut asset = wiping_server();
        let drive = asset.drives[0].id;
        asset.complete_drive(drive, Utc::now()).unwrap();
        let err = asset.fail_drive(drive, "late", Utc::now()).unwrap_err();
        assert!(matches!(err, TrustwipeError::InvalidTransition { entity: "drive", .. }));
    }

    #[test]
    fn release_and_post_verification_failure() {
        let mut asset = wiping_server();
        for id in asset.drives.iter().map(|d| d.id).collect::<Vec<_>>() {
            asset.complete_drive(id, Utc::now()).unwrap();
        }

        let mut failed = asset.clone();
        failed.fail("residual data found in audit", Utc::now()).unwrap();
        assert_eq!(failed.status, AssetStatus::Failed);

        asset.release(Some("GreenTech Recycling".into()), Utc::now()).unwrap();
        assert_eq!(asset.status, AssetStatus::Released);
        assert_eq!(asset.recycler_destination.as_deref(), Some("GreenTech Recycling"));
        assert!(asset.fail("too late", Utc::now()).is_err());
    }

    #[test]
    fn aborting_a_wipe_fails_unfinished_drives() {
        let mut asset = wiping_server();
        let done = asset.drives[0].id;
        let stuck = asset.drives[1].id;
        asset.complete_drive(done, Utc::now()).unwrap();

        let at = Utc::now();
        asset.fail("station lost power", at).unwrap();
        assert_eq!(asset.status, AssetStatus::Failed);
        assert_eq!(asset.failure_reason.as_deref(), Some("station lost power"));

        let stuck = asset.drive(stuck).unwrap();
        assert_eq!(stuck.status, DriveStatus::Failed);
        assert_eq!(stuck.failure_reason.as_deref(), Some("station lost power"));
        assert_eq!(stuck.wipe_finished_at, Some(at));
        assert_eq!(asset.drive(done).unwrap().status, DriveStatus::Verified);
        assert!(asset.drives.iter().all(|d| d.status != DriveStatus::Wiping));
    }

    #[test]
    fn transition_table() {
        use AssetStatus::*;
        assert!(Intake.can_transition_to(Queued));
        assert!(!Intake.can_transition_to(Wiping));
        assert!(!Queued.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Queued));
        assert!(!Released.can_transition_to(Failed));
        assert!(Verified.can_transition_to(Failed));
    }
    fn anchor() -> BlockchainRecord {
        BlockchainRecord::pending(
            CertificateId::from("swc-2025-09-08-C3D4E5"),
            "0xABCDEF1234567890abcdef1234567890abcdef1234567890abcdef1234567890",
            "c3d4e5f6",
            "Polygon (MATIC) Mainnet",
            AnchorMetadata {
                device_model: "Seagate Exos 7E10".into(),
                method: "ATA Secure Erase".into(),
                operator: Some("operator-001".into()),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn tx_hash_validation() {
        assert!(validate_tx_hash("0x1a2b").is_err());
        assert!(validate_tx_hash(&format!("0x{}", "a".repeat(64))).is_ok());
        assert!(validate_tx_hash(&format!("0x{}", "g".repeat(64))).is_err());
        // Stored lowercase.
        assert!(anchor().transaction_hash.starts_with("0xabcdef"));
    }

    #[test]
    fn anchor_resolves_once() {
        let mut record = anchor();
        assert_eq!(record.confirmations(100), 0);
        record.confirm(18_745_632, 21_000, Utc::now()).unwrap();
        assert_eq!(record.confirmations(18_745_654), 23);
        assert!(record.fail("reorg", Utc::now()).is_err());
        assert!(record.confirm(18_745_640, 21_000, Utc::now()).is_err());
    }

    #[test]
    fn failed_anchor_keeps_reason() {
        let mut record = anchor();
        record.fail("transaction dropped from mempool", Utc::now()).unwrap();
        assert_eq!(record.status, AnchorStatus::Failed);
        assert_eq!(record.confirmations(u64::MAX), 0);
    }

    fn delivery() -> CertificateDelivery {
        let partner = crate::types::RecyclerPartner::new(
            "EcoWaste Solutions",
            "integration@ecowaste.com",
            "https://partners.ecowaste.com/api/certificates",
            crate::types::CertificationLevel::EStewards,
        );
        CertificateDelivery::new(
            CertificateId::from("swc-2025-09-08-A1B2C3"),
            &partner,
            crate::types::DeliveryMethod::Email,
            3,
        )
    }

    #[test]
    fn delivery_retry_then_terminal_then_manual() {
        let mut d = delivery();
        let later = Utc::now() + chrono::Duration::minutes(5);
        d.schedule_retry("timed out", ErrorClass::Transient, later).unwrap();
        assert_eq!(d.retry_count, 1);
        assert!(!d.is_due(Utc::now()));
        assert!(d.is_due(later));

        d.fail_terminal("timed out again", ErrorClass::Transient, Utc::now()).unwrap();
        assert_eq!(d.status, DeliveryStatus::Failed);
        assert_eq!(d.retry_count, 1);
        assert_eq!(d.error_history.len(), 2);
        assert!(!d.is_due(later));
        assert!(d.mark_delivered(Utc::now()).is_err());

        d.manual_retry(Utc::now()).unwrap();
        assert_eq!(d.status, DeliveryStatus::Pending);
        assert_eq!(d.retry_count, 0);
        assert_eq!(d.error_history.len(), 2);
    }

    #[test]
    fn manual_retry_only_from_failed() {
        let mut d = delivery();
        assert!(d.manual_retry(Utc::now()).is_err());
        d.mark_delivered(Utc::now()).unwrap();
        assert!(d.manual_retry(Utc::now()).is_err());
    }
}
