// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the TrustWipe sanitization ledger.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TrustwipeError};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TrustwipeError;

            fn from_str(s: &str) -> Result<Self> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| TrustwipeError::Validation(format!("invalid id {s:?}: {e}")))
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an asset.
    AssetId
);
uuid_id!(
    /// Unique identifier for a drive inside an asset.
    DriveId
);
uuid_id!(
    /// Unique identifier for a recycler partner.
    PartnerId
);
uuid_id!(
    /// Unique identifier for a certificate delivery.
    DeliveryId
);

/// Human-readable certificate identifier, e.g. `swc-2025-09-08-ABC123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(pub String);

impl CertificateId {
    /// Mint a new identifier for a certificate issued at `issued_at`.
    pub fn generate(issued_at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string()[..6].to_ascii_uppercase();
        Self(format!("swc-{}-{}", issued_at.format("%Y-%m-%d"), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CertificateId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Keyword enums
// ---------------------------------------------------------------------------

/// Implements `as_str`, `Display`, and case-insensitive `FromStr` for a
/// unit-only enum from a single keyword table.
macro_rules! keyword_enum {
    ($name:ident, $what:literal, { $($variant:ident => $kw:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $kw),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = TrustwipeError;

            fn from_str(s: &str) -> Result<Self> {
                let lower = s.trim().to_ascii_lowercase();
                $(
                    if lower == $kw.to_ascii_lowercase() $(|| lower == $alias)* {
                        return Ok($name::$variant);
                    }
                )+
                Err(TrustwipeError::Validation(format!("unknown {} {s:?}", $what)))
            }
        }
    };
}

/// Kind of physical device taken in for sanitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Desktop,
    Laptop,
    Server,
    Mobile,
}

keyword_enum!(AssetType, "asset type", {
    Desktop => "desktop",
    Laptop => "laptop",
    Server => "server",
    Mobile => "mobile",
});

/// Lifecycle states of an asset.
///
/// `intake → queued → wiping → verified → released`, with `failed`
/// reachable from `wiping` or `verified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    /// Received, drives catalogued, not yet scheduled.
    Intake,
    /// Scheduled for sanitization.
    Queued,
    /// At least one drive is being sanitized.
    Wiping,
    /// Every drive has been sanitized and verified.
    Verified,
    /// Handed over to its recycler destination.
    Released,
    /// A drive failed or post-wipe checks failed. Terminal.
    Failed,
}

keyword_enum!(AssetStatus, "asset status", {
    Intake => "intake",
    Queued => "queued",
    Wiping => "wiping",
    Verified => "verified",
    Released => "released",
    Failed => "failed",
});

/// Storage media type of a drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveType {
    #[serde(rename = "HDD")]
    Hdd,
    #[serde(rename = "SSD")]
    Ssd,
    #[serde(rename = "NVMe")]
    Nvme,
    #[serde(rename = "Flash")]
    Flash,
}

keyword_enum!(DriveType, "drive type", {
    Hdd => "HDD",
    Ssd => "SSD",
    Nvme => "NVMe",
    Flash => "Flash" | "usb" | "sd",
});

/// Lifecycle states of a drive: `detected → wiping → verified | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveStatus {
    Detected,
    Wiping,
    Verified,
    Failed,
}

keyword_enum!(DriveStatus, "drive status", {
    Detected => "detected",
    Wiping => "wiping",
    Verified => "verified",
    Failed => "failed",
});

/// NIST SP 800-88 sanitization category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NistCategory {
    Clear,
    Purge,
    Destroy,
}

keyword_enum!(NistCategory, "NIST category", {
    Clear => "Clear",
    Purge => "Purge",
    Destroy => "Destroy",
});

/// Concrete sanitization technique applied to a drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SanitizationMethod {
    Overwrite,
    TrimOverwrite,
    AtaSecureErase,
    AtaEnhancedSecureErase,
    NvmeSanitizeBlockErase,
    NvmeSanitizeCryptoErase,
    CryptoErase,
    ScsiSanitize,
    ControllerErase,
    PhysicalDestruction,
}

keyword_enum!(SanitizationMethod, "sanitization method", {
    Overwrite => "overwrite",
    TrimOverwrite => "trim-overwrite",
    AtaSecureErase => "ata-secure-erase",
    AtaEnhancedSecureErase => "ata-enhanced-secure-erase",
    NvmeSanitizeBlockErase => "nvme-sanitize-block-erase" | "nvme-sanitize",
    NvmeSanitizeCryptoErase => "nvme-sanitize-crypto-erase",
    CryptoErase => "crypto-erase",
    ScsiSanitize => "scsi-sanitize",
    ControllerErase => "controller-erase",
    PhysicalDestruction => "physical-destruction" | "destroy",
});

impl SanitizationMethod {
    /// Display name used on certificates and in partner payloads.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Overwrite => "Single-pass Overwrite",
            Self::TrimOverwrite => "TRIM + Overwrite",
            Self::AtaSecureErase => "ATA Secure Erase",
            Self::AtaEnhancedSecureErase => "ATA Enhanced Secure Erase",
            Self::NvmeSanitizeBlockErase => "NVMe Sanitize (Block Erase)",
            Self::NvmeSanitizeCryptoErase => "NVMe Sanitize (Crypto Erase)",
            Self::CryptoErase => "Crypto Erase",
            Self::ScsiSanitize => "SCSI SANITIZE",
            Self::ControllerErase => "Controller-based Erase",
            Self::PhysicalDestruction => "Physical Destruction",
        }
    }

    /// NIST SP 800-88 category this technique satisfies.
    pub fn nist_category(&self) -> NistCategory {
        match self {
            Self::Overwrite | Self::TrimOverwrite => NistCategory::Clear,
            Self::AtaSecureErase
            | Self::AtaEnhancedSecureErase
            | Self::NvmeSanitizeBlockErase
            | Self::NvmeSanitizeCryptoErase
            | Self::CryptoErase
            | Self::ScsiSanitize
            | Self::ControllerErase => NistCategory::Purge,
            Self::PhysicalDestruction => NistCategory::Destroy,
        }
    }
}

// ---------------------------------------------------------------------------
// Capacity helpers
// ---------------------------------------------------------------------------

const DECIMAL_UNITS: &[(&str, u64)] = &[
    ("TB", 1_000_000_000_000),
    ("GB", 1_000_000_000),
    ("MB", 1_000_000),
    ("KB", 1_000),
];

/// Format a byte count the way drive vendors label capacity (decimal units,
/// rounded), e.g. `2000398934016` → `"2TB"`.
pub fn format_capacity(bytes: u64) -> String {
    for (unit, scale) in DECIMAL_UNITS {
        if bytes >= *scale {
            let value = (bytes as f64 / *scale as f64).round() as u64;
            return format!("{value}{unit}");
        }
    }
    format!("{bytes}B")
}

/// Parse a vendor capacity label (`"1TB"`, `"512 GB"`) or a raw byte count.
pub fn parse_capacity(label: &str) -> Result<u64> {
    let compact: String = label.chars().filter(|c| !c.is_whitespace()).collect();
    let upper = compact.to_ascii_uppercase();

    for (unit, scale) in DECIMAL_UNITS {
        if let Some(number) = upper.strip_suffix(unit) {
            let value: f64 = number
                .parse()
                .map_err(|_| TrustwipeError::Validation(format!("invalid capacity {label:?}")))?;
            if value <= 0.0 {
                return Err(TrustwipeError::Validation(format!(
                    "capacity must be positive: {label:?}"
                )));
            }
            return Ok((value * *scale as f64).round() as u64);
        }
    }

    let digits = upper.strip_suffix('B').unwrap_or(&upper);
    match digits.parse::<u64>() {
        Ok(0) | Err(_) => Err(TrustwipeError::Validation(format!(
            "invalid capacity {label:?}"
        ))),
        Ok(bytes) => Ok(bytes),
    }
}

// ---------------------------------------------------------------------------
// Assets and drives
// ---------------------------------------------------------------------------

/// A storage device physically inside an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drive {
    pub id: DriveId,
    /// Device path as seen by the wiping station, e.g. `/dev/nvme0n1`.
    pub path: String,
    pub model: String,
    pub serial: String,
    pub drive_type: DriveType,
    pub capacity_bytes: u64,
    pub status: DriveStatus,
    pub method: Option<SanitizationMethod>,
    /// Percentage complete while wiping (0..=100).
    pub progress: u8,
    pub wipe_started_at: Option<DateTime<Utc>>,
    pub wipe_finished_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl Drive {
    pub fn new(
        path: impl Into<String>,
        model: impl Into<String>,
        serial: impl Into<String>,
        drive_type: DriveType,
        capacity_bytes: u64,
    ) -> Self {
        Self {
            id: DriveId::new(),
            path: path.into(),
            model: model.into(),
            serial: serial.into(),
            drive_type,
            capacity_bytes,
            status: DriveStatus::Detected,
            method: None,
            progress: 0,
            wipe_started_at: None,
            wipe_finished_at: None,
            failure_reason: None,
        }
    }
}

/// A physical device awaiting or undergoing sanitization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    /// Unique human-readable identifier, e.g. `DT-001-2025`.
    pub asset_tag: String,
    pub asset_type: AssetType,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub status: AssetStatus,
    /// Never empty.
    pub drives: Vec<Drive>,
    pub assigned_to: Option<String>,
    /// Recycler partner name the asset is bound for.
    pub recycler_destination: Option<String>,
    pub intake_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Verification evidence
// ---------------------------------------------------------------------------

/// How post-sanitization verification was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    /// A percentage of blocks was read back.
    Sample,
    /// Every block was read back.
    Full,
    /// Visual inspection of destroyed media.
    Visual,
}

keyword_enum!(VerificationMode, "verification mode", {
    Sample => "sample",
    Full => "full",
    Visual => "visual",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationOutcome {
    Pass,
    Fail,
}

/// Read-back verification results recorded on a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub mode: VerificationMode,
    /// Share of the media that was read back (0..=100).
    pub percent: u8,
    pub result: VerificationOutcome,
    pub blocks_verified: u64,
    pub errors: u64,
}

// ---------------------------------------------------------------------------
// Blockchain anchoring
// ---------------------------------------------------------------------------

/// Confirmation status of an anchor transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorStatus {
    Pending,
    Confirmed,
    Failed,
}

keyword_enum!(AnchorStatus, "anchor status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Failed => "failed",
});

/// Display metadata carried alongside an anchor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorMetadata {
    pub device_model: String,
    pub method: String,
    pub operator: Option<String>,
}

/// Anchoring of a certificate's content hash on a distributed ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainRecord {
    pub certificate_id: CertificateId,
    /// `0x`-prefixed 32-byte transaction hash.
    pub transaction_hash: String,
    /// SHA-256 of the canonical certificate body.
    pub cert_hash: String,
    pub network: String,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub status: AnchorStatus,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub metadata: AnchorMetadata,
}

// ---------------------------------------------------------------------------
// Recycler partners and deliveries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerStatus {
    Active,
    Inactive,
    /// Onboarding not finished; deliveries are refused.
    Pending,
}

keyword_enum!(PartnerStatus, "partner status", {
    Active => "active",
    Inactive => "inactive",
    Pending => "pending",
});

/// Recycler certification held by a partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificationLevel {
    R2,
    #[serde(rename = "e-Stewards")]
    EStewards,
    #[serde(rename = "ISO14001")]
    Iso14001,
    Other,
}

keyword_enum!(CertificationLevel, "certification level", {
    R2 => "R2",
    EStewards => "e-Stewards" | "estewards",
    Iso14001 => "ISO14001" | "iso-14001",
    Other => "Other",
});

/// Channel used to hand a certificate to a partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Webhook,
    Email,
    Api,
}

keyword_enum!(DeliveryMethod, "delivery method", {
    Webhook => "webhook",
    Email => "email",
    Api => "api",
});

/// Downstream recycling partner receiving certificates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecyclerPartner {
    pub id: PartnerId,
    /// Unique display name; assets reference partners by this name.
    pub name: String,
    pub contact_email: String,
    pub api_endpoint: String,
    pub webhook_url: Option<String>,
    pub status: PartnerStatus,
    pub certification_level: CertificationLevel,
    pub auto_delivery: bool,
    pub certificates_delivered: u64,
    pub last_delivery: Option<DateTime<Utc>>,
    /// API key sealed with the key vault. Never serialized.
    #[serde(skip)]
    pub sealed_api_key: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl RecyclerPartner {
    pub fn new(
        name: impl Into<String>,
        contact_email: impl Into<String>,
        api_endpoint: impl Into<String>,
        certification_level: CertificationLevel,
    ) -> Self {
        Self {
            id: PartnerId::new(),
            name: name.into(),
            contact_email: contact_email.into(),
            api_endpoint: api_endpoint.into(),
            webhook_url: None,
            status: PartnerStatus::Pending,
            certification_level,
            auto_delivery: false,
            certificates_delivered: 0,
            last_delivery: None,
            sealed_api_key: None,
            created_at: Utc::now(),
        }
    }

    /// Webhook when the partner registered one, otherwise their API.
    pub fn preferred_method(&self) -> DeliveryMethod {
        if self.webhook_url.is_some() {
            DeliveryMethod::Webhook
        } else {
            DeliveryMethod::Api
        }
    }

    pub fn accepts_deliveries(&self) -> bool {
        self.status == PartnerStatus::Active
    }
}

/// Delivery lifecycle: `pending → delivered`, or `pending → failed` once
/// the retry ceiling is hit or a non-retriable error occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    /// Terminal until an operator retries manually.
    Failed,
}

keyword_enum!(DeliveryStatus, "delivery status", {
    Pending => "pending",
    Delivered => "delivered",
    Failed => "failed",
});

/// Classification of errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Network blip, timeout, partner overloaded — safe to retry automatically.
    Transient,
    /// An operator must act (rotate the API key, fix the endpoint).
    UserAction,
    /// Retrying cannot help — payload rejected, bad URL, etc.
    Permanent,
}

/// One certificate handed (or being handed) to one partner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateDelivery {
    pub id: DeliveryId,
    pub certificate_id: CertificateId,
    pub partner_id: PartnerId,
    pub partner_name: String,
    pub method: DeliveryMethod,
    pub status: DeliveryStatus,
    /// Retries scheduled so far.
    pub retry_count: u32,
    /// Retries allowed before the next failure becomes terminal.
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Earliest time the dispatcher may attempt this delivery again.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub error_class: Option<ErrorClass>,
    /// Error messages from each failed attempt, oldest first.
    pub error_history: Vec<String>,
}

impl CertificateDelivery {
    pub fn new(
        certificate_id: CertificateId,
        partner: &RecyclerPartner,
        method: DeliveryMethod,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DeliveryId::new(),
            certificate_id,
            partner_id: partner.id,
            partner_name: partner.name.clone(),
            method,
            status: DeliveryStatus::Pending,
            retry_count: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            next_attempt_at: Some(now),
            delivered_at: None,
            last_error: None,
            error_class: None,
            error_history: Vec::new(),
        }
    }

    /// Whether the dispatcher should attempt this delivery at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Pending
            && self.next_attempt_at.is_none_or(|at| at <= now)
    }
}
