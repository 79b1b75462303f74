// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// NIST SP 800-88 / ISO/IEC 27040 compliance mapping.
//
// Encodes which sanitization techniques are valid for which media, what
// verification each NIST category demands, and the ISO/IEC 27002 controls a
// certificate provides evidence for.

use crate::error::{Result, TrustwipeError};
use crate::types::{
    DriveType, NistCategory, SanitizationMethod, VerificationMode, VerificationOutcome,
    VerificationSummary,
};

use crate::types::SanitizationMethod as M;

/// Compliance tag written on every certificate for NIST SP 800-88.
pub const NIST_SP_800_88_TAG: &str = "Rev.1 Compliant";
/// Compliance tag written on every certificate for ISO/IEC 27040.
pub const ISO_IEC_27040_TAG: &str = "Aligned";

/// What a NIST category requires as proof that sanitization worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationRequirement {
    /// Read-back is optional.
    Optional,
    /// A read-back sample is mandatory.
    RequiredSampling,
    /// Destroyed media must be visually inspected.
    VisualInspection,
}

/// Static description of a NIST category, as shown to operators.
#[derive(Debug, Clone, Copy)]
pub struct CategoryProfile {
    pub category: NistCategory,
    pub description: &'static str,
    pub verification: VerificationRequirement,
    pub use_case: &'static str,
}

pub const CATEGORY_PROFILES: &[CategoryProfile] = &[
    CategoryProfile {
        category: NistCategory::Clear,
        description: "Logical sanitization using standard Read/Write commands",
        verification: VerificationRequirement::Optional,
        use_case: "Internal reallocation, non-sensitive data",
    },
    CategoryProfile {
        category: NistCategory::Purge,
        description: "Sanitization that defeats laboratory recovery using device commands or cryptographic erase",
        verification: VerificationRequirement::RequiredSampling,
        use_case: "Controlled environments, regulatory compliance",
    },
    CategoryProfile {
        category: NistCategory::Destroy,
        description: "Physical destruction of storage media",
        verification: VerificationRequirement::VisualInspection,
        use_case: "Highest security requirements, end-of-life",
    },
];

pub fn category_profile(category: NistCategory) -> &'static CategoryProfile {
    CATEGORY_PROFILES
        .iter()
        .find(|p| p.category == category)
        .unwrap_or(&CATEGORY_PROFILES[0])
}

/// Relative risk that data survives a naive wipe on this media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Medium,
    High,
}

/// Per-media sanitization guidance.
#[derive(Debug, Clone, Copy)]
pub struct MediaGuidance {
    pub drive_type: DriveType,
    pub methods: &'static [SanitizationMethod],
    pub notes: &'static str,
    pub risk: RiskLevel,
}

pub const MEDIA_GUIDANCE: &[MediaGuidance] = &[
    MediaGuidance {
        drive_type: DriveType::Hdd,
        methods: &[
            M::Overwrite,
            M::AtaSecureErase,
            M::AtaEnhancedSecureErase,
            M::ScsiSanitize,
            M::PhysicalDestruction,
        ],
        notes: "Remove HPA/DCO before sanitization. Enhanced Secure Erase preferred.",
        risk: RiskLevel::Medium,
    },
    MediaGuidance {
        drive_type: DriveType::Ssd,
        methods: &[
            M::TrimOverwrite,
            M::AtaSecureErase,
            M::AtaEnhancedSecureErase,
            M::CryptoErase,
            M::ScsiSanitize,
            M::PhysicalDestruction,
        ],
        notes: "Prefer sanitize command or crypto erase. Wear leveling considerations.",
        risk: RiskLevel::High,
    },
    MediaGuidance {
        drive_type: DriveType::Nvme,
        methods: &[
            M::TrimOverwrite,
            M::NvmeSanitizeBlockErase,
            M::NvmeSanitizeCryptoErase,
            M::CryptoErase,
            M::PhysicalDestruction,
        ],
        notes: "Use NVMe Sanitize where supported; Format NVM alone is not sufficient for Purge.",
        risk: RiskLevel::High,
    },
    MediaGuidance {
        drive_type: DriveType::Flash,
        methods: &[M::Overwrite, M::ControllerErase, M::PhysicalDestruction],
        notes: "Controller-dependent. May require multiple methods for complete sanitization.",
        risk: RiskLevel::High,
    },
];

pub fn media_guidance(drive_type: DriveType) -> &'static MediaGuidance {
    MEDIA_GUIDANCE
        .iter()
        .find(|g| g.drive_type == drive_type)
        .unwrap_or(&MEDIA_GUIDANCE[0])
}

/// An ISO/IEC 27002 control a sanitization certificate evidences.
#[derive(Debug, Clone, Copy)]
pub struct IsoControl {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub implementation: &'static str,
}

pub const ISO_CONTROLS: &[IsoControl] = &[
    IsoControl {
        id: "A.8.3.2",
        title: "Disposal or reuse of equipment",
        description: "Equipment containing storage media shall be verified to ensure sensitive data has been removed",
        implementation: "Certificate-based verification of sanitization before disposal/reuse",
    },
    IsoControl {
        id: "A.11.2.7",
        title: "Secure disposal or reuse",
        description: "Items containing sensitive information shall be securely disposed of when no longer required",
        implementation: "NIST-compliant sanitization methods with cryptographic verification",
    },
    IsoControl {
        id: "A.10.1.2",
        title: "Key management",
        description: "Cryptographic keys shall be protected against unauthorized disclosure and modification",
        implementation: "Cryptographic Erase for FDE-enabled devices with key destruction evidence",
    },
];

/// Reject a technique that is not valid for the drive's media type.
pub fn check_method(drive_type: DriveType, method: SanitizationMethod) -> Result<()> {
    if media_guidance(drive_type).methods.contains(&method) {
        Ok(())
    } else {
        Err(TrustwipeError::ComplianceViolation(format!(
            "{} is not an accepted technique for {} media",
            method.display_name(),
            drive_type
        )))
    }
}

/// Reject verification evidence that does not meet the category's bar.
pub fn check_verification(category: NistCategory, summary: &VerificationSummary) -> Result<()> {
    if summary.percent > 100 {
        return Err(TrustwipeError::Validation(format!(
            "verification percent {} exceeds 100",
            summary.percent
        )));
    }
    if summary.result != VerificationOutcome::Pass || summary.errors > 0 {
        return Err(TrustwipeError::ComplianceViolation(format!(
            "verification did not pass ({} errors)",
            summary.errors
        )));
    }
    if summary.mode == VerificationMode::Full && summary.percent != 100 {
        return Err(TrustwipeError::Validation(
            "full verification must cover 100% of the media".into(),
        ));
    }

    match category_profile(category).verification {
        VerificationRequirement::Optional => {
            if summary.mode == VerificationMode::Visual {
                return Err(TrustwipeError::ComplianceViolation(
                    "visual inspection is only meaningful for destroyed media".into(),
                ));
            }
        }
        VerificationRequirement::RequiredSampling => {
            if summary.mode == VerificationMode::Visual || summary.percent == 0 {
                return Err(TrustwipeError::ComplianceViolation(
                    "Purge requires read-back verification of a non-zero sample".into(),
                ));
            }
        }
        VerificationRequirement::VisualInspection => {
            if summary.mode != VerificationMode::Visual {
                return Err(TrustwipeError::ComplianceViolation(
                    "Destroy requires visual inspection of the destroyed media".into(),
                ));
            }
        }
    }
    Ok(())
}

/// One-line rationale recorded on the certificate for the chosen method.
pub fn method_rationale(method: SanitizationMethod) -> String {
    match method.nist_category() {
        NistCategory::Clear => format!(
            "{} applies logical techniques sufficient for Clear per NIST SP 800-88",
            method.display_name()
        ),
        NistCategory::Purge => format!(
            "{} renders data recovery infeasible with state-of-the-art laboratory techniques (Purge per NIST SP 800-88)",
            method.display_name()
        ),
        NistCategory::Destroy => format!(
            "{} leaves the media unusable for data storage (Destroy per NIST SP 800-88)",
            method.display_name()
        ),
    }
}
