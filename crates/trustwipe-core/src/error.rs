// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for TrustWipe.

use thiserror::Error;

/// Top-level error type for all TrustWipe operations.
#[derive(Debug, Error)]
pub enum TrustwipeError {
    // -- Lifecycle --
    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    Duplicate { kind: &'static str, id: String },

    // -- Certificates and compliance --
    #[error("compliance violation: {0}")]
    ComplianceViolation(String),

    #[error("certificate {0} has already been superseded")]
    AlreadySuperseded(String),

    #[error("drive {serial} on {asset_tag} already has certificate {current}; amend it instead")]
    AlreadyCertified {
        asset_tag: String,
        serial: String,
        current: String,
    },

    #[error("unsupported certificate format: {0}")]
    UnsupportedFormat(String),

    #[error("certificate export failed: {0}")]
    Export(String),

    // -- Security errors --
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("signer {0} is not in the trust store")]
    UntrustedSigner(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    // -- Anchoring --
    #[error("certificate {certificate_id} already has a {status} anchor")]
    AnchorConflict {
        certificate_id: String,
        status: String,
    },

    // -- Delivery --
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("partner responded with HTTP {status}: {detail}")]
    DeliveryRejected { status: u16, detail: String },

    #[error("partner {0} is not accepting deliveries")]
    PartnerUnavailable(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TrustwipeError>;
