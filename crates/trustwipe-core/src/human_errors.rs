// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing error messages.
//
// Every technical error is mapped to a plain summary with a concrete next
// step for the technician at the wiping station.

use crate::error::TrustwipeError;

/// Severity of an error from the operator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip, timeout — the system will retry.
    Transient,
    /// The operator must do something before trying again.
    ActionRequired,
    /// Retrying the same input cannot succeed.
    Permanent,
}

/// A human-readable error with a summary and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: impl Into<String>, suggestion: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable: severity == Severity::Transient,
            severity,
        }
    }
}

/// Convert a `TrustwipeError` into a `HumanError` for display.
pub fn humanize_error(err: &TrustwipeError) -> HumanError {
    use Severity::*;

    match err {
        TrustwipeError::InvalidTransition { entity, from, to } => HumanError::new(
            format!("This {entity} can't move from {from} to {to}."),
            "Check the current status with `list` and follow the intake → queued → wiping → verified → released order.",
            ActionRequired,
        ),

        TrustwipeError::Validation(detail) => HumanError::new(
            "Some of the details entered aren't valid.",
            format!("Correct the input and try again. ({detail})"),
            ActionRequired,
        ),

        TrustwipeError::NotFound { kind, id } => HumanError::new(
            format!("No {kind} called {id} was found."),
            "Check the spelling, or list existing records first.",
            ActionRequired,
        ),

        TrustwipeError::Duplicate { kind, id } => HumanError::new(
            format!("A {kind} called {id} already exists."),
            "Use a different identifier, or work with the existing record.",
            ActionRequired,
        ),

        TrustwipeError::ComplianceViolation(detail) => HumanError::new(
            "This sanitization doesn't meet NIST SP 800-88 requirements.",
            format!("Re-run the wipe with an accepted method and verification. ({detail})"),
            ActionRequired,
        ),

        TrustwipeError::AlreadySuperseded(id) => HumanError::new(
            format!("Certificate {id} has already been amended."),
            "Amend the newest certificate in the chain instead.",
            ActionRequired,
        ),

        TrustwipeError::AlreadyCertified { serial, current, .. } => HumanError::new(
            format!("Drive {serial} already has certificate {current}."),
            format!("To correct it, run `trustwipe cert amend {current}` with the new evidence."),
            ActionRequired,
        ),

        TrustwipeError::UnsupportedFormat(_) => HumanError::new(
            "Invalid certificate format. Expected JSON or P7S file.",
            "Upload the certificate JSON exported by TrustWipe, with its detached signature.",
            Permanent,
        ),

        TrustwipeError::Export(detail) => HumanError::new(
            "The certificate couldn't be exported.",
            format!("Try exporting as JSON instead. ({detail})"),
            Permanent,
        ),

        TrustwipeError::IntegrityMismatch { .. } => HumanError::new(
            "This file has been changed since it was recorded.",
            "The content hash doesn't match. Obtain the original file from the issuer.",
            Permanent,
        ),

        TrustwipeError::Signing(_) => HumanError::new(
            "The certificate couldn't be signed.",
            "The signing key may be damaged. Move signing_key.age aside and run `trustwipe init` to create a new one.",
            Permanent,
        ),

        TrustwipeError::SignatureInvalid(_) => HumanError::new(
            "Signature verification failed. Certificate may be tampered with.",
            "Don't accept this certificate. Request a fresh copy from the issuer.",
            Permanent,
        ),

        TrustwipeError::UntrustedSigner(_) => HumanError::new(
            "The certificate is signed by an untrusted CA.",
            "Add the issuer's public key to the trust store if you trust them.",
            ActionRequired,
        ),

        TrustwipeError::Encryption(_) | TrustwipeError::Decryption(_) => HumanError::new(
            "There was a problem with the key vault.",
            "Check that TRUSTWIPE_VAULT_PASSPHRASE is set to the passphrase used at setup.",
            ActionRequired,
        ),

        TrustwipeError::AnchorConflict { certificate_id, status } => HumanError::new(
            format!("Certificate {certificate_id} already has a {status} ledger record."),
            "Wait for the pending record to resolve, or verify the confirmed one.",
            ActionRequired,
        ),

        TrustwipeError::Delivery(detail) => HumanError::new(
            "The certificate couldn't be delivered to the recycler.",
            format!("Delivery will be retried automatically. ({detail})"),
            Transient,
        ),

        TrustwipeError::DeliveryRejected { status, .. } => match status {
            401 | 403 => HumanError::new(
                "The recycler rejected our credentials.",
                "Update the partner's API key, then retry the delivery.",
                ActionRequired,
            ),
            408 | 429 | 500..=599 => HumanError::new(
                "The recycler's system is busy or unavailable.",
                "Delivery will be retried automatically.",
                Transient,
            ),
            _ => HumanError::new(
                format!("The recycler refused the certificate (HTTP {status})."),
                "Contact the partner to check what their endpoint expects.",
                Permanent,
            ),
        },

        TrustwipeError::PartnerUnavailable(name) => HumanError::new(
            format!("{name} isn't accepting certificates right now."),
            "Activate the partner once onboarding is complete.",
            ActionRequired,
        ),

        TrustwipeError::Database(_) => HumanError::new(
            "The local ledger couldn't be read or written.",
            "Make sure the data directory is writable and not on a full disk.",
            Transient,
        ),

        TrustwipeError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError::new(
                "A file couldn't be found.",
                "Check the path and try again.",
                ActionRequired,
            ),
            std::io::ErrorKind::PermissionDenied => HumanError::new(
                "Permission denied.",
                "Check file permissions on the data directory.",
                ActionRequired,
            ),
            _ => HumanError::new(
                "A file operation failed.",
                "Try again; if it keeps failing check free disk space.",
                Transient,
            ),
        },

        TrustwipeError::Serialization(_) => HumanError::new(
            "The file isn't valid TrustWipe JSON.",
            "Make sure the file wasn't truncated or edited by hand.",
            Permanent,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_rejection_needs_operator() {
        let human = humanize_error(&TrustwipeError::DeliveryRejected {
            status: 401,
            detail: "invalid key".into(),
        });
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }

    #[test]
    fn server_error_is_transient() {
        let human = humanize_error(&TrustwipeError::DeliveryRejected {
            status: 503,
            detail: "maintenance".into(),
        });
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn second_certificate_points_at_amend() {
        let human = humanize_error(&TrustwipeError::AlreadyCertified {
            asset_tag: "LT-002-2025".into(),
            serial: "S6B2NS0R123456A".into(),
            current: "swc-2025-09-08-A1B2C3".into(),
        });
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.suggestion.contains("trustwipe cert amend swc-2025-09-08-A1B2C3"));
    }

    #[test]
    fn unsupported_upload_message() {
        let human = humanize_error(&TrustwipeError::UnsupportedFormat("notes.txt".into()));
        assert_eq!(human.message, "Invalid certificate format. Expected JSON or P7S file.");
        assert_eq!(human.severity, Severity::Permanent);
    }

    #[test]
    fn transition_message_names_states() {
        let human = humanize_error(&TrustwipeError::InvalidTransition {
            entity: "asset",
            from: "intake".into(),
            to: "wiping".into(),
        });
        assert!(human.message.contains("intake"));
        assert!(human.message.contains("wiping"));
    }
}
