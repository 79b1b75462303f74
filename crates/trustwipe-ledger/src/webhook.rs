// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Payload pushed to recycler partners when a certificate is delivered.

use serde::{Deserialize, Serialize};
use trustwipe_certificate::SignedCertificate;
use trustwipe_core::config::AppConfig;
use trustwipe_core::types::{AnchorStatus, BlockchainRecord};

pub use trustwipe_core::types::format_capacity;

pub const DELIVERED_EVENT: &str = "certificate.delivered";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookDevice {
    pub model: String,
    pub serial: String,
    /// Vendor-style label such as `1TB`.
    pub capacity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSanitization {
    pub method: String,
    pub category: String,
    /// Wipe completion time, `YYYY-MM-DDTHH:MM:SSZ`.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookVerification {
    /// Transaction hash of the confirmed anchor, if there is one.
    pub blockchain_hash: Option<String>,
    pub certificate_url: String,
    pub pdf_url: String,
}

/// The `certificate.delivered` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub certificate_id: String,
    pub asset_tag: String,
    pub device: WebhookDevice,
    pub sanitization: WebhookSanitization,
    pub verification: WebhookVerification,
}

impl WebhookPayload {
    /// Build the envelope for `signed`. Only a confirmed anchor contributes
    /// a blockchain hash.
    pub fn build(
        signed: &SignedCertificate,
        anchor: Option<&BlockchainRecord>,
        config: &AppConfig,
    ) -> Self {
        let cert = &signed.certificate;
        let id = cert.certificate_id.as_str();
        Self {
            event: DELIVERED_EVENT.to_owned(),
            certificate_id: id.to_owned(),
            asset_tag: cert.asset_tag.clone(),
            device: WebhookDevice {
                model: cert.device.model.clone(),
                serial: cert.device.serial.clone(),
                capacity: format_capacity(cert.device.capacity_bytes),
            },
            sanitization: WebhookSanitization {
                method: cert.method.display_name().to_owned(),
                category: cert.nist_category.to_string(),
                timestamp: cert.end_time_utc.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            },
            verification: WebhookVerification {
                blockchain_hash: anchor
                    .filter(|a| a.status == AnchorStatus::Confirmed)
                    .map(|a| a.transaction_hash.clone()),
                certificate_url: format!(
                    "{}/{id}",
                    config.certificate_base_url.trim_end_matches('/')
                ),
                pdf_url: format!("{}/{id}.pdf", config.pdf_base_url.trim_end_matches('/')),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use trustwipe_certificate::issue_certificate;
    use trustwipe_core::types::AnchorMetadata;
    use trustwipe_security::CertificateSigner;

    use super::*;
    use crate::test_support::{sample_run, wiped_laptop};

    fn signed() -> SignedCertificate {
        let signer = CertificateSigner::generate().unwrap();
        let asset = wiped_laptop("DT-001-2025");
        issue_certificate(&asset, asset.drives[0].id, &sample_run(), &signer, None).unwrap()
    }

    #[test]
    fn envelope_shape() {
        let signed = signed();
        let config = AppConfig {
            certificate_base_url: "https://verify.trustwipe.com/".into(),
            pdf_base_url: "https://certs.trustwipe.com".into(),
            ..Default::default()
        };
        let payload = WebhookPayload::build(&signed, None, &config);
        let id = signed.id().as_str();

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["event"], "certificate.delivered");
        assert_eq!(json["certificate_id"], id);
        assert_eq!(json["asset_tag"], "DT-001-2025");
        assert_eq!(json["device"]["model"], "Samsung 980 Pro");
        assert_eq!(json["device"]["serial"], "S6B2NS0R123456A");
        assert_eq!(json["device"]["capacity"], "2TB");
        assert_eq!(json["sanitization"]["method"], "NVMe Sanitize (Block Erase)");
        assert_eq!(json["sanitization"]["category"], "Purge");
        assert!(json["sanitization"]["timestamp"].as_str().unwrap().ends_with('Z'));
        assert!(json["verification"]["blockchain_hash"].is_null());
        assert_eq!(
            json["verification"]["certificate_url"],
            format!("https://verify.trustwipe.com/{id}")
        );
        assert_eq!(
            json["verification"]["pdf_url"],
            format!("https://certs.trustwipe.com/{id}.pdf")
        );
    }

    #[test]
    fn only_confirmed_anchor_hash_is_sent() {
        let signed = signed();
        let mut anchor = BlockchainRecord::pending(
            signed.id().clone(),
            format!("0x{}", "1a".repeat(32)),
            signed.content_hash().unwrap(),
            "Ethereum Mainnet",
            AnchorMetadata {
                device_model: "Samsung 980 Pro".into(),
                method: "NVMe Sanitize".into(),
                operator: None,
            },
            Utc::now(),
        )
        .unwrap();
        let config = AppConfig::default();

        let payload = WebhookPayload::build(&signed, Some(&anchor), &config);
        assert!(payload.verification.blockchain_hash.is_none());

        anchor.confirm(18_234_567, 21_000, Utc::now()).unwrap();
        let payload = WebhookPayload::build(&signed, Some(&anchor), &config);
        assert_eq!(
            payload.verification.blockchain_hash.as_deref(),
            Some(anchor.transaction_hash.as_str())
        );
    }
}
