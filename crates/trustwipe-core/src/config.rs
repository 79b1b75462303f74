// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrustwipeError};

/// Longest wait any retry, cooldown, or delivery timeout may be set to.
pub const MAX_DELAY_SECS: u64 = 7 * 24 * 60 * 60;

/// Persistent application settings.
///
/// Missing fields fall back to their defaults so older `config.json` files
/// keep loading after new settings are introduced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Operator recorded on issued certificates and anchor metadata.
    pub operator: Option<String>,
    /// Issuer name shown for the signing key in the trust store.
    pub ca_name: String,
    /// Failed delivery attempts allowed before a delivery becomes terminal.
    pub max_delivery_retries: u32,
    /// Base delay between delivery retries (exponential backoff).
    pub retry_base_delay_secs: u64,
    /// Upper bound on the delay between delivery retries.
    pub retry_max_delay_secs: u64,
    /// HTTP timeout for a single delivery attempt.
    pub delivery_timeout_secs: u64,
    /// Consecutive failures before a partner's circuit opens.
    pub partner_failure_threshold: u32,
    /// Cooldown before an open partner circuit lets one trial delivery through.
    pub partner_cooldown_secs: u64,
    /// Hold deliveries until the certificate has a confirmed anchor.
    pub require_anchor_before_delivery: bool,
    /// Pending anchors older than this are marked failed.
    pub anchor_timeout_minutes: u32,
    /// Confirmations needed before an anchor counts as final.
    pub min_confirmations: u64,
    /// Ledger network name (display only).
    pub network_name: String,
    /// Registry contract address (display only).
    pub contract_address: String,
    /// Public verification page prefix; the certificate ID is appended.
    pub certificate_base_url: String,
    /// PDF download prefix; `<id>.pdf` is appended.
    pub pdf_base_url: String,
    /// Spool directory for email deliveries. Defaults to `<data dir>/outbox`.
    pub outbox_dir: Option<PathBuf>,
    /// Enable audit trail logging.
    pub audit_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            operator: None,
            ca_name: "SecureWipe CA v2.1".into(),
            max_delivery_retries: 3,
            retry_base_delay_secs: 30,
            retry_max_delay_secs: 3600,
            delivery_timeout_secs: 30,
            partner_failure_threshold: 3,
            partner_cooldown_secs: 300,
            require_anchor_before_delivery: false,
            anchor_timeout_minutes: 60,
            min_confirmations: 12,
            network_name: "Polygon (MATIC) Mainnet".into(),
            contract_address: "0x742d35Cc6634C0532925a3b8D36C2A1f2BCB4153".into(),
            certificate_base_url: "https://verify.trustwipe.com".into(),
            pdf_base_url: "https://certs.trustwipe.com".into(),
            outbox_dir: None,
            audit_enabled: true,
        }
    }
}

impl AppConfig {
    /// Reject settings that would make the retry or anchoring policy
    /// meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.retry_base_delay_secs == 0 {
            return Err(TrustwipeError::Validation(
                "retry_base_delay_secs must be at least 1".into(),
            ));
        }
        if self.retry_base_delay_secs > self.retry_max_delay_secs {
            return Err(TrustwipeError::Validation(
                "retry_base_delay_secs must not exceed retry_max_delay_secs".into(),
            ));
        }
        for (name, secs) in [
            ("retry_max_delay_secs", self.retry_max_delay_secs),
            ("partner_cooldown_secs", self.partner_cooldown_secs),
            ("delivery_timeout_secs", self.delivery_timeout_secs),
        ] {
            if secs > MAX_DELAY_SECS {
                return Err(TrustwipeError::Validation(format!(
                    "{name} must not exceed {MAX_DELAY_SECS} (7 days), got {secs}"
                )));
            }
        }
        if self.anchor_timeout_minutes == 0 {
            return Err(TrustwipeError::Validation(
                "anchor_timeout_minutes must be at least 1".into(),
            ));
        }
        for (name, url) in [
            ("certificate_base_url", &self.certificate_base_url),
            ("pdf_base_url", &self.pdf_base_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(TrustwipeError::Validation(format!(
                    "{name} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "max_delivery_retries": 5, "operator": "operator-001" }"#)
                .unwrap();
        assert_eq!(config.max_delivery_retries, 5);
        assert_eq!(config.operator.as_deref(), Some("operator-001"));
        assert_eq!(config.min_confirmations, 12);
    }

    #[test]
    fn inverted_backoff_rejected() {
        let config = AppConfig {
            retry_base_delay_secs: 600,
            retry_max_delay_secs: 60,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn week_long_delays_are_the_ceiling() {
        let at_cap = AppConfig {
            retry_max_delay_secs: MAX_DELAY_SECS,
            partner_cooldown_secs: MAX_DELAY_SECS,
            ..Default::default()
        };
        at_cap.validate().unwrap();

        let config = AppConfig {
            retry_max_delay_secs: u64::MAX,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry_max_delay_secs"));

        let config = AppConfig {
            partner_cooldown_secs: MAX_DELAY_SECS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_http_url_rejected() {
        let config = AppConfig {
            pdf_base_url: "ftp://certs".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
