// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry policy for certificate deliveries: exponential backoff + jitter.
//
// Classifies errors into Transient (auto-retry), UserAction (wait for an
// operator), and Permanent (give up). Only transient errors are retried.

use std::time::Duration;

use tracing::{debug, info, warn};
use trustwipe_core::config::AppConfig;
use trustwipe_core::error::TrustwipeError;
use trustwipe_core::types::ErrorClass;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Per-delivery jitter seed; deliveries failing together get
    /// different delays.
    pub jitter_seed: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RetryConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_retries: config.max_delivery_retries,
            base_delay: Duration::from_secs(config.retry_base_delay_secs),
            max_delay: Duration::from_secs(config.retry_max_delay_secs),
            jitter_seed: 0,
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry; the error is permanent or needs an operator.
    GiveUp(ErrorClass),
    /// Maximum retries exhausted.
    Exhausted,
}

/// Classify a delivery error for retry decisions.
pub fn classify_error(err: &TrustwipeError) -> ErrorClass {
    match err {
        TrustwipeError::DeliveryRejected { status, .. } => classify_status(*status),

        // Transient: network, timeouts, local hiccups
        TrustwipeError::Delivery(_) => ErrorClass::Transient,
        TrustwipeError::Database(_) => ErrorClass::Transient,

        // An operator must act
        TrustwipeError::PartnerUnavailable(_) => ErrorClass::UserAction,
        TrustwipeError::Decryption(_) => ErrorClass::UserAction,

        TrustwipeError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorClass::UserAction
            }
            _ => ErrorClass::Transient,
        },

        // Everything else is a bad payload or a bug; retrying cannot help.
        _ => ErrorClass::Permanent,
    }
}

/// Map a partner HTTP status to an error class.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        408 | 429 => ErrorClass::Transient,
        401 | 403 => ErrorClass::UserAction,
        400..=499 => ErrorClass::Permanent,
        _ => ErrorClass::Transient,
    }
}

/// Decide whether to retry after a failure, given how many retries the
/// delivery has already used.
pub fn should_retry(err: &TrustwipeError, retries_used: u32, config: &RetryConfig) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::Permanent => {
            info!("permanent error, not retrying");
            RetryDecision::GiveUp(ErrorClass::Permanent)
        }
        ErrorClass::UserAction => {
            info!("operator action required, not auto-retrying");
            RetryDecision::GiveUp(ErrorClass::UserAction)
        }
        ErrorClass::Transient => {
            if retries_used >= config.max_retries {
                warn!(retries_used, max = config.max_retries, "retry limit exhausted");
                RetryDecision::Exhausted
            } else {
                let delay = compute_delay(retries_used, config);
                debug!(retries_used, delay_ms = delay.as_millis(), "scheduling retry");
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}

/// Exponential backoff with jitter.
///
/// delay = min(base * 2^attempt + jitter, max_delay)
/// jitter is a value in [0, base) derived from `jitter_seed` and the attempt,
/// so retries of different deliveries spread out.
pub fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = millis(config.base_delay);
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt, config.jitter_seed));
    let capped_ms = total_ms.min(millis(config.max_delay));
    Duration::from_millis(capped_ms)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Deterministic spread in [0, base) from the seed and attempt number.
fn jitter(base_ms: u64, attempt: u32, seed: u64) -> u64 {
    let mut x = seed ^ (attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    // splitmix64 finaliser
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^= x >> 31;
    x % base_ms.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        for status in [408, 429, 500, 502, 503] {
            let err = TrustwipeError::DeliveryRejected {
                status,
                detail: String::new(),
            };
            assert_eq!(classify_error(&err), ErrorClass::Transient, "{status}");
        }
        let err = TrustwipeError::Delivery("connection refused".into());
        assert_eq!(classify_error(&err), ErrorClass::Transient);
    }

    #[test]
    fn rejected_key_needs_operator() {
        let err = TrustwipeError::DeliveryRejected {
            status: 401,
            detail: "invalid API key".into(),
        };
        assert_eq!(classify_error(&err), ErrorClass::UserAction);
    }

    #[test]
    fn bad_payload_is_permanent() {
        let err = TrustwipeError::DeliveryRejected {
            status: 422,
            detail: "unknown asset".into(),
        };
        assert_eq!(classify_error(&err), ErrorClass::Permanent);
        assert_eq!(
            classify_error(&TrustwipeError::Validation("bad url".into())),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn retry_respects_max() {
        let config = RetryConfig {
            max_retries: 3,
            ..Default::default()
        };
        let err = TrustwipeError::Delivery("timed out".into());
        assert!(matches!(should_retry(&err, 0, &config), RetryDecision::RetryAfter(_)));
        assert!(matches!(should_retry(&err, 2, &config), RetryDecision::RetryAfter(_)));
        assert_eq!(should_retry(&err, 3, &config), RetryDecision::Exhausted);
    }

    #[test]
    fn permanent_error_never_retries() {
        let err = TrustwipeError::DeliveryRejected {
            status: 400,
            detail: String::new(),
        };
        assert_eq!(
            should_retry(&err, 0, &RetryConfig::default()),
            RetryDecision::GiveUp(ErrorClass::Permanent)
        );
    }

    #[test]
    fn delay_increases_with_attempts() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(3600),
            ..Default::default()
        };
        let d0 = compute_delay(0, &config);
        let d1 = compute_delay(1, &config);
        let d2 = compute_delay(2, &config);
        assert!(d1 > d0);
        assert!(d2 > d1);
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert!(compute_delay(20, &config) <= Duration::from_secs(10));
    }

    #[test]
    fn seeds_spread_the_same_attempt() {
        let delays: std::collections::HashSet<Duration> = (1..=8u64)
            .map(|seed| {
                let config = RetryConfig {
                    max_delay: Duration::from_secs(3600),
                    jitter_seed: seed.wrapping_mul(0x0123_4567_89AB_CDEF),
                    ..Default::default()
                };
                compute_delay(1, &config)
            })
            .collect();
        assert!(delays.len() > 1);

        let config = RetryConfig {
            jitter_seed: 42,
            ..Default::default()
        };
        assert_eq!(compute_delay(2, &config), compute_delay(2, &config));
        let base = config.base_delay;
        assert!(compute_delay(0, &config) < base * 2);
    }

    #[test]
    fn defaults_follow_app_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay, Duration::from_secs(30));
    }
}
