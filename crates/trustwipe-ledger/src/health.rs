// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Partner health tracking with a circuit breaker.
//
// If a partner endpoint keeps failing, stop sending it deliveries that will
// just time out. Skip it until a cooldown passes, then let one trial
// delivery through to see whether it has recovered.
//
// Times are passed in rather than read from the clock so the tracker can be
// saved between CLI runs and tested without sleeping.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use trustwipe_core::config::AppConfig;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; deliveries pass through.
    Closed,
    /// Too many failures; deliveries are skipped until the cooldown ends.
    Open,
    /// Cooldown over; one trial delivery is in flight.
    HalfOpen,
}

/// Health of a single partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerHealth {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for PartnerHealth {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            last_success: None,
            last_error: None,
        }
    }
}

/// Circuit breakers for every partner, keyed by partner name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthTracker {
    partners: HashMap<String, PartnerHealth>,
    failure_threshold: u32,
    /// Cooldown after the circuit first opens. Longer failure streaks
    /// stretch it.
    base_cooldown_secs: u64,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(3, 300)
    }
}

impl From<&AppConfig> for HealthTracker {
    fn from(config: &AppConfig) -> Self {
        Self::new(config.partner_failure_threshold, config.partner_cooldown_secs)
    }
}

impl HealthTracker {
    pub fn new(failure_threshold: u32, base_cooldown_secs: u64) -> Self {
        Self {
            partners: HashMap::new(),
            failure_threshold: failure_threshold.max(1),
            base_cooldown_secs,
        }
    }

    /// Take thresholds from `config`, keeping recorded partner state.
    pub fn reconfigure(&mut self, config: &AppConfig) {
        self.failure_threshold = config.partner_failure_threshold.max(1);
        self.base_cooldown_secs = config.partner_cooldown_secs;
    }

    /// Whether a delivery to `partner` should be attempted at `now`.
    ///
    /// `true` when the circuit is closed, or when an open circuit's cooldown
    /// has ended (the circuit goes half-open and this call is the trial).
    pub fn allow_request(&mut self, partner: &str, now: DateTime<Utc>) -> bool {
        let cooldown_base = self.base_cooldown_secs;
        let health = self.partners.entry(partner.to_owned()).or_default();

        match health.state {
            CircuitState::Closed => true,
            CircuitState::Open => match health.opened_at {
                Some(opened_at) => {
                    let cooldown = cooldown_duration(cooldown_base, health.consecutive_failures);
                    if now - opened_at >= cooldown {
                        info!(partner, "circuit half-open, allowing trial delivery");
                        health.state = CircuitState::HalfOpen;
                        true
                    } else {
                        debug!(
                            partner,
                            remaining_secs = (cooldown - (now - opened_at)).num_seconds(),
                            "circuit open, skipping partner"
                        );
                        false
                    }
                }
                None => {
                    health.state = CircuitState::Closed;
                    true
                }
            },
            // A trial is already out.
            CircuitState::HalfOpen => false,
        }
    }

    pub fn record_success(&mut self, partner: &str, now: DateTime<Utc>) {
        let health = self.partners.entry(partner.to_owned()).or_default();
        if health.state != CircuitState::Closed {
            info!(partner, prev_state = ?health.state, "partner recovered, closing circuit");
        }
        health.state = CircuitState::Closed;
        health.consecutive_failures = 0;
        health.opened_at = None;
        health.last_success = Some(now);
        health.last_error = None;
    }

    pub fn record_failure(&mut self, partner: &str, error: &str, now: DateTime<Utc>) {
        let threshold = self.failure_threshold;
        let health = self.partners.entry(partner.to_owned()).or_default();
        health.consecutive_failures += 1;
        health.last_error = Some(error.to_owned());

        if health.state == CircuitState::HalfOpen {
            warn!(partner, "trial delivery failed, reopening circuit");
            health.state = CircuitState::Open;
            health.opened_at = Some(now);
        } else if health.consecutive_failures >= threshold && health.state != CircuitState::Open {
            warn!(partner, failures = health.consecutive_failures, "opening circuit for partner");
            health.state = CircuitState::Open;
            health.opened_at = Some(now);
        }
    }

    pub fn get_health(&self, partner: &str) -> Option<&PartnerHealth> {
        self.partners.get(partner)
    }

    /// Operator-facing status, or `None` while the partner is healthy.
    pub fn status_message(&self, partner: &str, now: DateTime<Utc>) -> Option<String> {
        let health = self.partners.get(partner)?;
        match health.state {
            CircuitState::Closed => None,
            CircuitState::Open => {
                let cooldown =
                    cooldown_duration(self.base_cooldown_secs, health.consecutive_failures);
                let remaining = health
                    .opened_at
                    .map(|t| (cooldown - (now - t)).max(Duration::zero()))
                    .unwrap_or_else(Duration::zero);
                Some(format!(
                    "{partner} is having trouble ({} failures). Deliveries resume in {} seconds.",
                    health.consecutive_failures,
                    remaining.num_seconds()
                ))
            }
            CircuitState::HalfOpen => Some(format!("Checking whether {partner} has recovered...")),
        }
    }
}

/// Cooldown for a failure streak: the base, doubled from 5 failures,
/// quadrupled from 10.
fn cooldown_duration(base_secs: u64, failures: u32) -> Duration {
    let factor = if failures >= 10 {
        4
    } else if failures >= 5 {
        2
    } else {
        1
    };
    Duration::seconds(base_secs.saturating_mul(factor).min(i64::MAX as u64) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREENTECH: &str = "GreenTech Recycling";

    #[test]
    fn new_partner_allows_requests() {
        let mut tracker = HealthTracker::default();
        assert!(tracker.allow_request(GREENTECH, Utc::now()));
    }

    #[test]
    fn circuit_opens_after_threshold() {
        let mut tracker = HealthTracker::new(3, 60);
        let now = Utc::now();

        tracker.record_failure(GREENTECH, "HTTP 503", now);
        tracker.record_failure(GREENTECH, "HTTP 503", now);
        assert!(tracker.allow_request(GREENTECH, now));

        tracker.record_failure(GREENTECH, "HTTP 503", now);
        assert!(!tracker.allow_request(GREENTECH, now));
        assert!(
            tracker
                .status_message(GREENTECH, now)
                .unwrap()
                .contains("having trouble")
        );
    }

    #[test]
    fn cooldown_allows_one_trial() {
        let mut tracker = HealthTracker::new(1, 60);
        let now = Utc::now();
        tracker.record_failure(GREENTECH, "timeout", now);

        let later = now + Duration::seconds(61);
        assert!(tracker.allow_request(GREENTECH, later));
        assert_eq!(tracker.get_health(GREENTECH).unwrap().state, CircuitState::HalfOpen);
        assert!(!tracker.allow_request(GREENTECH, later));

        tracker.record_failure(GREENTECH, "timeout", later);
        assert!(!tracker.allow_request(GREENTECH, later + Duration::seconds(30)));
    }

    #[test]
    fn success_resets_circuit() {
        let mut tracker = HealthTracker::new(3, 60);
        let now = Utc::now();
        for _ in 0..5 {
            tracker.record_failure(GREENTECH, "error", now);
        }
        assert!(!tracker.allow_request(GREENTECH, now));

        tracker.record_success(GREENTECH, now);
        assert!(tracker.allow_request(GREENTECH, now));
        assert_eq!(tracker.get_health(GREENTECH).unwrap().consecutive_failures, 0);
        assert!(tracker.status_message(GREENTECH, now).is_none());
    }

    #[test]
    fn longer_streaks_cool_down_longer() {
        assert_eq!(cooldown_duration(30, 3), Duration::seconds(30));
        assert_eq!(cooldown_duration(30, 5), Duration::seconds(60));
        assert_eq!(cooldown_duration(30, 12), Duration::seconds(120));
    }

    #[test]
    fn survives_serialization() {
        let mut tracker = HealthTracker::new(1, 60);
        let now = Utc::now();
        tracker.record_failure(GREENTECH, "HTTP 502", now);

        let json = serde_json::to_string(&tracker).unwrap();
        let mut restored: HealthTracker = serde_json::from_str(&json).unwrap();
        assert!(!restored.allow_request(GREENTECH, now + Duration::seconds(10)));
    }
}
