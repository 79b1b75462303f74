// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Delivery dispatcher.
//
// A run picks up every due delivery, sends it, and writes the outcome back:
// delivered, retry scheduled, or failed for good. Backoff is persisted in
// `next_attempt_at`, so a run never sleeps and can be repeated at any time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use trustwipe_core::config::AppConfig;
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::types::{
    Asset, CertificateDelivery, CertificateId, DeliveryId, DeliveryMethod, ErrorClass,
    RecyclerPartner,
};
use trustwipe_security::KeyVault;

use crate::health::HealthTracker;
use crate::registry::Registry;
use crate::retry::{RetryConfig, RetryDecision, classify_error, should_retry};
use crate::transport::{DeliveryRequest, DeliveryTransport};
use crate::webhook::WebhookPayload;

/// What happened to one delivery during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Delivered {
        delivery: DeliveryId,
        partner: String,
    },
    RetryScheduled {
        delivery: DeliveryId,
        partner: String,
        error: String,
        next_attempt_at: DateTime<Utc>,
    },
    Failed {
        delivery: DeliveryId,
        partner: String,
        error: String,
        class: ErrorClass,
    },
    /// Waiting for the certificate's anchor to confirm. Not a failure.
    Deferred {
        delivery: DeliveryId,
        partner: String,
        until: DateTime<Utc>,
    },
    /// Partner's circuit is open; left untouched for a later run.
    Skipped {
        delivery: DeliveryId,
        partner: String,
    },
}

impl DispatchOutcome {
    pub fn delivery(&self) -> DeliveryId {
        match self {
            Self::Delivered { delivery, .. }
            | Self::RetryScheduled { delivery, .. }
            | Self::Failed { delivery, .. }
            | Self::Deferred { delivery, .. }
            | Self::Skipped { delivery, .. } => *delivery,
        }
    }
}

/// Result of [`Dispatcher::run_once`], in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub outcomes: Vec<DispatchOutcome>,
}

impl DispatchSummary {
    pub fn delivered(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Delivered { .. }))
    }

    pub fn retrying(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::RetryScheduled { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Failed { .. }))
    }

    pub fn deferred(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Deferred { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&DispatchOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// Pushes due deliveries through a transport with the retry policy and
/// per-partner circuit breakers applied.
pub struct Dispatcher<T> {
    transport: T,
    config: AppConfig,
    retry: RetryConfig,
    health: HealthTracker,
    vault: Option<KeyVault>,
}

impl<T: DeliveryTransport> Dispatcher<T> {
    pub fn new(transport: T, config: AppConfig) -> Self {
        Self {
            transport,
            retry: RetryConfig::from(&config),
            health: HealthTracker::from(&config),
            config,
            vault: None,
        }
    }

    /// Needed to unseal partner API keys.
    pub fn with_vault(mut self, vault: KeyVault) -> Self {
        self.vault = Some(vault);
        self
    }

    /// Continue from circuit state saved by an earlier run.
    pub fn with_health(mut self, mut health: HealthTracker) -> Self {
        health.reconfigure(&self.config);
        self.health = health;
        self
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn into_health(self) -> HealthTracker {
        self.health
    }

    /// Attempt every delivery due at `now`.
    ///
    /// Registry errors abort the run; transport errors are recorded on the
    /// delivery and the run moves on.
    #[instrument(skip(self, registry))]
    pub async fn run_once(&mut self, registry: &Registry, now: DateTime<Utc>) -> Result<DispatchSummary> {
        let due = registry.due_deliveries(now)?;
        let mut summary = DispatchSummary::default();

        for mut delivery in due {
            let partner = registry.partner_by_id(delivery.partner_id)?;
            let outcome = self.attempt(registry, &mut delivery, &partner, now).await?;
            if !matches!(outcome, DispatchOutcome::Skipped { .. }) {
                registry.update_delivery(&delivery)?;
            }
            if matches!(outcome, DispatchOutcome::Delivered { .. }) {
                registry.record_partner_delivery(partner.id, now)?;
            }
            summary.outcomes.push(outcome);
        }

        info!(
            delivered = summary.delivered(),
            retrying = summary.retrying(),
            failed = summary.failed(),
            deferred = summary.deferred(),
            skipped = summary.skipped(),
            "dispatch run finished"
        );
        Ok(summary)
    }

    async fn attempt(
        &mut self,
        registry: &Registry,
        delivery: &mut CertificateDelivery,
        partner: &RecyclerPartner,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome> {
        let id = delivery.id;
        let name = partner.name.clone();

        if !partner.accepts_deliveries() {
            let err = TrustwipeError::PartnerUnavailable(name.clone());
            return self.settle_failure(delivery, &name, err, now);
        }

        let stored = registry.certificate(&delivery.certificate_id)?;
        if let Some(next) = &stored.superseded_by {
            let message = format!("certificate {} superseded by {next}", stored.id());
            delivery.fail_terminal(message.clone(), ErrorClass::Permanent, now)?;
            info!(delivery = %id, partner = %name, "not sending a superseded certificate");
            return Ok(DispatchOutcome::Failed {
                delivery: id,
                partner: name,
                error: message,
                class: ErrorClass::Permanent,
            });
        }
        if !self.health.allow_request(&name, now) {
            return Ok(DispatchOutcome::Skipped {
                delivery: id,
                partner: name,
            });
        }

        let anchor = registry.confirmed_anchor(&delivery.certificate_id)?;
        if self.config.require_anchor_before_delivery && anchor.is_none() {
            let until = later(now, self.retry.base_delay)?;
            delivery.defer(until);
            info!(delivery = %id, "waiting for anchor confirmation");
            return Ok(DispatchOutcome::Deferred {
                delivery: id,
                partner: name,
                until,
            });
        }

        let api_key = match self.unseal_api_key(partner) {
            Ok(key) => key,
            Err(e) => return self.settle_failure(delivery, &name, e, now),
        };
        let request = DeliveryRequest {
            delivery_id: id,
            method: delivery.method,
            partner_name: name.clone(),
            destination: destination(partner, delivery.method),
            api_key,
            payload: WebhookPayload::build(&stored.signed, anchor.as_ref(), &self.config),
            certificate: stored.signed,
        };

        match self.transport.deliver(&request).await {
            Ok(()) => {
                delivery.mark_delivered(now)?;
                self.health.record_success(&name, now);
                info!(delivery = %id, partner = %name, "certificate delivered");
                Ok(DispatchOutcome::Delivered {
                    delivery: id,
                    partner: name,
                })
            }
            Err(e) => {
                self.health.record_failure(&name, &e.to_string(), now);
                self.settle_failure(delivery, &name, e, now)
            }
        }
    }

    /// Apply the retry policy to a failed attempt.
    fn settle_failure(
        &self,
        delivery: &mut CertificateDelivery,
        partner: &str,
        err: TrustwipeError,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome> {
        let policy = RetryConfig {
            max_retries: delivery.max_retries,
            jitter_seed: delivery.id.0.as_u64_pair().1,
            ..self.retry.clone()
        };
        let message = err.to_string();
        let id = delivery.id;

        match should_retry(&err, delivery.retry_count, &policy) {
            RetryDecision::RetryAfter(delay) => {
                let next = later(now, delay)?;
                delivery.schedule_retry(message.clone(), ErrorClass::Transient, next)?;
                warn!(delivery = %id, partner, error = %message, retry = delivery.retry_count, "delivery failed, retry scheduled");
                Ok(DispatchOutcome::RetryScheduled {
                    delivery: id,
                    partner: partner.to_owned(),
                    error: message,
                    next_attempt_at: next,
                })
            }
            RetryDecision::GiveUp(class) => {
                delivery.fail_terminal(message.clone(), class, now)?;
                Ok(DispatchOutcome::Failed {
                    delivery: id,
                    partner: partner.to_owned(),
                    error: message,
                    class,
                })
            }
            RetryDecision::Exhausted => {
                let class = classify_error(&err);
                delivery.fail_terminal(message.clone(), class, now)?;
                Ok(DispatchOutcome::Failed {
                    delivery: id,
                    partner: partner.to_owned(),
                    error: message,
                    class,
                })
            }
        }
    }

    fn unseal_api_key(&self, partner: &RecyclerPartner) -> Result<Option<String>> {
        let Some(sealed) = &partner.sealed_api_key else {
            return Ok(None);
        };
        let vault = self.vault.as_ref().ok_or_else(|| {
            TrustwipeError::Decryption(format!(
                "partner {} has a sealed API key but no vault passphrase is set",
                partner.name
            ))
        })?;
        let bytes = vault.open(sealed)?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| TrustwipeError::Decryption(format!("API key is not UTF-8: {e}")))
    }
}

/// `now + delay`, or an error when the result is not a representable time.
fn later(now: DateTime<Utc>, delay: std::time::Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| {
            TrustwipeError::Validation(format!("retry delay of {delay:?} is out of range"))
        })
}

/// Where a delivery by `method` goes for this partner.
fn destination(partner: &RecyclerPartner, method: DeliveryMethod) -> String {
    match method {
        DeliveryMethod::Webhook => partner
            .webhook_url
            .clone()
            .unwrap_or_else(|| partner.api_endpoint.clone()),
        DeliveryMethod::Api => partner.api_endpoint.clone(),
        DeliveryMethod::Email => partner.contact_email.clone(),
    }
}

/// Queue delivery of a certificate to a named partner. `method` defaults to
/// the partner's preferred channel.
#[instrument(skip(registry, config))]
pub fn queue_delivery(
    registry: &Registry,
    certificate_id: &CertificateId,
    partner_name: &str,
    method: Option<DeliveryMethod>,
    config: &AppConfig,
) -> Result<CertificateDelivery> {
    let stored = registry.certificate(certificate_id)?;
    if !stored.is_current() {
        return Err(TrustwipeError::AlreadySuperseded(certificate_id.to_string()));
    }
    let partner = registry.partner(partner_name)?;
    if !partner.accepts_deliveries() {
        return Err(TrustwipeError::PartnerUnavailable(partner.name));
    }
    let method = method.unwrap_or_else(|| partner.preferred_method());
    let delivery = CertificateDelivery::new(
        certificate_id.clone(),
        &partner,
        method,
        config.max_delivery_retries,
    );
    registry.enqueue_delivery(&delivery)?;
    Ok(delivery)
}

/// Queue delivery to the asset's recycler when that partner is active and
/// has auto-delivery on. Returns `None` when nothing was queued.
pub fn queue_auto_delivery(
    registry: &Registry,
    asset: &Asset,
    certificate_id: &CertificateId,
    config: &AppConfig,
) -> Result<Option<CertificateDelivery>> {
    let Some(recycler) = asset.recycler_destination.as_deref() else {
        return Ok(None);
    };
    let Some(partner) = registry.find_partner(recycler)? else {
        warn!(asset = %asset.asset_tag, recycler, "recycler destination is not a registered partner");
        return Ok(None);
    };
    if !partner.auto_delivery || !partner.accepts_deliveries() {
        return Ok(None);
    }
    match queue_delivery(registry, certificate_id, &partner.name, None, config) {
        Ok(delivery) => {
            info!(asset = %asset.asset_tag, partner = %partner.name, "auto-delivery queued");
            Ok(Some(delivery))
        }
        Err(TrustwipeError::Duplicate { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}
