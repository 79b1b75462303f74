// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `trustwipe deliver` — queue, dispatch, and retry certificate deliveries.

use clap::Subcommand;
use trustwipe_core::error::Result;
use trustwipe_core::types::{
    CertificateDelivery, CertificateId, DeliveryId, DeliveryMethod, DeliveryStatus,
};
use trustwipe_ledger::{DispatchOutcome, DispatchSummary};

use super::{Output, short_time};
use crate::services::app_services::AppServices;

#[derive(Subcommand, Debug)]
pub enum DeliverAction {
    /// Queue a certificate for a partner
    Queue {
        certificate_id: String,
        partner: String,
        /// webhook, email, or api; defaults to the partner's preferred channel
        #[arg(long)]
        method: Option<DeliveryMethod>,
    },
    /// Attempt every due delivery once
    Run,
    /// Reset a failed delivery to pending with a fresh retry budget
    Retry { delivery_id: DeliveryId },
    /// List deliveries
    List {
        #[arg(long)]
        status: Option<DeliveryStatus>,
        #[arg(long)]
        certificate: Option<String>,
    },
}

pub async fn run(services: &AppServices, action: DeliverAction, out: Output) -> Result<()> {
    match action {
        DeliverAction::Queue {
            certificate_id,
            partner,
            method,
        } => {
            let id = CertificateId::from(certificate_id.as_str());
            out.emit(&services.queue_delivery(&id, &partner, method)?, print_delivery)
        }
        DeliverAction::Run => out.emit(&services.run_deliveries().await?, print_summary),
        DeliverAction::Retry { delivery_id } => {
            out.emit(&services.retry_delivery(delivery_id)?, print_delivery)
        }
        DeliverAction::List {
            status,
            certificate,
        } => {
            let deliveries = match certificate {
                Some(id) => {
                    let mut deliveries =
                        services.deliveries_for_certificate(&CertificateId::from(id.as_str()))?;
                    if let Some(status) = status {
                        deliveries.retain(|d| d.status == status);
                    }
                    deliveries
                }
                None => services.deliveries(status)?,
            };
            out.emit(&deliveries, |deliveries| {
                if deliveries.is_empty() {
                    println!("No deliveries.");
                }
                for d in deliveries {
                    print_row(d);
                }
            })
        }
    }
}

fn print_row(d: &CertificateDelivery) {
    println!(
        "{} {:<9} {:<7} {:<24} {} retries {}/{}",
        d.id,
        d.status.as_str(),
        d.method.as_str(),
        d.certificate_id.as_str(),
        d.partner_name,
        d.retry_count,
        d.max_retries
    );
}

fn print_delivery(d: &CertificateDelivery) {
    print_row(d);
    println!("  created     {}", short_time(&d.created_at));
    if let Some(at) = &d.next_attempt_at {
        println!("  next try    {}", short_time(at));
    }
    if let Some(at) = &d.delivered_at {
        println!("  delivered   {}", short_time(at));
    }
    if let Some(error) = &d.last_error {
        println!("  last error  {error}");
    }
}

fn print_summary(summary: &DispatchSummary) {
    println!(
        "{} delivered, {} retrying, {} failed, {} deferred, {} skipped",
        summary.delivered(),
        summary.retrying(),
        summary.failed(),
        summary.deferred(),
        summary.skipped()
    );
    for outcome in &summary.outcomes {
        match outcome {
            DispatchOutcome::Delivered { delivery, partner } => {
                println!("  delivered  {delivery} to {partner}");
            }
            DispatchOutcome::RetryScheduled {
                delivery,
                partner,
                error,
                next_attempt_at,
            } => println!(
                "  retry      {delivery} to {partner} at {}: {error}",
                short_time(next_attempt_at)
            ),
            DispatchOutcome::Failed {
                delivery,
                partner,
                error,
                class,
            } => println!("  failed     {delivery} to {partner} ({class:?}): {error}"),
            DispatchOutcome::Deferred {
                delivery,
                partner,
                until,
            } => println!(
                "  waiting    {delivery} to {partner} for anchor until {}",
                short_time(until)
            ),
            DispatchOutcome::Skipped { delivery, partner } => {
                println!("  skipped    {delivery}: {partner} circuit open");
            }
        }
    }
}
