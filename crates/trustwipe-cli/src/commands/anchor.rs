// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `trustwipe anchor` — track on-chain anchoring of certificate hashes.

use std::process::ExitCode;

use clap::Subcommand;
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::types::{BlockchainRecord, CertificateId};
use trustwipe_ledger::AnchorVerification;

use super::{Output, short_time};
use crate::services::app_services::AppServices;

#[derive(Subcommand, Debug)]
pub enum AnchorAction {
    /// Record a submitted anchor transaction
    Submit {
        certificate_id: String,
        /// 0x-prefixed transaction hash
        tx_hash: String,
        /// Defaults to the configured network
        #[arg(long)]
        network: Option<String>,
    },
    /// Mark an anchor as mined
    Confirm {
        tx_hash: String,
        #[arg(long)]
        block: u64,
        #[arg(long, default_value_t = 0)]
        gas_used: u64,
    },
    /// Mark an anchor transaction as failed
    Fail {
        tx_hash: String,
        #[arg(long)]
        reason: String,
    },
    /// Check a certificate against its confirmed anchor
    Verify {
        certificate_id: String,
        /// Current chain height, used to count confirmations
        #[arg(long)]
        current_block: u64,
    },
    /// Look up an anchor by certificate ID or transaction hash
    Show { query: String },
    /// List anchors, newest first
    List {
        /// Matches certificate ID, transaction hash, or device model
        #[arg(long)]
        search: Option<String>,
    },
    /// Fail pending anchors older than the configured timeout
    Expire,
}

pub fn run(services: &AppServices, action: AnchorAction, out: Output) -> Result<ExitCode> {
    match action {
        AnchorAction::Submit {
            certificate_id,
            tx_hash,
            network,
        } => {
            let id = CertificateId::from(certificate_id.as_str());
            out.emit(&services.submit_anchor(&id, &tx_hash, network)?, print_record)?;
        }
        AnchorAction::Confirm {
            tx_hash,
            block,
            gas_used,
        } => out.emit(&services.confirm_anchor(&tx_hash, block, gas_used)?, print_record)?,
        AnchorAction::Fail { tx_hash, reason } => {
            out.emit(&services.fail_anchor(&tx_hash, &reason)?, print_record)?
        }
        AnchorAction::Verify {
            certificate_id,
            current_block,
        } => {
            let id = CertificateId::from(certificate_id.as_str());
            let verification = services.verify_anchor(&id, current_block)?;
            out.emit(&verification, print_verification)?;
            if !verification.valid {
                return Ok(ExitCode::FAILURE);
            }
        }
        AnchorAction::Show { query } => {
            let record = services
                .lookup_anchor(&query)?
                .ok_or_else(|| TrustwipeError::NotFound {
                    kind: "anchor",
                    id: query.clone(),
                })?;
            out.emit(&record, print_record)?;
        }
        AnchorAction::List { search } => {
            let records = services.anchors(search.as_deref())?;
            out.emit(&records, |records| {
                if records.is_empty() {
                    println!("No anchors.");
                }
                for r in records {
                    println!(
                        "{:<24} {:<9} {:<10} {}",
                        r.certificate_id.as_str(),
                        r.status.as_str(),
                        r.network,
                        r.transaction_hash
                    );
                }
            })?;
        }
        AnchorAction::Expire => {
            let expired = services.expire_anchors()?;
            out.emit(&expired, |expired| {
                println!("Expired {} pending anchor(s).", expired.len());
                for r in expired {
                    println!("  {} {}", r.certificate_id, r.transaction_hash);
                }
            })?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_record(r: &BlockchainRecord) {
    println!("{} {}", r.certificate_id, r.status);
    println!("  tx          {}", r.transaction_hash);
    println!("  network     {}", r.network);
    println!("  hash        {}", r.cert_hash);
    println!("  submitted   {}", short_time(&r.submitted_at));
    if let Some(block) = r.block_number {
        println!("  block       {block} (gas {})", r.gas_used.unwrap_or_default());
    }
    if let Some(at) = &r.resolved_at {
        println!("  resolved    {}", short_time(at));
    }
    if let Some(reason) = &r.failure_reason {
        println!("  failure     {reason}");
    }
    println!("  device      {} / {}", r.metadata.device_model, r.metadata.method);
}

fn print_verification(v: &AnchorVerification) {
    if v.valid {
        println!("VALID: {} anchored with {} confirmation(s)", v.certificate_id, v.confirmations);
    } else {
        println!(
            "INVALID: {}: {}",
            v.certificate_id,
            v.reason.as_deref().unwrap_or("not anchored")
        );
    }
    println!("  hash        {}", v.computed_hash);
    if let Some(record) = &v.record {
        let matches = if v.hash_matches { "matches" } else { "DIFFERS" };
        println!("  anchored    {} ({matches})", record.cert_hash);
        println!("  tx          {}", record.transaction_hash);
    }
}
