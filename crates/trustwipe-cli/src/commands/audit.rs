// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `trustwipe audit` — read the audit trail.

use clap::Args;
use trustwipe_core::error::Result;
use trustwipe_security::AuditEntry;

use super::Output;
use crate::services::app_services::AppServices;

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Only entries about this asset tag, certificate ID, partner, or delivery
    #[arg(long)]
    subject: Option<String>,
    /// Newest entries to show
    #[arg(long, default_value_t = 50)]
    limit: u32,
}

pub fn run(services: &AppServices, args: AuditArgs, out: Output) -> Result<()> {
    let entries = match &args.subject {
        Some(subject) => services.audit_entries_for(subject)?,
        None => services.recent_audit_entries(args.limit)?,
    };
    let total = services.audit_count()?;
    out.emit(&entries, |entries| {
        for e in entries {
            print_entry(e);
        }
        println!("{} of {total} entries", entries.len());
    })
}

fn print_entry(e: &AuditEntry) {
    let mark = if e.success { "ok  " } else { "FAIL" };
    print!("{} {mark} {:<26} {}", e.timestamp, e.action, e.subject);
    if let Some(details) = &e.details {
        print!("  {details}");
    }
    println!();
    if let Some(hash) = &e.content_hash {
        println!("    hash {hash}");
    }
}
