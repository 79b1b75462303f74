// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `trustwipe cert` — issue, amend, inspect, verify, and export certificates.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Subcommand, ValueEnum};
use serde_json::json;
use trustwipe_certificate::{ReportStatus, VerificationReport, WipeRun};
use trustwipe_core::error::Result;
use trustwipe_core::types::{
    CertificateId, VerificationMode, VerificationOutcome, VerificationSummary,
};
use trustwipe_ledger::StoredCertificate;

use super::{Output, short_time};
use crate::services::app_services::{AppServices, ExportFormat, IssuedCertificate};

#[derive(Subcommand, Debug)]
pub enum CertAction {
    /// Issue a signed certificate for a verified drive
    Issue {
        asset_tag: String,
        /// Device path of the drive, e.g. /dev/nvme0n1
        drive: String,
        #[command(flatten)]
        evidence: Evidence,
    },
    /// Replace a certificate with a corrected one
    Amend {
        certificate_id: String,
        #[arg(long)]
        reason: String,
        #[command(flatten)]
        evidence: Evidence,
    },
    /// Show a stored certificate
    Show { certificate_id: String },
    /// List certificates
    List {
        /// Only certificates for this asset
        #[arg(long)]
        asset: Option<String>,
    },
    /// Verify a certificate file against the trust store
    Verify {
        file: PathBuf,
        /// Detached signature; defaults to `<file>.sig` when present
        #[arg(long)]
        signature: Option<PathBuf>,
    },
    /// Export a certificate as signed JSON or PDF
    Export {
        certificate_id: String,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
        /// Output directory; defaults to the data directory's exports/
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Verification evidence from the wiping station.
#[derive(Args, Debug)]
pub struct Evidence {
    /// Read-back mode: sample, full, or visual
    #[arg(long, default_value = "sample")]
    verify_mode: VerificationMode,
    /// Share of the media read back
    #[arg(long, default_value_t = 10)]
    verify_percent: u8,
    #[arg(long, default_value_t = 0)]
    blocks_verified: u64,
    /// Read-back mismatches; any mismatch fails verification
    #[arg(long, default_value_t = 0)]
    verify_errors: u64,
    /// Station run log; its SHA-256 is recorded on the certificate
    #[arg(long)]
    run_log: PathBuf,
    /// HPA/DCO hidden areas were removed before the wipe
    #[arg(long)]
    hpa_dco_removed: bool,
}

impl Evidence {
    fn into_run(self) -> Result<WipeRun> {
        let log = std::fs::read(&self.run_log)?;
        let result = if self.verify_errors == 0 {
            VerificationOutcome::Pass
        } else {
            VerificationOutcome::Fail
        };
        Ok(WipeRun::from_log(
            VerificationSummary {
                mode: self.verify_mode,
                percent: self.verify_percent,
                result,
                blocks_verified: self.blocks_verified,
                errors: self.verify_errors,
            },
            self.hpa_dco_removed,
            &log,
        ))
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Format {
    Json,
    Pdf,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => ExportFormat::Json,
            Format::Pdf => ExportFormat::Pdf,
        }
    }
}

pub fn run(services: &AppServices, action: CertAction, out: Output) -> Result<ExitCode> {
    match action {
        CertAction::Issue {
            asset_tag,
            drive,
            evidence,
        } => {
            let issued = services.issue_certificate(&asset_tag, &drive, &evidence.into_run()?)?;
            print_issued(&issued, out)?;
        }
        CertAction::Amend {
            certificate_id,
            reason,
            evidence,
        } => {
            let id = CertificateId::from(certificate_id.as_str());
            let issued = services.amend_certificate(&id, &evidence.into_run()?, &reason)?;
            print_issued(&issued, out)?;
        }
        CertAction::Show { certificate_id } => {
            let stored = services.certificate(&CertificateId::from(certificate_id.as_str()))?;
            let deliveries = services.deliveries_for_certificate(stored.id())?;
            let value = json!({
                "certificate": &stored.signed.certificate,
                "signature": &stored.signed.signature,
                "content_hash": &stored.content_hash,
                "superseded_by": &stored.superseded_by,
                "deliveries": &deliveries,
            });
            out.emit(&value, |_| {
                print_certificate(&stored);
                for d in &deliveries {
                    println!("  delivery    {} {} via {} ({})", d.partner_name, d.status, d.method, d.id);
                }
            })?;
        }
        CertAction::List { asset } => {
            let certs = services.certificates(asset.as_deref())?;
            let rows: Vec<_> = certs
                .iter()
                .map(|c| {
                    json!({
                        "certificate_id": c.id(),
                        "asset_tag": &c.signed.certificate.asset_tag,
                        "device": c.signed.certificate.device_label(),
                        "issued_at": c.issued_at,
                        "content_hash": &c.content_hash,
                        "superseded_by": &c.superseded_by,
                    })
                })
                .collect();
            out.emit(&rows, |_| {
                if certs.is_empty() {
                    println!("No certificates.");
                }
                for c in &certs {
                    let state = if c.is_current() { "current" } else { "superseded" };
                    println!(
                        "{:<24} {:<16} {:<11} {}",
                        c.id().as_str(),
                        c.signed.certificate.asset_tag,
                        state,
                        c.signed.certificate.device_label()
                    );
                }
            })?;
        }
        CertAction::Verify { file, signature } => {
            let report = services.verify_file(&file, signature.as_deref())?;
            out.emit(&report, print_report)?;
            if report.is_error() {
                return Ok(ExitCode::FAILURE);
            }
        }
        CertAction::Export {
            certificate_id,
            format,
            out: dir,
        } => {
            let id = CertificateId::from(certificate_id.as_str());
            let paths = services.export_certificate(&id, format.into(), dir)?;
            out.emit(&paths, |paths| {
                for path in paths {
                    println!("{}", path.display());
                }
            })?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_issued(issued: &IssuedCertificate, out: Output) -> Result<()> {
    let value = json!({
        "certificate": &issued.signed.certificate,
        "signature": &issued.signed.signature,
        "content_hash": &issued.content_hash,
        "auto_delivery": &issued.auto_delivery,
    });
    out.emit(&value, |_| {
        let cert = &issued.signed.certificate;
        println!("Issued {}", cert.certificate_id);
        println!("  device      {}", cert.device_label());
        println!("  method      {} ({})", cert.algorithm, cert.nist_category);
        println!("  hash        {}", issued.content_hash);
        if let Some(previous) = &cert.supersedes {
            println!("  supersedes  {previous}");
        }
        if let Some(delivery) = &issued.auto_delivery {
            println!("  queued for  {} via {}", delivery.partner_name, delivery.method);
        }
    })
}

fn print_certificate(stored: &StoredCertificate) {
    let cert = &stored.signed.certificate;
    println!("{}", cert.certificate_id);
    println!("  asset       {}", cert.asset_tag);
    println!("  device      {}", cert.device_label());
    println!("  method      {} ({})", cert.algorithm, cert.nist_category);
    println!(
        "  verified    {} {}% {:?}",
        cert.verification.mode, cert.verification.percent, cert.verification.result
    );
    println!("  completed   {} ({})", short_time(&cert.end_time_utc), cert.duration_label());
    println!("  issued      {}", short_time(&stored.issued_at));
    println!("  signer      {}", cert.signing.signer_fingerprint);
    println!("  hash        {}", stored.content_hash);
    if let Some(operator) = &cert.operator {
        println!("  operator    {operator}");
    }
    if let Some(previous) = &cert.supersedes {
        let reason = cert.amendment_reason.as_deref().unwrap_or("-");
        println!("  supersedes  {previous} ({reason})");
    }
    if let Some(next) = &stored.superseded_by {
        println!("  superseded  by {next}");
    }
}

fn print_report(report: &VerificationReport) {
    let label = match report.status {
        ReportStatus::Success => "VALID",
        ReportStatus::Warning => "VALID (review)",
        ReportStatus::Error => "INVALID",
    };
    println!("{label}: {}", report.message);
    if let Some(d) = &report.details {
        println!("  certificate {}", d.certificate_id);
        println!("  device      {}", d.device);
        println!("  method      {}", d.method);
        println!("  completed   {}", d.timestamp);
        println!("  issuer      {}", d.verified_by);
        println!("  hash        {}", d.content_hash);
    }
    for note in &report.notes {
        println!("  note: {note}");
    }
}
