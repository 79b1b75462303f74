// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TrustWipe — Verifiable data sanitization certificates
//
// Entry point. Initialises logging, opens the backend services, and runs
// one subcommand.

mod commands;
mod services;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use trustwipe_core::error::Result;
use trustwipe_core::human_errors::humanize_error;

use commands::Output;
use commands::anchor::AnchorAction;
use commands::asset::AssetAction;
use commands::audit::AuditArgs;
use commands::cert::CertAction;
use commands::compliance::ComplianceAction;
use commands::deliver::DeliverAction;
use commands::partner::PartnerAction;
use services::app_services::AppServices;

#[derive(Parser, Debug)]
#[command(name = "trustwipe", version, about = "Verifiable data sanitization certificates")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the station signing key and trust it
    Init {
        /// Issuer name recorded on certificates
        #[arg(long)]
        ca_name: Option<String>,
        /// Default operator recorded on certificates
        #[arg(long)]
        operator: Option<String>,
    },
    /// Asset intake and sanitization progress
    Asset {
        #[command(subcommand)]
        action: AssetAction,
    },
    /// Sanitization certificates
    Cert {
        #[command(subcommand)]
        action: CertAction,
    },
    /// On-chain anchors of certificate hashes
    Anchor {
        #[command(subcommand)]
        action: AnchorAction,
    },
    /// Recycler partners
    Partner {
        #[command(subcommand)]
        action: PartnerAction,
    },
    /// Certificate deliveries to partners
    Deliver {
        #[command(subcommand)]
        action: DeliverAction,
    },
    /// Show the audit trail
    Audit(AuditArgs),
    /// Sanitization standards reference
    Compliance {
        #[command(subcommand)]
        action: ComplianceAction,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            let human = humanize_error(&e);
            eprintln!("error: {}", human.message);
            eprintln!("  {}", human.suggestion);
            eprintln!("  cause: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let out = Output::new(cli.json);

    let (services, command) = match cli.command {
        // Reference data only; no data directory needed.
        Commands::Compliance { action } => {
            commands::compliance::run(action, out)?;
            return Ok(ExitCode::SUCCESS);
        }
        command => (AppServices::init()?, command),
    };

    match command {
        Commands::Init { ca_name, operator } => {
            let key = services.initialize(ca_name, operator)?;
            out.emit(&key, |key| {
                let verb = if key.created { "Created" } else { "Reusing" };
                println!("{verb} signing key for {}", key.issuer);
                println!("  fingerprint {}", key.fingerprint);
                println!("  public key  {}", key.public_key_hex);
            })?;
        }
        Commands::Asset { action } => commands::asset::run(&services, action, out)?,
        Commands::Cert { action } => return commands::cert::run(&services, action, out),
        Commands::Anchor { action } => return commands::anchor::run(&services, action, out),
        Commands::Partner { action } => commands::partner::run(&services, action, out).await?,
        Commands::Deliver { action } => commands::deliver::run(&services, action, out).await?,
        Commands::Audit(args) => commands::audit::run(&services, args, out)?,
        Commands::Compliance { .. } => {}
    }
    Ok(ExitCode::SUCCESS)
}
