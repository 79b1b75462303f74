// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `trustwipe partner` — recycler partner onboarding and maintenance.
//
// API keys are read from a file so they never appear in shell history or
// the process list.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Subcommand};
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::types::{CertificationLevel, PartnerStatus, RecyclerPartner};

use super::{Output, short_time};
use crate::services::app_services::{AppServices, PartnerOverview};

#[derive(Subcommand, Debug)]
pub enum PartnerAction {
    /// Register a recycler partner (starts as pending)
    Add {
        name: String,
        #[arg(long, value_parser = parse_email)]
        email: String,
        #[arg(long, value_parser = parse_url)]
        api_endpoint: String,
        #[arg(long, value_parser = parse_url)]
        webhook_url: Option<String>,
        /// R2, e-Stewards, ISO14001, or Other
        #[arg(long, default_value = "R2")]
        certification: CertificationLevel,
        /// Queue certificates for this partner as soon as they are issued
        #[arg(long)]
        auto_delivery: bool,
        /// File holding the partner's API key
        #[arg(long)]
        api_key_file: Option<PathBuf>,
    },
    /// List partners with their delivery health
    List {
        #[arg(long)]
        status: Option<PartnerStatus>,
    },
    /// Allow deliveries to the partner
    Activate { name: String },
    /// Stop deliveries to the partner
    Deactivate { name: String },
    /// Turn automatic delivery on or off
    AutoDelivery {
        name: String,
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Replace the partner's API key
    SetKey {
        name: String,
        #[arg(long)]
        api_key_file: PathBuf,
    },
    /// Check the partner's endpoint
    Test { name: String },
}

pub async fn run(services: &AppServices, action: PartnerAction, out: Output) -> Result<()> {
    match action {
        PartnerAction::Add {
            name,
            email,
            api_endpoint,
            webhook_url,
            certification,
            auto_delivery,
            api_key_file,
        } => {
            let mut partner = RecyclerPartner::new(name, email, api_endpoint, certification);
            partner.webhook_url = webhook_url;
            partner.auto_delivery = auto_delivery;
            let api_key = api_key_file.as_deref().map(read_api_key).transpose()?;
            let partner = services.add_partner(partner, api_key.as_deref())?;
            out.emit(&partner, print_partner)
        }
        PartnerAction::List { status } => {
            let partners = services.partners(status)?;
            out.emit(&partners, |partners| {
                if partners.is_empty() {
                    println!("No partners.");
                }
                for overview in partners {
                    print_overview(overview);
                }
            })
        }
        PartnerAction::Activate { name } => out.emit(
            &services.set_partner_status(&name, PartnerStatus::Active)?,
            print_partner,
        ),
        PartnerAction::Deactivate { name } => out.emit(
            &services.set_partner_status(&name, PartnerStatus::Inactive)?,
            print_partner,
        ),
        PartnerAction::AutoDelivery { name, enabled } => out.emit(
            &services.set_partner_auto_delivery(&name, enabled)?,
            print_partner,
        ),
        PartnerAction::SetKey { name, api_key_file } => {
            let key = read_api_key(&api_key_file)?;
            out.emit(&services.set_partner_key(&name, &key)?, print_partner)
        }
        PartnerAction::Test { name } => {
            let status = services.test_partner(&name).await?;
            out.emit(&serde_json::json!({ "partner": name, "http_status": status }), |_| {
                println!("{name} answered HTTP {status}");
            })
        }
    }
}

fn read_api_key(path: &Path) -> Result<String> {
    let key = std::fs::read_to_string(path)?.trim().to_owned();
    if key.is_empty() {
        return Err(TrustwipeError::Validation(format!(
            "API key file {} is empty",
            path.display()
        )));
    }
    Ok(key)
}

fn parse_email(value: &str) -> std::result::Result<String, String> {
    match value.split_once('@') {
        Some((user, domain)) if !user.is_empty() && domain.contains('.') => Ok(value.to_owned()),
        _ => Err(format!("{value:?} is not an email address")),
    }
}

fn parse_url(value: &str) -> std::result::Result<String, String> {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(value.to_owned()),
        _ => Err(format!("{value:?} is not an http(s) URL")),
    }
}

fn print_partner(p: &RecyclerPartner) {
    println!(
        "{:<24} {:<8} {:<10} {}",
        p.name,
        p.status.as_str(),
        p.certification_level.as_str(),
        p.contact_email
    );
    println!("  endpoint    {}", p.api_endpoint);
    if let Some(url) = &p.webhook_url {
        println!("  webhook     {url}");
    }
    let auto = if p.auto_delivery { "on" } else { "off" };
    println!("  auto        {auto}");
    println!("  delivered   {}", p.certificates_delivered);
    if let Some(at) = &p.last_delivery {
        println!("  last        {}", short_time(at));
    }
}

fn print_overview(o: &PartnerOverview) {
    print_partner(&o.partner);
    if !o.has_api_key {
        println!("  api key     none");
    }
    if let Some(health) = &o.health {
        println!("  health      {health}");
    }
}
