// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `trustwipe asset` — intake, wipe progress, and release.

use clap::Subcommand;
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::inventory::{AssetFilter, summarize};
use trustwipe_core::types::{
    Asset, AssetStatus, AssetType, Drive, DriveType, SanitizationMethod, format_capacity,
    parse_capacity,
};

use super::{Output, short_time};
use crate::services::app_services::AppServices;

#[derive(Subcommand, Debug)]
pub enum AssetAction {
    /// Register an asset at intake
    Add {
        asset_tag: String,
        /// desktop, laptop, server, or mobile
        #[arg(long = "type")]
        asset_type: AssetType,
        #[arg(long)]
        manufacturer: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        serial: String,
        /// PATH,MODEL,SERIAL,TYPE,CAPACITY, e.g. "/dev/sda,WD Blue,WD-WX41A,HDD,1TB".
        /// Repeat once per drive.
        #[arg(long = "drive", required = true, value_parser = parse_drive)]
        drives: Vec<Drive>,
        /// Technician the asset is assigned to
        #[arg(long)]
        assigned_to: Option<String>,
        /// Recycler partner receiving the asset
        #[arg(long)]
        recycler: Option<String>,
    },
    /// List assets
    List {
        #[arg(long)]
        status: Option<AssetStatus>,
        /// Matches tag, model, or serial number
        #[arg(long)]
        search: Option<String>,
        /// Only print counts per status
        #[arg(long)]
        summary: bool,
    },
    /// Show one asset and its drives
    Show { asset_tag: String },
    /// Schedule the asset for sanitization
    Queue { asset_tag: String },
    /// Start sanitizing every drive
    Wipe {
        asset_tag: String,
        #[arg(long)]
        method: SanitizationMethod,
    },
    /// Record wipe progress for a drive
    Progress {
        asset_tag: String,
        drive: String,
        percent: u8,
    },
    /// Mark a drive as sanitized and verified
    DriveDone { asset_tag: String, drive: String },
    /// Mark a drive as failed
    DriveFail {
        asset_tag: String,
        drive: String,
        #[arg(long)]
        reason: String,
    },
    /// Fail a verified asset
    Fail {
        asset_tag: String,
        #[arg(long)]
        reason: String,
    },
    /// Hand a verified asset to its recycler
    Release {
        asset_tag: String,
        #[arg(long)]
        recycler: Option<String>,
    },
}

pub fn run(services: &AppServices, action: AssetAction, out: Output) -> Result<()> {
    match action {
        AssetAction::Add {
            asset_tag,
            asset_type,
            manufacturer,
            model,
            serial,
            drives,
            assigned_to,
            recycler,
        } => {
            let mut asset = Asset::new(asset_tag, asset_type, manufacturer, model, serial, drives)?;
            asset.assigned_to = assigned_to;
            asset.recycler_destination = recycler;
            services.register_asset(&asset)?;
            out.emit(&asset, print_asset)
        }
        AssetAction::List {
            status,
            search,
            summary,
        } => {
            let assets = services.assets(&AssetFilter { status, search })?;
            if summary {
                return out.emit(&summarize(&assets), |counts| {
                    for (status, count) in counts {
                        println!("{status:<10} {count}");
                    }
                });
            }
            out.emit(&assets, |assets| {
                if assets.is_empty() {
                    println!("No assets.");
                }
                for asset in assets {
                    print_row(asset);
                }
            })
        }
        AssetAction::Show { asset_tag } => out.emit(&services.asset(&asset_tag)?, print_asset),
        AssetAction::Queue { asset_tag } => out.emit(&services.queue_asset(&asset_tag)?, print_row),
        AssetAction::Wipe { asset_tag, method } => {
            out.emit(&services.start_wipe(&asset_tag, method)?, print_asset)
        }
        AssetAction::Progress {
            asset_tag,
            drive,
            percent,
        } => out.emit(
            &services.update_progress(&asset_tag, &drive, percent)?,
            print_asset,
        ),
        AssetAction::DriveDone { asset_tag, drive } => {
            out.emit(&services.complete_drive(&asset_tag, &drive)?, print_asset)
        }
        AssetAction::DriveFail {
            asset_tag,
            drive,
            reason,
        } => out.emit(
            &services.fail_drive(&asset_tag, &drive, &reason)?,
            print_asset,
        ),
        AssetAction::Fail { asset_tag, reason } => {
            out.emit(&services.fail_asset(&asset_tag, &reason)?, print_row)
        }
        AssetAction::Release {
            asset_tag,
            recycler,
        } => out.emit(&services.release_asset(&asset_tag, recycler)?, print_row),
    }
}

/// Parse `PATH,MODEL,SERIAL,TYPE,CAPACITY`.
fn parse_drive(spec: &str) -> std::result::Result<Drive, String> {
    let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
    let [path, model, serial, drive_type, capacity] = parts[..] else {
        return Err(format!(
            "expected PATH,MODEL,SERIAL,TYPE,CAPACITY, got {} field(s)",
            parts.len()
        ));
    };
    if path.is_empty() || serial.is_empty() {
        return Err("drive path and serial must not be empty".into());
    }
    let drive_type: DriveType = drive_type.parse().map_err(|e: TrustwipeError| e.to_string())?;
    let capacity = parse_capacity(capacity).map_err(|e| e.to_string())?;
    Ok(Drive::new(path, model, serial, drive_type, capacity))
}

fn print_row(asset: &Asset) {
    println!(
        "{:<16} {:<9} {:<8} {} {}",
        asset.asset_tag,
        asset.status.as_str(),
        asset.asset_type.as_str(),
        asset.manufacturer,
        asset.model
    );
}

fn print_asset(asset: &Asset) {
    print_row(asset);
    println!("  serial      {}", asset.serial_number);
    println!("  intake      {}", short_time(&asset.intake_at));
    if let Some(who) = &asset.assigned_to {
        println!("  assigned to {who}");
    }
    if let Some(recycler) = &asset.recycler_destination {
        println!("  recycler    {recycler}");
    }
    if let Some(reason) = &asset.failure_reason {
        println!("  failure     {reason}");
    }
    for drive in &asset.drives {
        let method = drive.method.map(|m| m.display_name()).unwrap_or("-");
        println!(
            "  {:<14} {:<5} {:>6}  {} ({})  {} {}%  {method}",
            drive.path,
            drive.drive_type.as_str(),
            format_capacity(drive.capacity_bytes),
            drive.model,
            drive.serial,
            drive.status,
            drive.progress,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_spec_parses() {
        let drive = parse_drive("/dev/sda, WD Blue, WD-WX41A, HDD, 1TB").unwrap();
        assert_eq!(drive.path, "/dev/sda");
        assert_eq!(drive.model, "WD Blue");
        assert_eq!(drive.serial, "WD-WX41A");
        assert_eq!(drive.drive_type, DriveType::Hdd);
        assert_eq!(drive.capacity_bytes, 1_000_000_000_000);
    }

    #[test]
    fn drive_spec_needs_five_fields() {
        assert!(parse_drive("/dev/sda,WD Blue,HDD,1TB").is_err());
        assert!(parse_drive("/dev/sda,WD Blue,WD-1,HDD,1TB,extra").is_err());
    }

    #[test]
    fn drive_spec_rejects_bad_values() {
        assert!(parse_drive("/dev/sda,WD Blue,WD-1,tape,1TB").is_err());
        assert!(parse_drive("/dev/sda,WD Blue,WD-1,HDD,lots").is_err());
        assert!(parse_drive(",WD Blue,WD-1,HDD,1TB").is_err());
    }
}
