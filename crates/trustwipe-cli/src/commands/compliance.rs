// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `trustwipe compliance` — NIST SP 800-88 and ISO/IEC 27002 reference data.
// Needs no data directory.

use clap::Subcommand;
use serde_json::{Value, json};
use trustwipe_core::compliance::{
    CATEGORY_PROFILES, CategoryProfile, ISO_CONTROLS, MEDIA_GUIDANCE, MediaGuidance,
    check_method, media_guidance, method_rationale,
};
use trustwipe_core::error::Result;
use trustwipe_core::types::{DriveType, SanitizationMethod};

use super::Output;

#[derive(Subcommand, Debug)]
pub enum ComplianceAction {
    /// Accepted techniques per media type
    Media {
        #[arg(long)]
        drive_type: Option<DriveType>,
    },
    /// NIST categories and their verification requirements
    Categories,
    /// ISO/IEC 27002 controls a certificate evidences
    Controls,
    /// Check a technique against a media type
    Check {
        #[arg(long)]
        drive_type: DriveType,
        #[arg(long)]
        method: SanitizationMethod,
    },
}

pub fn run(action: ComplianceAction, out: Output) -> Result<()> {
    match action {
        ComplianceAction::Media { drive_type } => {
            let guidance: Vec<&MediaGuidance> = match drive_type {
                Some(t) => vec![media_guidance(t)],
                None => MEDIA_GUIDANCE.iter().collect(),
            };
            let value: Vec<Value> = guidance.iter().map(|g| media_json(g)).collect();
            out.emit(&value, |_| {
                for g in &guidance {
                    println!("{} (risk: {:?})", g.drive_type, g.risk);
                    for m in g.methods {
                        println!("  {:<32} {}", m.as_str(), m.nist_category());
                    }
                    println!("  {}", g.notes);
                }
            })
        }
        ComplianceAction::Categories => {
            let value: Vec<Value> = CATEGORY_PROFILES.iter().map(category_json).collect();
            out.emit(&value, |_| {
                for p in CATEGORY_PROFILES {
                    println!("{:<8} {}", p.category.as_str(), p.description);
                    println!("         verification: {:?}", p.verification);
                    println!("         use: {}", p.use_case);
                }
            })
        }
        ComplianceAction::Controls => {
            let value: Vec<Value> = ISO_CONTROLS
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "title": c.title,
                        "description": c.description,
                        "implementation": c.implementation,
                    })
                })
                .collect();
            out.emit(&value, |_| {
                for c in ISO_CONTROLS {
                    println!("{:<9} {}", c.id, c.title);
                    println!("          {}", c.implementation);
                }
            })
        }
        ComplianceAction::Check { drive_type, method } => {
            check_method(drive_type, method)?;
            let rationale = method_rationale(method);
            let value = json!({
                "drive_type": drive_type,
                "method": method,
                "nist_category": method.nist_category(),
                "rationale": rationale,
            });
            out.emit(&value, |_| {
                println!("{} is accepted for {drive_type} media", method.display_name());
                println!("  {rationale}");
            })
        }
    }
}

fn media_json(g: &MediaGuidance) -> Value {
    json!({
        "drive_type": g.drive_type,
        "methods": g.methods,
        "notes": g.notes,
        "risk": format!("{:?}", g.risk).to_lowercase(),
    })
}

fn category_json(p: &CategoryProfile) -> Value {
    json!({
        "category": p.category,
        "description": p.description,
        "verification": format!("{:?}", p.verification),
        "use_case": p.use_case,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_json_lists_every_method() {
        let value = media_json(media_guidance(DriveType::Nvme));
        assert_eq!(value["drive_type"], json!(DriveType::Nvme));
        assert_eq!(value["methods"].as_array().unwrap().len(), 5);
        assert_eq!(value["risk"], "high");
    }

    #[test]
    fn check_rejects_mismatched_media() {
        let out = Output::new(true);
        let err = run(
            ComplianceAction::Check {
                drive_type: DriveType::Hdd,
                method: SanitizationMethod::NvmeSanitizeCryptoErase,
            },
            out,
        )
        .unwrap_err();
        assert!(err.to_string().contains("compliance violation"));
    }
}
