// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Asset inventory filtering and summaries.

use std::collections::BTreeMap;

use crate::types::{Asset, AssetStatus, BlockchainRecord};

/// Status filter plus free-text search over tag, model, and serial number.
#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    /// `None` matches every status.
    pub status: Option<AssetStatus>,
    /// Case-insensitive substring; empty matches everything.
    pub search: Option<String>,
}

impl AssetFilter {
    pub fn matches(&self, asset: &Asset) -> bool {
        let status_ok = self.status.is_none_or(|s| s == asset.status);
        let search_ok = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                [&asset.asset_tag, &asset.model, &asset.serial_number]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&term))
            }
        };
        status_ok && search_ok
    }

    /// Keep the matching assets, preserving input order.
    pub fn apply<'a>(&self, assets: &'a [Asset]) -> Vec<&'a Asset> {
        assets.iter().filter(|a| self.matches(a)).collect()
    }
}

/// Match anchor records by certificate ID, transaction hash, or device model.
pub fn record_matches(record: &BlockchainRecord, search: &str) -> bool {
    let term = search.trim().to_lowercase();
    term.is_empty()
        || record.certificate_id.as_str().to_lowercase().contains(&term)
        || record.transaction_hash.to_lowercase().contains(&term)
        || record.metadata.device_model.to_lowercase().contains(&term)
}

/// Count assets per status. Every status appears, zero counts included.
pub fn summarize(assets: &[Asset]) -> BTreeMap<&'static str, usize> {
    let mut counts: BTreeMap<&'static str, usize> =
        AssetStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for asset in assets {
        *counts.entry(asset.status.as_str()).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetType, Drive, DriveType};

    fn asset(tag: &str, model: &str, serial: &str, status: AssetStatus) -> Asset {
        let mut a = Asset::new(
            tag,
            AssetType::Desktop,
            "Dell",
            model,
            serial,
            vec![Drive::new("/dev/nvme0n1", "Samsung 980 Pro", "S6B2", DriveType::Nvme, 1_000_000_000_000)],
        )
        .unwrap();
        a.status = status;
        a
    }

    fn fleet() -> Vec<Asset> {
        vec![
            asset("DT-001-2025", "OptiPlex 7090", "DL7090-ABC123", AssetStatus::Intake),
            asset("LT-002-2025", "EliteBook 850", "HP850-XYZ789", AssetStatus::Wiping),
            asset("SV-003-2025", "ThinkSystem SR650", "LS650-789ABC", AssetStatus::Verified),
        ]
    }

    #[test]
    fn empty_filter_matches_all() {
        let assets = fleet();
        assert_eq!(AssetFilter::default().apply(&assets).len(), 3);
    }

    #[test]
    fn status_filter() {
        let assets = fleet();
        let filter = AssetFilter {
            status: Some(AssetStatus::Wiping),
            search: None,
        };
        let hits = filter.apply(&assets);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].asset_tag, "LT-002-2025");
    }

    #[test]
    fn search_covers_tag_model_and_serial() {
        let assets = fleet();
        let by = |term: &str| {
            AssetFilter {
                status: None,
                search: Some(term.into()),
            }
            .apply(&assets)
            .iter()
            .map(|a| a.asset_tag.clone())
            .collect::<Vec<_>>()
        };
        assert_eq!(by("sv-003"), vec!["SV-003-2025"]);
        assert_eq!(by("elitebook"), vec!["LT-002-2025"]);
        assert_eq!(by("abc"), vec!["DT-001-2025", "SV-003-2025"]);
        assert!(by("nothing-here").is_empty());
    }

    #[test]
    fn status_and_search_combine() {
        let assets = fleet();
        let filter = AssetFilter {
            status: Some(AssetStatus::Intake),
            search: Some("ABC".into()),
        };
        let hits = filter.apply(&assets);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].asset_tag, "DT-001-2025");
    }

    #[test]
    fn summary_includes_zero_counts() {
        let counts = summarize(&fleet());
        assert_eq!(counts["intake"], 1);
        assert_eq!(counts["released"], 0);
        assert_eq!(counts.len(), AssetStatus::ALL.len());
    }
}
