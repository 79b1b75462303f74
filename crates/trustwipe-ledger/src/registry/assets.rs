// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Assets and their drives.

use rusqlite::{OptionalExtension, Row, params};
use tracing::{debug, info, instrument};
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::inventory::AssetFilter;
use trustwipe_core::types::{Asset, AssetId, Drive, DriveId};

use super::{
    Registry, db_err, get_kw, get_opt_kw, get_opt_ts, get_ts, get_uuid, is_constraint, opt_ts, ts,
};

const ASSET_COLUMNS: &str = "id, asset_tag, asset_type, manufacturer, model, serial_number,
    status, assigned_to, recycler_destination, intake_at, updated_at, failure_reason";

const DRIVE_COLUMNS: &str = "id, path, model, serial, drive_type, capacity_bytes, status,
    method, progress, wipe_started_at, wipe_finished_at, failure_reason";

impl Registry {
    /// Register a new asset with its drives. Asset tags are unique.
    #[instrument(skip(self, asset), fields(asset = %asset.asset_tag))]
    pub fn insert_asset(&self, asset: &Asset) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| db_err("begin", e))?;

        tx.execute(
            "INSERT INTO assets (id, asset_tag, asset_type, manufacturer, model, serial_number,
                status, assigned_to, recycler_destination, intake_at, updated_at, failure_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                asset.id.to_string(),
                asset.asset_tag,
                asset.asset_type.as_str(),
                asset.manufacturer,
                asset.model,
                asset.serial_number,
                asset.status.as_str(),
                asset.assigned_to,
                asset.recycler_destination,
                ts(&asset.intake_at),
                ts(&asset.updated_at),
                asset.failure_reason,
            ],
        )
        .map_err(|e| {
            if is_constraint(&e) {
                TrustwipeError::Duplicate {
                    kind: "asset",
                    id: asset.asset_tag.clone(),
                }
            } else {
                db_err("insert asset", e)
            }
        })?;

        for (position, drive) in asset.drives.iter().enumerate() {
            tx.execute(
                "INSERT INTO drives (id, asset_id, position, path, model, serial, drive_type,
                    capacity_bytes, status, method, progress, wipe_started_at, wipe_finished_at,
                    failure_reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    drive.id.to_string(),
                    asset.id.to_string(),
                    position as i64,
                    drive.path,
                    drive.model,
                    drive.serial,
                    drive.drive_type.as_str(),
                    drive.capacity_bytes as i64,
                    drive.status.as_str(),
                    drive.method.map(|m| m.as_str()),
                    drive.progress,
                    opt_ts(&drive.wipe_started_at),
                    opt_ts(&drive.wipe_finished_at),
                    drive.failure_reason,
                ],
            )
            .map_err(|e| db_err("insert drive", e))?;
        }

        tx.commit().map_err(|e| db_err("commit", e))?;
        info!(drives = asset.drives.len(), "asset registered");
        Ok(())
    }

    /// Persist the current state of an existing asset and its drives.
    #[instrument(skip(self, asset), fields(asset = %asset.asset_tag, status = %asset.status))]
    pub fn update_asset(&self, asset: &Asset) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| db_err("begin", e))?;

        let rows = tx
            .execute(
                "UPDATE assets SET status = ?1, assigned_to = ?2, recycler_destination = ?3,
                    updated_at = ?4, failure_reason = ?5
                 WHERE id = ?6",
                params![
                    asset.status.as_str(),
                    asset.assigned_to,
                    asset.recycler_destination,
                    ts(&asset.updated_at),
                    asset.failure_reason,
                    asset.id.to_string(),
                ],
            )
            .map_err(|e| db_err("update asset", e))?;
        if rows == 0 {
            return Err(TrustwipeError::NotFound {
                kind: "asset",
                id: asset.asset_tag.clone(),
            });
        }

        for drive in &asset.drives {
            tx.execute(
                "UPDATE drives SET status = ?1, method = ?2, progress = ?3, wipe_started_at = ?4,
                    wipe_finished_at = ?5, failure_reason = ?6
                 WHERE id = ?7",
                params![
                    drive.status.as_str(),
                    drive.method.map(|m| m.as_str()),
                    drive.progress,
                    opt_ts(&drive.wipe_started_at),
                    opt_ts(&drive.wipe_finished_at),
                    drive.failure_reason,
                    drive.id.to_string(),
                ],
            )
            .map_err(|e| db_err("update drive", e))?;
        }

        tx.commit().map_err(|e| db_err("commit", e))?;
        debug!("asset updated");
        Ok(())
    }

    pub fn find_asset(&self, asset_tag: &str) -> Result<Option<Asset>> {
        let asset = self
            .conn
            .query_row(
                &format!("SELECT {ASSET_COLUMNS} FROM assets WHERE asset_tag = ?1"),
                params![asset_tag],
                row_to_asset,
            )
            .optional()
            .map_err(|e| db_err("get asset", e))?;

        match asset {
            Some(mut a) => {
                a.drives = self.drives_for(a.id)?;
                Ok(Some(a))
            }
            None => Ok(None),
        }
    }

    /// Like [`find_asset`](Self::find_asset) but a missing tag is an error.
    pub fn asset(&self, asset_tag: &str) -> Result<Asset> {
        self.find_asset(asset_tag)?.ok_or_else(|| TrustwipeError::NotFound {
            kind: "asset",
            id: asset_tag.to_owned(),
        })
    }

    /// Assets matching `filter`, oldest intake first.
    pub fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {ASSET_COLUMNS} FROM assets ORDER BY intake_at ASC, asset_tag ASC"
            ))
            .map_err(|e| db_err("prepare list assets", e))?;
        let assets = stmt
            .query_map([], row_to_asset)
            .map_err(|e| db_err("list assets", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("collect assets", e))?;

        let mut out = Vec::new();
        for mut asset in assets {
            asset.drives = self.drives_for(asset.id)?;
            if filter.matches(&asset) {
                out.push(asset);
            }
        }
        Ok(out)
    }

    fn drives_for(&self, asset_id: AssetId) -> Result<Vec<Drive>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {DRIVE_COLUMNS} FROM drives WHERE asset_id = ?1 ORDER BY position ASC"
            ))
            .map_err(|e| db_err("prepare drives", e))?;
        stmt.query_map(params![asset_id.to_string()], row_to_drive)
            .map_err(|e| db_err("query drives", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("collect drives", e))
    }
}

/// Drives are attached by the caller.
fn row_to_asset(row: &Row<'_>) -> rusqlite::Result<Asset> {
    Ok(Asset {
        id: AssetId(get_uuid(row, 0)?),
        asset_tag: row.get(1)?,
        asset_type: get_kw(row, 2)?,
        manufacturer: row.get(3)?,
        model: row.get(4)?,
        serial_number: row.get(5)?,
        status: get_kw(row, 6)?,
        drives: Vec::new(),
        assigned_to: row.get(7)?,
        recycler_destination: row.get(8)?,
        intake_at: get_ts(row, 9)?,
        updated_at: get_ts(row, 10)?,
        failure_reason: row.get(11)?,
    })
}

fn row_to_drive(row: &Row<'_>) -> rusqlite::Result<Drive> {
    Ok(Drive {
        id: DriveId(get_uuid(row, 0)?),
        path: row.get(1)?,
        model: row.get(2)?,
        serial: row.get(3)?,
        drive_type: get_kw(row, 4)?,
        capacity_bytes: row.get::<_, i64>(5)? as u64,
        status: get_kw(row, 6)?,
        method: get_opt_kw(row, 7)?,
        progress: row.get(8)?,
        wipe_started_at: get_opt_ts(row, 9)?,
        wipe_finished_at: get_opt_ts(row, 10)?,
        failure_reason: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use trustwipe_core::types::{AssetStatus, DriveStatus, DriveType, SanitizationMethod};

    use super::*;
    use crate::test_support::workstation;

    #[test]
    fn insert_and_fetch_round_trips_drives() {
        let registry = Registry::open_in_memory().unwrap();
        let asset = workstation("DT-001-2025");
        registry.insert_asset(&asset).unwrap();

        let loaded = registry.asset("DT-001-2025").unwrap();
        assert_eq!(loaded.id, asset.id);
        assert_eq!(loaded.drives.len(), 2);
        assert_eq!(loaded.drives[0].path, "/dev/nvme0n1");
        assert_eq!(loaded.drives[1].drive_type, DriveType::Hdd);
        assert_eq!(loaded.status, AssetStatus::Intake);
    }

    #[test]
    fn duplicate_tag_rejected() {
        let registry = Registry::open_in_memory().unwrap();
        registry.insert_asset(&workstation("DT-001-2025")).unwrap();
        assert!(matches!(
            registry.insert_asset(&workstation("DT-001-2025")),
            Err(TrustwipeError::Duplicate { kind: "asset", .. })
        ));
    }

    #[test]
    fn update_persists_lifecycle() {
        let registry = Registry::open_in_memory().unwrap();
        let mut asset = workstation("DT-001-2025");
        registry.insert_asset(&asset).unwrap();

        asset.enqueue().unwrap();
        asset.start_wipe(SanitizationMethod::Overwrite, Utc::now()).unwrap();
        let sda = asset.drives[1].id;
        asset.update_drive_progress(sda, 67).unwrap();
        registry.update_asset(&asset).unwrap();

        let loaded = registry.asset("DT-001-2025").unwrap();
        assert_eq!(loaded.status, AssetStatus::Wiping);
        assert_eq!(loaded.drives[1].status, DriveStatus::Wiping);
        assert_eq!(loaded.drives[1].progress, 67);
        assert_eq!(loaded.drives[1].method, Some(SanitizationMethod::Overwrite));
    }

    #[test]
    fn missing_asset() {
        let registry = Registry::open_in_memory().unwrap();
        assert!(registry.find_asset("nope").unwrap().is_none());
        assert!(matches!(
            registry.asset("nope"),
            Err(TrustwipeError::NotFound { .. })
        ));
    }

    #[test]
    fn list_applies_filter() {
        let registry = Registry::open_in_memory().unwrap();
        registry.insert_asset(&workstation("DT-001-2025")).unwrap();
        let mut queued = workstation("DT-004-2025");
        queued.enqueue().unwrap();
        registry.insert_asset(&queued).unwrap();

        let filter = AssetFilter {
            status: Some(AssetStatus::Queued),
            search: None,
        };
        let hits = registry.list_assets(&filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].asset_tag, "DT-004-2025");
        assert_eq!(registry.list_assets(&AssetFilter::default()).unwrap().len(), 2);
    }
}
