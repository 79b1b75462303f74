// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recycler partners.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use tracing::{info, instrument};
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::types::{PartnerId, PartnerStatus, RecyclerPartner};

use super::{Registry, db_err, get_kw, get_opt_ts, get_ts, get_uuid, is_constraint, opt_ts, ts};

const PARTNER_COLUMNS: &str = "id, name, contact_email, api_endpoint, webhook_url, status,
    certification_level, auto_delivery, certificates_delivered, last_delivery, sealed_api_key,
    created_at";

impl Registry {
    /// Register a partner. Names are unique.
    #[instrument(skip(self, partner), fields(partner = %partner.name))]
    pub fn insert_partner(&self, partner: &RecyclerPartner) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO partners ({PARTNER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    partner.id.to_string(),
                    partner.name,
                    partner.contact_email,
                    partner.api_endpoint,
                    partner.webhook_url,
                    partner.status.as_str(),
                    partner.certification_level.as_str(),
                    partner.auto_delivery,
                    partner.certificates_delivered as i64,
                    opt_ts(&partner.last_delivery),
                    partner.sealed_api_key,
                    ts(&partner.created_at),
                ],
            )
            .map_err(|e| {
                if is_constraint(&e) {
                    TrustwipeError::Duplicate {
                        kind: "partner",
                        id: partner.name.clone(),
                    }
                } else {
                    db_err("insert partner", e)
                }
            })?;
        info!(level = %partner.certification_level, "partner registered");
        Ok(())
    }

    /// Persist every mutable partner field.
    #[instrument(skip(self, partner), fields(partner = %partner.name, status = %partner.status))]
    pub fn update_partner(&self, partner: &RecyclerPartner) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE partners SET contact_email = ?1, api_endpoint = ?2, webhook_url = ?3,
                    status = ?4, certification_level = ?5, auto_delivery = ?6,
                    certificates_delivered = ?7, last_delivery = ?8, sealed_api_key = ?9
                 WHERE id = ?10",
                params![
                    partner.contact_email,
                    partner.api_endpoint,
                    partner.webhook_url,
                    partner.status.as_str(),
                    partner.certification_level.as_str(),
                    partner.auto_delivery,
                    partner.certificates_delivered as i64,
                    opt_ts(&partner.last_delivery),
                    partner.sealed_api_key,
                    partner.id.to_string(),
                ],
            )
            .map_err(|e| db_err("update partner", e))?;
        if rows == 0 {
            return Err(TrustwipeError::NotFound {
                kind: "partner",
                id: partner.name.clone(),
            });
        }
        Ok(())
    }

    /// Count one successful delivery.
    pub fn record_partner_delivery(&self, id: PartnerId, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE partners SET certificates_delivered = certificates_delivered + 1,
                    last_delivery = ?1
                 WHERE id = ?2",
                params![ts(&at), id.to_string()],
            )
            .map_err(|e| db_err("record partner delivery", e))?;
        Ok(())
    }

    pub fn find_partner(&self, name: &str) -> Result<Option<RecyclerPartner>> {
        self.conn
            .query_row(
                &format!("SELECT {PARTNER_COLUMNS} FROM partners WHERE name = ?1"),
                params![name],
                row_to_partner,
            )
            .optional()
            .map_err(|e| db_err("get partner", e))
    }

    pub fn partner(&self, name: &str) -> Result<RecyclerPartner> {
        self.find_partner(name)?.ok_or_else(|| TrustwipeError::NotFound {
            kind: "partner",
            id: name.to_owned(),
        })
    }

    pub fn partner_by_id(&self, id: PartnerId) -> Result<RecyclerPartner> {
        self.conn
            .query_row(
                &format!("SELECT {PARTNER_COLUMNS} FROM partners WHERE id = ?1"),
                params![id.to_string()],
                row_to_partner,
            )
            .optional()
            .map_err(|e| db_err("get partner", e))?
            .ok_or_else(|| TrustwipeError::NotFound {
                kind: "partner",
                id: id.to_string(),
            })
    }

    /// All partners by name, optionally only those with `status`.
    pub fn list_partners(&self, status: Option<PartnerStatus>) -> Result<Vec<RecyclerPartner>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {PARTNER_COLUMNS} FROM partners
                 WHERE ?1 IS NULL OR status = ?1
                 ORDER BY name ASC"
            ))
            .map_err(|e| db_err("prepare partners", e))?;
        stmt.query_map(params![status.map(|s| s.as_str())], row_to_partner)
            .map_err(|e| db_err("list partners", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("collect partners", e))
    }
}

fn row_to_partner(row: &Row<'_>) -> rusqlite::Result<RecyclerPartner> {
    Ok(RecyclerPartner {
        id: PartnerId(get_uuid(row, 0)?),
        name: row.get(1)?,
        contact_email: row.get(2)?,
        api_endpoint: row.get(3)?,
        webhook_url: row.get(4)?,
        status: get_kw(row, 5)?,
        certification_level: get_kw(row, 6)?,
        auto_delivery: row.get(7)?,
        certificates_delivered: row.get::<_, i64>(8)? as u64,
        last_delivery: get_opt_ts(row, 9)?,
        sealed_api_key: row.get(10)?,
        created_at: get_ts(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use trustwipe_core::types::{CertificationLevel, PartnerStatus};

    use super::*;
    use crate::test_support::active_partner;

    #[test]
    fn insert_get_update() {
        let registry = Registry::open_in_memory().unwrap();
        let mut partner = RecyclerPartner::new(
            "EcoRecycle Solutions",
            "certs@ecorecycle.com",
            "https://api.ecorecycle.com/v2/certificates",
            CertificationLevel::EStewards,
        );
        registry.insert_partner(&partner).unwrap();

        let loaded = registry.partner("EcoRecycle Solutions").unwrap();
        assert_eq!(loaded, partner);
        assert_eq!(loaded.status, PartnerStatus::Pending);

        partner.status = PartnerStatus::Active;
        partner.sealed_api_key = Some(vec![1, 2, 3]);
        registry.update_partner(&partner).unwrap();
        let loaded = registry.partner_by_id(partner.id).unwrap();
        assert!(loaded.accepts_deliveries());
        assert_eq!(loaded.sealed_api_key, Some(vec![1, 2, 3]));
    }

    #[test]
    fn names_are_unique() {
        let registry = Registry::open_in_memory().unwrap();
        registry.insert_partner(&active_partner("GreenTech Recycling")).unwrap();
        assert!(matches!(
            registry.insert_partner(&active_partner("GreenTech Recycling")),
            Err(TrustwipeError::Duplicate { kind: "partner", .. })
        ));
    }

    #[test]
    fn list_filters_by_status() {
        let registry = Registry::open_in_memory().unwrap();
        registry.insert_partner(&active_partner("GreenTech Recycling")).unwrap();
        registry
            .insert_partner(&RecyclerPartner::new(
                "TechCycle Partners",
                "ops@techcycle.com",
                "https://techcycle.com/api",
                CertificationLevel::Iso14001,
            ))
            .unwrap();

        assert_eq!(registry.list_partners(None).unwrap().len(), 2);
        let active = registry.list_partners(Some(PartnerStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "GreenTech Recycling");
    }

    #[test]
    fn delivery_counter() {
        let registry = Registry::open_in_memory().unwrap();
        let partner = active_partner("GreenTech Recycling");
        registry.insert_partner(&partner).unwrap();
        let at = Utc::now();
        registry.record_partner_delivery(partner.id, at).unwrap();
        registry.record_partner_delivery(partner.id, at).unwrap();

        let loaded = registry.partner("GreenTech Recycling").unwrap();
        assert_eq!(loaded.certificates_delivered, 2);
        assert_eq!(loaded.last_delivery, Some(at));
    }
}
