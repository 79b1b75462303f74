// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certificate deliveries to recycler partners.
//
// Retry state lives in the row (`retry_count`, `next_attempt_at`,
// `error_history`) so backoff survives restarts and a dispatcher run never
// sleeps.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use tracing::{info, instrument};
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::types::{
    CertificateDelivery, CertificateId, DeliveryId, DeliveryStatus, ErrorClass, PartnerId,
};

use super::{
    Registry, db_err, get_json, get_kw, get_opt_ts, get_ts, get_uuid, is_constraint, opt_ts, ts,
};

const DELIVERY_COLUMNS: &str = "id, certificate_id, partner_id, partner_name, method, status,
    retry_count, max_retries, created_at, updated_at, next_attempt_at, delivered_at, last_error,
    error_class, error_history";

impl Registry {
    /// Queue a delivery. A certificate is delivered to a partner at most once.
    #[instrument(skip(self, delivery), fields(certificate = %delivery.certificate_id, partner = %delivery.partner_name))]
    pub fn enqueue_delivery(&self, delivery: &CertificateDelivery) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO deliveries ({DELIVERY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                ),
                params![
                    delivery.id.to_string(),
                    delivery.certificate_id.as_str(),
                    delivery.partner_id.to_string(),
                    delivery.partner_name,
                    delivery.method.as_str(),
                    delivery.status.as_str(),
                    delivery.retry_count,
                    delivery.max_retries,
                    ts(&delivery.created_at),
                    ts(&delivery.updated_at),
                    opt_ts(&delivery.next_attempt_at),
                    opt_ts(&delivery.delivered_at),
                    delivery.last_error,
                    error_class_json(delivery.error_class)?,
                    serde_json::to_string(&delivery.error_history)?,
                ],
            )
            .map_err(|e| {
                if is_constraint(&e) {
                    TrustwipeError::Duplicate {
                        kind: "delivery",
                        id: format!("{} to {}", delivery.certificate_id, delivery.partner_name),
                    }
                } else {
                    db_err("insert delivery", e)
                }
            })?;
        info!(method = %delivery.method, "delivery queued");
        Ok(())
    }

    /// Persist the retry and status fields of a delivery.
    #[instrument(skip(self, delivery), fields(delivery = %delivery.id, status = %delivery.status))]
    pub fn update_delivery(&self, delivery: &CertificateDelivery) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE deliveries SET status = ?1, retry_count = ?2, max_retries = ?3,
                    updated_at = ?4, next_attempt_at = ?5, delivered_at = ?6, last_error = ?7,
                    error_class = ?8, error_history = ?9
                 WHERE id = ?10",
                params![
                    delivery.status.as_str(),
                    delivery.retry_count,
                    delivery.max_retries,
                    ts(&delivery.updated_at),
                    opt_ts(&delivery.next_attempt_at),
                    opt_ts(&delivery.delivered_at),
                    delivery.last_error,
                    error_class_json(delivery.error_class)?,
                    serde_json::to_string(&delivery.error_history)?,
                    delivery.id.to_string(),
                ],
            )
            .map_err(|e| db_err("update delivery", e))?;
        if rows == 0 {
            return Err(TrustwipeError::NotFound {
                kind: "delivery",
                id: delivery.id.to_string(),
            });
        }
        Ok(())
    }

    pub fn delivery(&self, id: DeliveryId) -> Result<CertificateDelivery> {
        self.conn
            .query_row(
                &format!("SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE id = ?1"),
                params![id.to_string()],
                row_to_delivery,
            )
            .optional()
            .map_err(|e| db_err("get delivery", e))?
            .ok_or_else(|| TrustwipeError::NotFound {
                kind: "delivery",
                id: id.to_string(),
            })
    }

    /// Pending deliveries whose next attempt is at or before `now`, oldest
    /// first.
    pub fn due_deliveries(&self, now: DateTime<Utc>) -> Result<Vec<CertificateDelivery>> {
        let pending = self.query_deliveries(
            &format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE status = ?1
                 ORDER BY created_at ASC, id ASC"
            ),
            params![DeliveryStatus::Pending.as_str()],
        )?;
        Ok(pending.into_iter().filter(|d| d.is_due(now)).collect())
    }

    /// Operator retry of a failed delivery. Returns the re-armed delivery.
    #[instrument(skip(self))]
    pub fn manual_retry_delivery(
        &self,
        id: DeliveryId,
        at: DateTime<Utc>,
    ) -> Result<CertificateDelivery> {
        let mut delivery = self.delivery(id)?;
        delivery.manual_retry(at)?;
        self.update_delivery(&delivery)?;
        info!(partner = %delivery.partner_name, "delivery re-armed");
        Ok(delivery)
    }

    /// All deliveries, newest first, optionally only those with `status`.
    pub fn list_deliveries(
        &self,
        status: Option<DeliveryStatus>,
    ) -> Result<Vec<CertificateDelivery>> {
        self.query_deliveries(
            &format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries
                 WHERE ?1 IS NULL OR status = ?1
                 ORDER BY created_at DESC, id DESC"
            ),
            params![status.map(|s| s.as_str())],
        )
    }

    pub fn deliveries_for_certificate(
        &self,
        certificate_id: &CertificateId,
    ) -> Result<Vec<CertificateDelivery>> {
        self.query_deliveries(
            &format!(
                "SELECT {DELIVERY_COLUMNS} FROM deliveries WHERE certificate_id = ?1
                 ORDER BY created_at ASC, id ASC"
            ),
            params![certificate_id.as_str()],
        )
    }

    fn query_deliveries(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<CertificateDelivery>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| db_err("prepare deliveries", e))?;
        stmt.query_map(params, row_to_delivery)
            .map_err(|e| db_err("query deliveries", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("collect deliveries", e))
    }
}

fn error_class_json(class: Option<ErrorClass>) -> Result<Option<String>> {
    Ok(class.map(|c| serde_json::to_string(&c)).transpose()?)
}

fn row_to_delivery(row: &Row<'_>) -> rusqlite::Result<CertificateDelivery> {
    let error_class: Option<ErrorClass> = match row.get::<_, Option<String>>(13)? {
        Some(_) => Some(get_json(row, 13)?),
        None => None,
    };
    Ok(CertificateDelivery {
        id: DeliveryId(get_uuid(row, 0)?),
        certificate_id: CertificateId(row.get(1)?),
        partner_id: PartnerId(get_uuid(row, 2)?),
        partner_name: row.get(3)?,
        method: get_kw(row, 4)?,
        status: get_kw(row, 5)?,
        retry_count: row.get(6)?,
        max_retries: row.get(7)?,
        created_at: get_ts(row, 8)?,
        updated_at: get_ts(row, 9)?,
        next_attempt_at: get_opt_ts(row, 10)?,
        delivered_at: get_opt_ts(row, 11)?,
        last_error: row.get(12)?,
        error_class,
        error_history: get_json(row, 14)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use trustwipe_core::types::DeliveryMethod;
    use trustwipe_security::CertificateSigner;

    use super::*;
    use crate::test_support::{active_partner, certified};

    fn queued(registry: &Registry) -> CertificateDelivery {
        let signer = CertificateSigner::generate().unwrap();
        let (_, signed) = certified(registry, &signer, "LT-002-2025");
        let partner = active_partner("GreenTech Recycling");
        registry.insert_partner(&partner).unwrap();
        let delivery =
            CertificateDelivery::new(signed.id().clone(), &partner, DeliveryMethod::Webhook, 3);
        registry.enqueue_delivery(&delivery).unwrap();
        delivery
    }

    #[test]
    fn enqueue_and_due() {
        let registry = Registry::open_in_memory().unwrap();
        let delivery = queued(&registry);

        let due = registry.due_deliveries(Utc::now() + Duration::seconds(1)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0], delivery);

        assert!(matches!(
            registry.enqueue_delivery(&CertificateDelivery {
                id: DeliveryId::new(),
                ..delivery.clone()
            }),
            Err(TrustwipeError::Duplicate { kind: "delivery", .. })
        ));
    }

    #[test]
    fn backoff_hides_until_due() {
        let registry = Registry::open_in_memory().unwrap();
        let mut delivery = queued(&registry);
        let now = Utc::now();

        delivery
            .schedule_retry("HTTP 503", ErrorClass::Transient, now + Duration::seconds(30))
            .unwrap();
        registry.update_delivery(&delivery).unwrap();

        assert!(registry.due_deliveries(now).unwrap().is_empty());
        let later = registry.due_deliveries(now + Duration::seconds(31)).unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].retry_count, 1);
        assert_eq!(later[0].error_class, Some(ErrorClass::Transient));
        assert_eq!(later[0].error_history, vec!["HTTP 503".to_owned()]);
    }

    #[test]
    fn manual_retry_rearms_failed() {
        let registry = Registry::open_in_memory().unwrap();
        let mut delivery = queued(&registry);
        let now = Utc::now();
        delivery
            .fail_terminal("HTTP 400", ErrorClass::Permanent, now)
            .unwrap();
        registry.update_delivery(&delivery).unwrap();
        assert!(registry.due_deliveries(now + Duration::days(1)).unwrap().is_empty());
        assert_eq!(
            registry.list_deliveries(Some(DeliveryStatus::Failed)).unwrap().len(),
            1
        );

        let rearmed = registry.manual_retry_delivery(delivery.id, now).unwrap();
        assert_eq!(rearmed.status, DeliveryStatus::Pending);
        assert_eq!(rearmed.retry_count, 0);
        assert_eq!(rearmed.error_history.len(), 1);
        assert_eq!(registry.due_deliveries(now).unwrap().len(), 1);

        // Only failed deliveries can be retried by hand.
        assert!(registry.manual_retry_delivery(delivery.id, now).is_err());
    }

    #[test]
    fn per_certificate_listing() {
        let registry = Registry::open_in_memory().unwrap();
        let delivery = queued(&registry);
        let listed = registry
            .deliveries_for_certificate(&delivery.certificate_id)
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(registry.list_deliveries(None).unwrap().len(), 1);
    }
}
