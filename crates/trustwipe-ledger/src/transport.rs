// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Delivery transports: how a certificate actually reaches a partner.
//
// Webhook and API deliveries are HTTP POSTs. Email deliveries are spooled as
// JSON message files into an outbox directory that an external mailer
// drains.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use trustwipe_certificate::SignedCertificate;
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::types::{DeliveryId, DeliveryMethod};

use crate::webhook::WebhookPayload;

/// Longest slice of a partner's error body kept in an error message.
const MAX_ERROR_DETAIL: usize = 200;

/// Everything a transport needs for one delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub delivery_id: DeliveryId,
    pub method: DeliveryMethod,
    pub partner_name: String,
    /// Webhook URL, API endpoint, or email address depending on `method`.
    pub destination: String,
    /// Plaintext API key, already unsealed.
    pub api_key: Option<String>,
    pub payload: WebhookPayload,
    pub certificate: SignedCertificate,
}

/// A channel that can hand a certificate to a partner.
pub trait DeliveryTransport: Send + Sync {
    fn deliver(&self, request: &DeliveryRequest) -> impl Future<Output = Result<()>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Body for the API method: the webhook envelope plus the signed bundle.
#[derive(Serialize)]
struct ApiSubmission<'a> {
    #[serde(flatten)]
    payload: &'a WebhookPayload,
    certificate: &'a SignedCertificate,
}

/// POSTs JSON to partner webhooks and APIs.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trustwipe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TrustwipeError::Delivery(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Reach `url` with the partner's key and report the HTTP status.
    ///
    /// Any response counts as reachable except 401/403, which mean the key
    /// was refused.
    #[instrument(skip(self, api_key))]
    pub async fn test_connection(&self, url: &str, api_key: Option<&str>) -> Result<u16> {
        let mut req = self.client.get(url);
        if let Some(key) = api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        let resp = req
            .send()
            .await
            .map_err(|e| TrustwipeError::Delivery(format!("connection test failed: {e}")))?;
        let status = resp.status().as_u16();
        if matches!(status, 401 | 403) {
            return Err(TrustwipeError::DeliveryRejected {
                status,
                detail: "API key refused".into(),
            });
        }
        info!(status, "partner endpoint reachable");
        Ok(status)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        api_key: Option<&str>,
        body: &B,
    ) -> Result<()> {
        let mut req = self.client.post(url).json(body);
        if let Some(key) = api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        let resp = req
            .send()
            .await
            .map_err(|e| TrustwipeError::Delivery(format!("HTTP request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "partner accepted delivery");
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        let detail: String = body.chars().take(MAX_ERROR_DETAIL).collect();
        Err(TrustwipeError::DeliveryRejected {
            status: status.as_u16(),
            detail,
        })
    }
}

impl DeliveryTransport for HttpTransport {
    #[instrument(skip(self, request), fields(delivery = %request.delivery_id, partner = %request.partner_name, method = %request.method))]
    async fn deliver(&self, request: &DeliveryRequest) -> Result<()> {
        let key = request.api_key.as_deref();
        match request.method {
            DeliveryMethod::Webhook => self.post(&request.destination, key, &request.payload).await,
            DeliveryMethod::Api => {
                let body = ApiSubmission {
                    payload: &request.payload,
                    certificate: &request.certificate,
                };
                self.post(&request.destination, key, &body).await
            }
            DeliveryMethod::Email => Err(TrustwipeError::Validation(
                "email deliveries go through the outbox, not HTTP".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Email outbox
// ---------------------------------------------------------------------------

/// One spooled email.
#[derive(Debug, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub to: String,
    pub subject: String,
    pub payload: WebhookPayload,
    pub certificate: SignedCertificate,
}

/// Writes email deliveries as `<delivery id>.json` files.
#[derive(Debug, Clone)]
pub struct OutboxTransport {
    dir: PathBuf,
}

impl OutboxTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DeliveryTransport for OutboxTransport {
    #[instrument(skip(self, request), fields(delivery = %request.delivery_id, to = %request.destination))]
    async fn deliver(&self, request: &DeliveryRequest) -> Result<()> {
        if !request.destination.contains('@') {
            return Err(TrustwipeError::Validation(format!(
                "{:?} is not an email address",
                request.destination
            )));
        }
        let message = OutboxMessage {
            to: request.destination.clone(),
            subject: format!(
                "Data sanitization certificate {} ({})",
                request.payload.certificate_id, request.payload.asset_tag
            ),
            payload: request.payload.clone(),
            certificate: request.certificate.clone(),
        };
        let json = serde_json::to_vec_pretty(&message)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let final_path = self.dir.join(format!("{}.json", request.delivery_id));
        let tmp_path = self.dir.join(format!(".{}.json.tmp", request.delivery_id));
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        info!(path = %final_path.display(), "email spooled");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Sends each delivery through the transport its method calls for.
#[derive(Debug, Clone)]
pub struct RoutingTransport<H = HttpTransport, E = OutboxTransport> {
    http: H,
    outbox: Option<E>,
}

impl<H: DeliveryTransport, E: DeliveryTransport> RoutingTransport<H, E> {
    pub fn new(http: H, outbox: Option<E>) -> Self {
        Self { http, outbox }
    }
}

impl<H: DeliveryTransport, E: DeliveryTransport> DeliveryTransport for RoutingTransport<H, E> {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<()> {
        match request.method {
            DeliveryMethod::Webhook | DeliveryMethod::Api => self.http.deliver(request).await,
            DeliveryMethod::Email => match &self.outbox {
                Some(outbox) => outbox.deliver(request).await,
                None => {
                    warn!(partner = %request.partner_name, "no outbox directory configured");
                    Err(TrustwipeError::Validation(
                        "email delivery needs an outbox directory in the configuration".into(),
                    ))
                }
            },
        }
    }
}
