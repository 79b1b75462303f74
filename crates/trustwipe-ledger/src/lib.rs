// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TrustWipe Ledger — the persistent registry of assets, certificates, anchor
// records, recycler partners, and deliveries, plus the delivery engine that
// pushes certificates to partners with bounded, classified retries.

pub mod dispatch;
pub mod health;
pub mod registry;
pub mod retry;
pub mod transport;
pub mod webhook;

pub use dispatch::{
    DispatchOutcome, DispatchSummary, Dispatcher, queue_auto_delivery, queue_delivery,
};
pub use health::{CircuitState, HealthTracker};
pub use registry::{Registry, StoredCertificate};
pub use registry::anchors::AnchorVerification;
pub use retry::{RetryConfig, classify_error};
pub use transport::{
    DeliveryRequest, DeliveryTransport, HttpTransport, OutboxTransport, RoutingTransport,
};
pub use webhook::WebhookPayload;

#[cfg(test)]
pub(crate) mod test_support;
