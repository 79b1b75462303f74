// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer — opens every backend subsystem and exposes the
// operations the subcommands call.
//
// The registry and audit log are rusqlite-backed and `Send` but not `Sync`,
// so they sit behind `Arc<Mutex<>>`. Every compliance-relevant operation is
// recorded in the audit trail, successful or not.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use trustwipe_certificate::{
    CertificatePdf, SignedCertificate, VerificationReport, WipeRun, amend_certificate,
    issue_certificate, verify_upload, write_bundle,
};
use trustwipe_core::AppConfig;
use trustwipe_core::compliance::check_method;
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::inventory::AssetFilter;
use trustwipe_core::types::{
    AnchorMetadata, Asset, BlockchainRecord, CertificateDelivery, CertificateId, DeliveryId,
    DeliveryMethod, DeliveryStatus, DriveId, PartnerStatus, RecyclerPartner, SanitizationMethod,
};
use trustwipe_ledger::{
    AnchorVerification, DispatchOutcome, DispatchSummary, Dispatcher, HealthTracker,
    HttpTransport, OutboxTransport, Registry, RoutingTransport, StoredCertificate,
    queue_auto_delivery, queue_delivery,
};
use trustwipe_security::{
    AuditEntry, AuditLog, CertificateSigner, KeyVault, TrustStore, VAULT_PASSPHRASE_ENV,
};

use super::data_dir;

const LEDGER_DB: &str = "ledger.db";
const AUDIT_DB: &str = "audit.db";
const CONFIG_FILE: &str = "config.json";
const SIGNING_KEY_FILE: &str = "signing_key.age";
const TRUST_STORE_FILE: &str = "trust_store.json";
const HEALTH_FILE: &str = "partner_health.json";
const OUTBOX_DIR: &str = "outbox";
const EXPORT_DIR: &str = "exports";

/// Certificate export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// `<id>.json` plus the detached `<id>.json.sig`.
    Json,
    Pdf,
}

/// The station's signing identity after `init`.
#[derive(Debug, Clone, Serialize)]
pub struct StationKey {
    pub issuer: String,
    pub fingerprint: String,
    pub public_key_hex: String,
    /// `false` when an existing key was reused.
    pub created: bool,
}

/// A newly issued (or amended) certificate.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub signed: SignedCertificate,
    pub content_hash: String,
    /// Queued because the asset's recycler has auto-delivery on.
    pub auto_delivery: Option<CertificateDelivery>,
}

/// A partner plus the operator-facing state of its circuit breaker.
#[derive(Debug, Clone, Serialize)]
pub struct PartnerOverview {
    #[serde(flatten)]
    pub partner: RecyclerPartner,
    pub has_api_key: bool,
    pub health: Option<String>,
}

/// Shared application services.
///
/// All fields are cheaply cloneable (Arc-wrapped).
#[derive(Clone)]
pub struct AppServices {
    registry: Arc<Mutex<Registry>>,
    audit_log: Arc<Mutex<AuditLog>>,
    vault: Option<KeyVault>,
    data_dir: PathBuf,
    config: Arc<Mutex<AppConfig>>,
}

impl AppServices {
    /// Initialise all services from the environment. Call once at startup.
    pub fn init() -> Result<Self> {
        let dir = data_dir::data_dir()?;
        let vault = match KeyVault::from_env() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("{VAULT_PASSPHRASE_ENV} not set; signing and API keys are unavailable");
                None
            }
        };
        Self::open(dir, vault)
    }

    /// Open the services rooted at `dir`.
    pub fn open(dir: PathBuf, vault: Option<KeyVault>) -> Result<Self> {
        info!(path = %dir.display(), "initialising app services");
        std::fs::create_dir_all(&dir)?;

        let registry = Registry::open(dir.join(LEDGER_DB))?;
        let audit_log = AuditLog::open(dir.join(AUDIT_DB))?;
        let config = load_config(&dir)?.unwrap_or_default();

        Ok(Self {
            registry: Arc::new(Mutex::new(registry)),
            audit_log: Arc::new(Mutex::new(audit_log)),
            vault,
            data_dir: dir,
            config: Arc::new(Mutex::new(config)),
        })
    }

    // -- Station setup -------------------------------------------------------

    /// Create (or reuse) the station signing key, trust it under the
    /// configured CA name, and persist the configuration.
    pub fn initialize(
        &self,
        ca_name: Option<String>,
        operator: Option<String>,
    ) -> Result<StationKey> {
        let mut config = self.config()?;
        if let Some(name) = ca_name {
            config.ca_name = name;
        }
        if operator.is_some() {
            config.operator = operator;
        }

        let key_path = self.data_dir.join(SIGNING_KEY_FILE);
        let created = !key_path.exists();
        let signer = if created {
            let signer = CertificateSigner::generate()?;
            self.vault()?
                .seal_to_file(signer.private_key_pkcs8_der(), &key_path)?;
            info!(fingerprint = %signer.fingerprint(), "station signing key created");
            signer
        } else {
            self.signer()?
        };

        let trust_path = self.data_dir.join(TRUST_STORE_FILE);
        let mut trust = TrustStore::load(&trust_path)?;
        trust.add(config.ca_name.clone(), &signer.public_key_hex())?;
        trust.save(&trust_path)?;
        self.save_config(&config)?;

        let fingerprint = signer.fingerprint();
        self.audit(
            "station.init",
            &fingerprint,
            None,
            true,
            Some(if created { "signing key created" } else { "signing key reused" }),
        );
        Ok(StationKey {
            issuer: config.ca_name,
            fingerprint,
            public_key_hex: signer.public_key_hex(),
            created,
        })
    }

    /// Unseal the station signing key.
    pub fn signer(&self) -> Result<CertificateSigner> {
        let path = self.data_dir.join(SIGNING_KEY_FILE);
        if !path.exists() {
            return Err(TrustwipeError::NotFound {
                kind: "signing key",
                id: path.display().to_string(),
            });
        }
        let der = self.vault()?.open_file(&path)?;
        CertificateSigner::from_pkcs8(&der)
    }

    pub fn trust_store(&self) -> Result<TrustStore> {
        TrustStore::load(self.data_dir.join(TRUST_STORE_FILE))
    }

    // -- Assets --------------------------------------------------------------

    pub fn register_asset(&self, asset: &Asset) -> Result<()> {
        let result = self.registry()?.insert_asset(asset);
        self.audit_result(
            "asset.register",
            &asset.asset_tag,
            Some(&format!("{} drive(s)", asset.drives.len())),
            &result,
        );
        result
    }

    pub fn asset(&self, asset_tag: &str) -> Result<Asset> {
        self.registry()?.asset(asset_tag)
    }

    pub fn assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>> {
        self.registry()?.list_assets(filter)
    }

    pub fn queue_asset(&self, asset_tag: &str) -> Result<Asset> {
        self.change_asset(asset_tag, Some("asset.queue"), |_, asset| asset.enqueue())
    }

    /// Start sanitizing every drive of the asset. The method must be valid
    /// for each drive's media type.
    pub fn start_wipe(&self, asset_tag: &str, method: SanitizationMethod) -> Result<Asset> {
        self.change_asset(asset_tag, Some("asset.wipe_start"), |_, asset| {
            for drive in &asset.drives {
                check_method(drive.drive_type, method)?;
            }
            asset.start_wipe(method, Utc::now())
        })
    }

    /// Progress reports are frequent and not audited.
    pub fn update_progress(&self, asset_tag: &str, drive_path: &str, progress: u8) -> Result<Asset> {
        self.change_asset(asset_tag, None, |_, asset| {
            let id = drive_id(asset, drive_path)?;
            asset.update_drive_progress(id, progress)
        })
    }

    pub fn complete_drive(&self, asset_tag: &str, drive_path: &str) -> Result<Asset> {
        self.change_asset(asset_tag, Some("drive.verify"), |_, asset| {
            let id = drive_id(asset, drive_path)?;
            asset.complete_drive(id, Utc::now())
        })
    }

    pub fn fail_drive(&self, asset_tag: &str, drive_path: &str, reason: &str) -> Result<Asset> {
        self.change_asset(asset_tag, Some("drive.fail"), |_, asset| {
            let id = drive_id(asset, drive_path)?;
            asset.fail_drive(id, reason, Utc::now())
        })
    }

    pub fn fail_asset(&self, asset_tag: &str, reason: &str) -> Result<Asset> {
        self.change_asset(asset_tag, Some("asset.fail"), |_, asset| {
            asset.fail(reason, Utc::now())
        })
    }

    /// Release a verified asset. Every drive needs a current certificate.
    pub fn release_asset(&self, asset_tag: &str, recycler: Option<String>) -> Result<Asset> {
        self.change_asset(asset_tag, Some("asset.release"), |registry, asset| {
            for drive in &asset.drives {
                if registry
                    .current_certificate_for_drive(&asset.asset_tag, &drive.serial)?
                    .is_none()
                {
                    return Err(TrustwipeError::Validation(format!(
                        "drive {} has no certificate; issue one before release",
                        drive.path
                    )));
                }
            }
            asset.release(recycler, Utc::now())
        })
    }

    /// Load, change, and store an asset, auditing under `action` if given.
    fn change_asset(
        &self,
        asset_tag: &str,
        action: Option<&str>,
        change: impl FnOnce(&Registry, &mut Asset) -> Result<()>,
    ) -> Result<Asset> {
        let registry = self.registry()?;
        let result = registry.asset(asset_tag).and_then(|mut asset| {
            change(&*registry, &mut asset)?;
            registry.update_asset(&asset)?;
            Ok(asset)
        });
        if let Some(action) = action {
            let detail = result.as_ref().map(|a| a.status.to_string());
            self.audit_result(action, asset_tag, detail.as_deref().ok(), &result);
        }
        result
    }

    // -- Certificates --------------------------------------------------------

    /// Issue, sign, and store a certificate for one verified drive, then
    /// queue auto-delivery to the asset's recycler.
    pub fn issue_certificate(
        &self,
        asset_tag: &str,
        drive_path: &str,
        run: &WipeRun,
    ) -> Result<IssuedCertificate> {
        let signer = self.signer()?;
        let config = self.config()?;
        let registry = self.registry()?;
        let asset = registry.asset(asset_tag)?;

        let result = drive_id(&asset, drive_path)
            .and_then(|id| issue_certificate(&asset, id, run, &signer, config.operator.as_deref()))
            .and_then(|signed| {
                registry.insert_certificate(&signed)?;
                Ok(signed)
            });
        let signed = match result {
            Ok(signed) => signed,
            Err(e) => {
                self.audit("certificate.issue", asset_tag, None, false, Some(&e.to_string()));
                return Err(e);
            }
        };

        let content_hash = signed.content_hash()?;
        self.audit(
            "certificate.issue",
            signed.id().as_str(),
            Some(&content_hash),
            true,
            Some(&format!("{asset_tag} {drive_path}")),
        );
        let auto_delivery = self.auto_deliver(&registry, &asset, signed.id(), &config);
        Ok(IssuedCertificate {
            signed,
            content_hash,
            auto_delivery,
        })
    }

    /// Replace certificate `id` with a corrected one.
    pub fn amend_certificate(
        &self,
        id: &CertificateId,
        run: &WipeRun,
        reason: &str,
    ) -> Result<IssuedCertificate> {
        let signer = self.signer()?;
        let config = self.config()?;
        let registry = self.registry()?;

        let result = registry.certificate(id).and_then(|previous| {
            let previous = previous.signed.certificate;
            let asset = registry.asset(&previous.asset_tag)?;
            let drive = asset
                .drives
                .iter()
                .find(|d| d.serial == previous.device.serial)
                .ok_or_else(|| TrustwipeError::NotFound {
                    kind: "drive",
                    id: format!("serial {} in asset {}", previous.device.serial, asset.asset_tag),
                })?;
            let signed = amend_certificate(
                &previous,
                &asset,
                drive.id,
                run,
                &signer,
                config.operator.as_deref(),
                reason,
            )?;
            registry.insert_certificate(&signed)?;
            Ok((asset, signed))
        });
        let (asset, signed) = match result {
            Ok(pair) => pair,
            Err(e) => {
                self.audit("certificate.amend", id.as_str(), None, false, Some(&e.to_string()));
                return Err(e);
            }
        };

        let content_hash = signed.content_hash()?;
        self.audit(
            "certificate.amend",
            signed.id().as_str(),
            Some(&content_hash),
            true,
            Some(&format!("supersedes {id}: {reason}")),
        );
        let auto_delivery = self.auto_deliver(&registry, &asset, signed.id(), &config);
        Ok(IssuedCertificate {
            signed,
            content_hash,
            auto_delivery,
        })
    }

    /// The certificate is already stored, so a queueing problem is logged
    /// rather than failing the issue.
    fn auto_deliver(
        &self,
        registry: &Registry,
        asset: &Asset,
        id: &CertificateId,
        config: &AppConfig,
    ) -> Option<CertificateDelivery> {
        match queue_auto_delivery(registry, asset, id, config) {
            Ok(Some(delivery)) => {
                self.audit(
                    "delivery.queue",
                    id.as_str(),
                    None,
                    true,
                    Some(&format!("auto: {}", delivery.partner_name)),
                );
                Some(delivery)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(certificate = %id, error = %e, "auto-delivery not queued");
                None
            }
        }
    }

    pub fn certificate(&self, id: &CertificateId) -> Result<StoredCertificate> {
        self.registry()?.certificate(id)
    }

    /// Certificates for one asset (oldest first), or every certificate
    /// (newest first).
    pub fn certificates(&self, asset_tag: Option<&str>) -> Result<Vec<StoredCertificate>> {
        let registry = self.registry()?;
        match asset_tag {
            Some(tag) => registry.certificates_for_asset(tag),
            None => registry.list_certificates(),
        }
    }

    /// Verify a certificate file against the trust store.
    ///
    /// Without an explicit signature path, `<file>.sig` is used when present.
    pub fn verify_file(&self, path: &Path, signature: Option<&Path>) -> Result<VerificationReport> {
        let contents = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        let sig_path = match signature {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let mut sibling = path.as_os_str().to_owned();
                sibling.push(".sig");
                let sibling = PathBuf::from(sibling);
                sibling.exists().then_some(sibling)
            }
        };
        let signature = sig_path.map(std::fs::read).transpose()?;

        let report = verify_upload(file_name, &contents, signature.as_deref(), &self.trust_store()?);
        let details = report.details.as_ref();
        let subject = details.map_or_else(|| file_name.to_owned(), |d| d.certificate_id.to_string());
        self.audit(
            "certificate.verify",
            &subject,
            details.map(|d| d.content_hash.as_str()),
            !report.is_error(),
            Some(&report.message),
        );
        Ok(report)
    }

    /// Write the certificate to `out_dir` (default `<data dir>/exports`).
    pub fn export_certificate(
        &self,
        id: &CertificateId,
        format: ExportFormat,
        out_dir: Option<PathBuf>,
    ) -> Result<Vec<PathBuf>> {
        let stored = self.certificate(id)?;
        let dir = match out_dir {
            Some(dir) => {
                std::fs::create_dir_all(&dir)?;
                dir
            }
            None => data_dir::data_subdir(&self.data_dir, EXPORT_DIR)?,
        };

        let result = match format {
            ExportFormat::Json => write_bundle(&stored.signed, &dir).map(|(cert, sig)| vec![cert, sig]),
            ExportFormat::Pdf => {
                let config = self.config()?;
                let path = dir.join(format!("{id}.pdf"));
                let url = format!("{}/{id}", config.certificate_base_url.trim_end_matches('/'));
                CertificatePdf::new(&stored.signed)
                    .with_verify_url(url)
                    .write_to_file(&path)
                    .map(|()| vec![path])
            }
        };
        self.audit_result(
            "certificate.export",
            id.as_str(),
            Some(&format!("{format:?}").to_lowercase()),
            &result,
        );
        result
    }

    // -- Anchors -------------------------------------------------------------

    /// Record that the certificate's content hash was submitted on-chain in
    /// `tx_hash`.
    pub fn submit_anchor(
        &self,
        id: &CertificateId,
        tx_hash: &str,
        network: Option<String>,
    ) -> Result<BlockchainRecord> {
        let config = self.config()?;
        let registry = self.registry()?;
        let result = registry.certificate(id).and_then(|stored| {
            let cert = &stored.signed.certificate;
            let record = BlockchainRecord::pending(
                id.clone(),
                tx_hash,
                stored.content_hash.clone(),
                network.unwrap_or_else(|| config.network_name.clone()),
                AnchorMetadata {
                    device_model: cert.device.model.clone(),
                    method: cert.method.display_name().to_owned(),
                    operator: config.operator.clone(),
                },
                Utc::now(),
            )?;
            registry.submit_anchor(&record)?;
            Ok(record)
        });
        self.audit_result("anchor.submit", id.as_str(), Some(tx_hash), &result);
        result
    }

    pub fn confirm_anchor(&self, tx_hash: &str, block_number: u64, gas_used: u64) -> Result<BlockchainRecord> {
        let result = self
            .registry()?
            .confirm_anchor(tx_hash, block_number, gas_used, Utc::now());
        let subject = anchor_subject(&result, tx_hash);
        self.audit_result(
            "anchor.confirm",
            &subject,
            Some(&format!("{tx_hash} block {block_number}")),
            &result,
        );
        result
    }

    pub fn fail_anchor(&self, tx_hash: &str, reason: &str) -> Result<BlockchainRecord> {
        let result = self.registry()?.fail_anchor(tx_hash, reason, Utc::now());
        let subject = anchor_subject(&result, tx_hash);
        self.audit_result("anchor.fail", &subject, Some(&format!("{tx_hash}: {reason}")), &result);
        result
    }

    /// Fail pending anchors older than the configured timeout.
    pub fn expire_anchors(&self) -> Result<Vec<BlockchainRecord>> {
        let config = self.config()?;
        let timeout = chrono::Duration::minutes(i64::from(config.anchor_timeout_minutes));
        let expired = self.registry()?.expire_pending(timeout, Utc::now())?;
        for record in &expired {
            self.audit(
                "anchor.expire",
                record.certificate_id.as_str(),
                Some(&record.cert_hash),
                true,
                Some(&record.transaction_hash),
            );
        }
        Ok(expired)
    }

    /// Check the certificate's confirmed anchor at `current_block`.
    pub fn verify_anchor(&self, id: &CertificateId, current_block: u64) -> Result<AnchorVerification> {
        let config = self.config()?;
        let verification = {
            let registry = self.registry()?;
            let stored = registry.certificate(id)?;
            registry.verify_anchor(&stored, current_block, config.min_confirmations)?
        };
        self.audit(
            "anchor.verify",
            id.as_str(),
            Some(&verification.computed_hash),
            verification.valid,
            verification.reason.as_deref(),
        );
        Ok(verification)
    }

    /// Anchor records matching `search` (certificate ID, transaction hash,
    /// or device model), newest first.
    pub fn anchors(&self, search: Option<&str>) -> Result<Vec<BlockchainRecord>> {
        self.registry()?.search_anchors(search.unwrap_or_default())
    }

    pub fn lookup_anchor(&self, query: &str) -> Result<Option<BlockchainRecord>> {
        self.registry()?.lookup_anchor(query)
    }

    // -- Partners ------------------------------------------------------------

    /// Register a partner, sealing its API key with the vault.
    pub fn add_partner(&self, mut partner: RecyclerPartner, api_key: Option<&str>) -> Result<RecyclerPartner> {
        if let Some(key) = api_key {
            partner.sealed_api_key = Some(self.vault()?.seal(key.as_bytes())?);
        }
        let result = self.registry()?.insert_partner(&partner);
        self.audit_result(
            "partner.add",
            &partner.name,
            Some(partner.certification_level.as_str()),
            &result,
        );
        result.map(|()| partner)
    }

    pub fn set_partner_status(&self, name: &str, status: PartnerStatus) -> Result<RecyclerPartner> {
        self.change_partner(name, "partner.status", status.as_str(), |partner| {
            partner.status = status;
            Ok(())
        })
    }

    pub fn set_partner_auto_delivery(&self, name: &str, enabled: bool) -> Result<RecyclerPartner> {
        let detail = if enabled { "auto-delivery on" } else { "auto-delivery off" };
        self.change_partner(name, "partner.auto_delivery", detail, |partner| {
            partner.auto_delivery = enabled;
            Ok(())
        })
    }

    /// Replace the partner's API key.
    pub fn set_partner_key(&self, name: &str, api_key: &str) -> Result<RecyclerPartner> {
        let sealed = self.vault()?.seal(api_key.as_bytes())?;
        self.change_partner(name, "partner.rotate_key", "API key replaced", |partner| {
            partner.sealed_api_key = Some(sealed);
            Ok(())
        })
    }

    fn change_partner(
        &self,
        name: &str,
        action: &str,
        detail: &str,
        change: impl FnOnce(&mut RecyclerPartner) -> Result<()>,
    ) -> Result<RecyclerPartner> {
        let result = {
            let registry = self.registry()?;
            registry.partner(name).and_then(|mut partner| {
                change(&mut partner)?;
                registry.update_partner(&partner)?;
                Ok(partner)
            })
        };
        self.audit_result(action, name, Some(detail), &result);
        result
    }

    pub fn partners(&self, status: Option<PartnerStatus>) -> Result<Vec<PartnerOverview>> {
        let partners = self.registry()?.list_partners(status)?;
        let health = self.load_health()?;
        let now = Utc::now();
        Ok(partners
            .into_iter()
            .map(|partner| PartnerOverview {
                has_api_key: partner.sealed_api_key.is_some(),
                health: health.status_message(&partner.name, now),
                partner,
            })
            .collect())
    }

    /// Check the partner's webhook (or API endpoint). Returns the HTTP status.
    pub async fn test_partner(&self, name: &str) -> Result<u16> {
        let config = self.config()?;
        let partner = self.registry()?.partner(name)?;
        let api_key = self.unseal_api_key(&partner)?;
        let url = partner
            .webhook_url
            .clone()
            .unwrap_or_else(|| partner.api_endpoint.clone());

        let http = HttpTransport::new(Duration::from_secs(config.delivery_timeout_secs))?;
        let result = http.test_connection(&url, api_key.as_deref()).await;
        let detail = match &result {
            Ok(status) => format!("{url} answered HTTP {status}"),
            Err(_) => url.clone(),
        };
        self.audit_result("partner.test", name, Some(&detail), &result);
        result
    }

    fn unseal_api_key(&self, partner: &RecyclerPartner) -> Result<Option<String>> {
        partner
            .sealed_api_key
            .as_deref()
            .map(|sealed| {
                let bytes = self.vault()?.open(sealed)?;
                String::from_utf8(bytes)
                    .map_err(|e| TrustwipeError::Decryption(format!("API key is not UTF-8: {e}")))
            })
            .transpose()
    }

    // -- Deliveries ----------------------------------------------------------

    pub fn queue_delivery(
        &self,
        id: &CertificateId,
        partner: &str,
        method: Option<DeliveryMethod>,
    ) -> Result<CertificateDelivery> {
        let config = self.config()?;
        let result = queue_delivery(&*self.registry()?, id, partner, method, &config);
        self.audit_result("delivery.queue", id.as_str(), Some(partner), &result);
        result
    }

    /// Attempt every due delivery once, carrying partner circuit state
    /// across runs.
    pub async fn run_deliveries(&self) -> Result<DispatchSummary> {
        let config = self.config()?;
        let outbox = match &config.outbox_dir {
            Some(dir) => dir.clone(),
            None => data_dir::data_subdir(&self.data_dir, OUTBOX_DIR)?,
        };
        let http = HttpTransport::new(Duration::from_secs(config.delivery_timeout_secs))?;
        let transport = RoutingTransport::new(http, Some(OutboxTransport::new(outbox)));

        let mut dispatcher = Dispatcher::new(transport, config).with_health(self.load_health()?);
        if let Some(vault) = &self.vault {
            dispatcher = dispatcher.with_vault(vault.clone());
        }

        // Own connection: the shared registry lock is never held across
        // partner I/O.
        let registry = Registry::open(self.data_dir.join(LEDGER_DB))?;
        let summary = dispatcher.run_once(&registry, Utc::now()).await?;
        self.persist_health(dispatcher.health())?;

        for outcome in &summary.outcomes {
            self.audit_outcome(outcome);
        }
        Ok(summary)
    }

    fn audit_outcome(&self, outcome: &DispatchOutcome) {
        let subject = outcome.delivery().to_string();
        match outcome {
            DispatchOutcome::Delivered { partner, .. } => {
                self.audit("delivery.deliver", &subject, None, true, Some(partner));
            }
            DispatchOutcome::RetryScheduled { partner, error, .. } => {
                let detail = format!("{partner}: {error}");
                self.audit("delivery.retry_scheduled", &subject, None, false, Some(&detail));
            }
            DispatchOutcome::Failed {
                partner,
                error,
                class,
                ..
            } => {
                let detail = format!("{partner} ({class:?}): {error}");
                self.audit("delivery.fail", &subject, None, false, Some(&detail));
            }
            DispatchOutcome::Deferred { .. } | DispatchOutcome::Skipped { .. } => {}
        }
    }

    /// Operator retry of a failed delivery.
    pub fn retry_delivery(&self, id: DeliveryId) -> Result<CertificateDelivery> {
        let result = self.registry()?.manual_retry_delivery(id, Utc::now());
        let detail = result.as_ref().ok().map(|d| d.partner_name.clone());
        self.audit_result("delivery.retry", &id.to_string(), detail.as_deref(), &result);
        result
    }

    pub fn deliveries(&self, status: Option<DeliveryStatus>) -> Result<Vec<CertificateDelivery>> {
        self.registry()?.list_deliveries(status)
    }

    pub fn deliveries_for_certificate(&self, id: &CertificateId) -> Result<Vec<CertificateDelivery>> {
        self.registry()?.deliveries_for_certificate(id)
    }

    /// Circuit state saved by the last dispatch run. A missing or unreadable
    /// file starts from healthy partners.
    pub fn load_health(&self) -> Result<HealthTracker> {
        let path = self.data_dir.join(HEALTH_FILE);
        if !path.exists() {
            return Ok(HealthTracker::from(&self.config()?));
        }
        let json = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<HealthTracker>(&json) {
            Ok(mut tracker) => {
                tracker.reconfigure(&self.config()?);
                Ok(tracker)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable partner health");
                Ok(HealthTracker::from(&self.config()?))
            }
        }
    }

    fn persist_health(&self, health: &HealthTracker) -> Result<()> {
        let json = serde_json::to_string_pretty(health)?;
        std::fs::write(self.data_dir.join(HEALTH_FILE), json)?;
        Ok(())
    }

    // -- Audit Trail ---------------------------------------------------------

    /// Record an audit entry unless auditing is switched off.
    pub fn audit(
        &self,
        action: &str,
        subject: &str,
        content_hash: Option<&str>,
        success: bool,
        details: Option<&str>,
    ) {
        let enabled = self.config.lock().map(|c| c.audit_enabled).unwrap_or(true);
        if !enabled {
            return;
        }
        if let Ok(log) = self.audit_log.lock()
            && let Err(e) = log.record(action, subject, content_hash, success, details)
        {
            error!(error = %e, "failed to record audit entry");
        }
    }

    /// Audit the outcome of `result`; failures record the error text.
    fn audit_result<T>(&self, action: &str, subject: &str, detail: Option<&str>, result: &Result<T>) {
        match result {
            Ok(_) => self.audit(action, subject, None, true, detail),
            Err(e) => {
                let message = match detail {
                    Some(detail) => format!("{detail}: {e}"),
                    None => e.to_string(),
                };
                self.audit(action, subject, None, false, Some(&message));
            }
        }
    }

    pub fn recent_audit_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        lock(&self.audit_log, "audit")?.recent_entries(limit)
    }

    pub fn audit_entries_for(&self, subject: &str) -> Result<Vec<AuditEntry>> {
        lock(&self.audit_log, "audit")?.entries_for_subject(subject)
    }

    pub fn audit_count(&self) -> Result<u64> {
        lock(&self.audit_log, "audit")?.count()
    }

    // -- Config Persistence --------------------------------------------------

    /// A clone of the current config.
    pub fn config(&self) -> Result<AppConfig> {
        Ok(lock(&self.config, "config")?.clone())
    }

    /// Validate, update, and persist the config.
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        config.validate()?;
        *lock(&self.config, "config")? = config.clone();
        persist_config(&self.data_dir, config)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn registry(&self) -> Result<MutexGuard<'_, Registry>> {
        lock(&self.registry, "registry")
    }

    fn vault(&self) -> Result<&KeyVault> {
        self.vault.as_ref().ok_or_else(|| {
            TrustwipeError::Encryption(format!("{VAULT_PASSPHRASE_ENV} is not set"))
        })
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| TrustwipeError::Database(format!("{name} lock poisoned")))
}

fn drive_id(asset: &Asset, drive_path: &str) -> Result<DriveId> {
    asset
        .drive_by_path(drive_path)
        .map(|d| d.id)
        .ok_or_else(|| TrustwipeError::NotFound {
            kind: "drive",
            id: format!("{drive_path} in asset {}", asset.asset_tag),
        })
}

/// Audit anchors under their certificate when the record is known.
fn anchor_subject(result: &Result<BlockchainRecord>, tx_hash: &str) -> String {
    match result {
        Ok(record) => record.certificate_id.to_string(),
        Err(_) => tx_hash.to_owned(),
    }
}

// -- Config file persistence -------------------------------------------------

/// A missing file means defaults; a present file must parse and validate.
fn load_config(data_dir: &Path) -> Result<Option<AppConfig>> {
    let path = data_dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(&path)?;
    let config: AppConfig = serde_json::from_str(&data)
        .map_err(|e| TrustwipeError::Validation(format!("{}: {e}", path.display())))?;
    config.validate()?;
    Ok(Some(config))
}

fn persist_config(data_dir: &Path, config: &AppConfig) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}
