// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certificate signing — ECDSA P-256 key pair for the issuing station, and the
// trust store of issuer public keys accepted during verification.
//
// Signatures are ASN.1 DER over SHA-256 of the canonical certificate JSON.
// Public keys are carried as hex-encoded uncompressed SEC1 points
// (0x04 || x || y, 65 bytes).

use std::path::Path;

use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_ASN1, ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair,
    UnparsedPublicKey,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use trustwipe_core::error::{Result, TrustwipeError};

use crate::integrity::hash_bytes;

/// Algorithm label written into certificates and signature files.
pub const SIG_ALG: &str = "ECDSA-P256-SHA256";

/// The station's signing key.
///
/// Holds the PKCS#8 document so it can be sealed into the key vault, plus the
/// parsed key pair for signing.
pub struct CertificateSigner {
    pkcs8_der: Vec<u8>,
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
}

impl CertificateSigner {
    /// Generate a fresh key pair using the OS CSPRNG.
    #[instrument]
    pub fn generate() -> Result<Self> {
        let rng = SystemRandom::new();
        let document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|e| TrustwipeError::Signing(format!("key generation failed: {e}")))?;
        let signer = Self::from_pkcs8(document.as_ref())?;
        info!(fingerprint = %signer.fingerprint(), "signing key generated");
        Ok(signer)
    }

    /// Load a key previously exported with [`private_key_pkcs8_der`].
    ///
    /// [`private_key_pkcs8_der`]: Self::private_key_pkcs8_der
    pub fn from_pkcs8(pkcs8_der: &[u8]) -> Result<Self> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8_der, &rng)
            .map_err(|e| TrustwipeError::Signing(format!("key parsing failed: {e}")))?;
        debug!(pkcs8_len = pkcs8_der.len(), "signing key loaded");
        Ok(Self {
            pkcs8_der: pkcs8_der.to_vec(),
            key_pair,
            rng,
        })
    }

    /// The PKCS#8 v1 DER private key. Seal it before writing to disk.
    pub fn private_key_pkcs8_der(&self) -> &[u8] {
        &self.pkcs8_der
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key_pair.public_key().as_ref())
    }

    /// Short identifier for the key: the first 16 bytes of the SHA-256 of
    /// the public key, hex encoded.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(self.key_pair.public_key().as_ref())
    }

    /// Sign `message` and return the hex-encoded DER signature.
    pub fn sign(&self, message: &[u8]) -> Result<String> {
        let sig = self
            .key_pair
            .sign(&self.rng, message)
            .map_err(|e| TrustwipeError::Signing(format!("signing failed: {e}")))?;
        Ok(hex::encode(sig.as_ref()))
    }
}

impl std::fmt::Debug for CertificateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateSigner")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

fn fingerprint_of(public_key: &[u8]) -> String {
    hash_bytes(public_key)[..32].to_owned()
}

/// Fingerprint of a hex-encoded public key.
pub fn fingerprint_hex(public_key_hex: &str) -> Result<String> {
    let bytes = hex::decode(public_key_hex.trim())
        .map_err(|e| TrustwipeError::SignatureInvalid(format!("public key is not hex: {e}")))?;
    Ok(fingerprint_of(&bytes))
}

/// Check a hex-encoded signature over `message` against a hex-encoded
/// public key.
pub fn verify_signature(public_key_hex: &str, message: &[u8], signature_hex: &str) -> Result<()> {
    let public_key = hex::decode(public_key_hex.trim())
        .map_err(|e| TrustwipeError::SignatureInvalid(format!("public key is not hex: {e}")))?;
    let signature = hex::decode(signature_hex.trim())
        .map_err(|e| TrustwipeError::SignatureInvalid(format!("signature is not hex: {e}")))?;

    UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, &public_key)
        .verify(message, &signature)
        .map_err(|_| TrustwipeError::SignatureInvalid("signature does not match content".into()))
}

// ---------------------------------------------------------------------------
// Trust store
// ---------------------------------------------------------------------------

/// An issuer whose certificates are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedKey {
    /// Display name, e.g. "SecureWipe CA v2.1".
    pub name: String,
    pub public_key_hex: String,
    pub fingerprint: String,
}

/// Issuer public keys accepted by certificate verification, persisted as
/// JSON (`trust_store.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustStore {
    keys: Vec<TrustedKey>,
}

impl TrustStore {
    /// Load from `path`, or start empty when the file does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Trust `public_key_hex` under `name`. Re-adding a known key renames it.
    pub fn add(&mut self, name: impl Into<String>, public_key_hex: &str) -> Result<&TrustedKey> {
        let public_key_hex = public_key_hex.trim().to_ascii_lowercase();
        let fingerprint = fingerprint_hex(&public_key_hex)?;
        let name = name.into();

        let index = match self.keys.iter().position(|k| k.public_key_hex == public_key_hex) {
            Some(i) => {
                warn!(%fingerprint, %name, "key already trusted, updating name");
                self.keys[i].name = name;
                i
            }
            None => {
                info!(%fingerprint, %name, "issuer key trusted");
                self.keys.push(TrustedKey {
                    name,
                    public_key_hex,
                    fingerprint,
                });
                self.keys.len() - 1
            }
        };
        Ok(&self.keys[index])
    }

    /// Stop trusting the key with `fingerprint`. Returns whether one was removed.
    pub fn remove(&mut self, fingerprint: &str) -> bool {
        let before = self.keys.len();
        self.keys.retain(|k| k.fingerprint != fingerprint);
        before != self.keys.len()
    }

    pub fn lookup(&self, public_key_hex: &str) -> Option<&TrustedKey> {
        let needle = public_key_hex.trim().to_ascii_lowercase();
        self.keys.iter().find(|k| k.public_key_hex == needle)
    }

    pub fn keys(&self) -> &[TrustedKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
