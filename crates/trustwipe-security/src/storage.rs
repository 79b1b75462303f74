// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key vault — age passphrase encryption (scrypt) for secrets at rest: the
// station's signing key and recycler partner API keys.

use std::io::{Read, Write};
use std::path::Path;

use age::secrecy::SecretString;
use tracing::{debug, instrument};
use trustwipe_core::error::{Result, TrustwipeError};

/// Environment variable holding the vault passphrase.
pub const VAULT_PASSPHRASE_ENV: &str = "TRUSTWIPE_VAULT_PASSPHRASE";

/// Passphrase-based sealing of small secrets.
///
/// The passphrase lives in a `SecretString` and is zeroised when the vault
/// is dropped.
#[derive(Clone)]
pub struct KeyVault {
    passphrase: SecretString,
}

impl KeyVault {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: SecretString::from(passphrase.into()),
        }
    }

    /// Build a vault from `TRUSTWIPE_VAULT_PASSPHRASE`.
    pub fn from_env() -> Result<Self> {
        match std::env::var(VAULT_PASSPHRASE_ENV) {
            Ok(p) if !p.is_empty() => Ok(Self::new(p)),
            _ => Err(TrustwipeError::Encryption(format!(
                "{VAULT_PASSPHRASE_ENV} is not set"
            ))),
        }
    }

    /// Encrypt `plaintext` into a complete age file.
    #[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let encryptor = age::Encryptor::with_user_passphrase(self.passphrase.clone());
        let mut sealed = Vec::new();

        let mut writer = encryptor
            .wrap_output(&mut sealed)
            .map_err(|e| TrustwipeError::Encryption(e.to_string()))?;
        writer
            .write_all(plaintext)
            .map_err(|e| TrustwipeError::Encryption(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| TrustwipeError::Encryption(e.to_string()))?;

        debug!(sealed_len = sealed.len(), "secret sealed");
        Ok(sealed)
    }

    /// Decrypt an age file produced by [`seal`](Self::seal).
    #[instrument(skip_all, fields(sealed_len = sealed.len()))]
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        let decryptor =
            age::Decryptor::new(sealed).map_err(|e| TrustwipeError::Decryption(e.to_string()))?;
        let identity = age::scrypt::Identity::new(self.passphrase.clone());

        let mut reader = decryptor
            .decrypt(std::iter::once(&identity as &dyn age::Identity))
            .map_err(|e| TrustwipeError::Decryption(e.to_string()))?;

        let mut plaintext = Vec::new();
        reader
            .read_to_end(&mut plaintext)
            .map_err(|e| TrustwipeError::Decryption(e.to_string()))?;
        Ok(plaintext)
    }

    pub fn seal_to_file(&self, plaintext: &[u8], path: impl AsRef<Path>) -> Result<()> {
        let sealed = self.seal(plaintext)?;
        std::fs::write(path, sealed)?;
        Ok(())
    }

    pub fn open_file(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let sealed = std::fs::read(path)?;
        self.open(&sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_and_open() {
        let vault = KeyVault::new("correct-horse-battery-staple");
        let api_key = b"gt_live_4f9a8c2e";

        let sealed = vault.seal(api_key).unwrap();
        assert_ne!(&sealed[..], api_key);
        assert_eq!(vault.open(&sealed).unwrap(), api_key);
    }

    #[test]
    fn wrong_passphrase_fails() {
        let sealed = KeyVault::new("alpha").seal(b"secret").unwrap();
        assert!(matches!(
            KeyVault::new("beta").open(&sealed),
            Err(TrustwipeError::Decryption(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(KeyVault::new("alpha").open(b"not an age file").is_err());
    }

    #[test]
    fn file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing_key.age");
        let vault = KeyVault::new("station-7");
        vault.seal_to_file(b"pkcs8", &path).unwrap();
        assert_eq!(vault.open_file(&path).unwrap(), b"pkcs8");
    }
}
