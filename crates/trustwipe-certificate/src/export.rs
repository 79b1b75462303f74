// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JSON export — `<id>.json` plus the detached `<id>.json.sig`.

use std::path::{Path, PathBuf};

use tracing::info;
use trustwipe_core::error::{Result, TrustwipeError};
use trustwipe_core::types::CertificateId;

use crate::schema::{DetachedSignature, SanitizationCertificate, SignedCertificate};

pub fn signature_file_name(id: &CertificateId) -> String {
    format!("{id}.json.sig")
}

/// Pretty-printed certificate JSON, as handed to auditors.
pub fn to_json_pretty(certificate: &SanitizationCertificate) -> Result<String> {
    Ok(serde_json::to_string_pretty(certificate)?)
}

/// Write the certificate and its signature into `dir`. Returns both paths.
pub fn write_bundle(signed: &SignedCertificate, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let cert_path = dir.join(format!("{}.json", signed.id()));
    let sig_path = dir.join(signature_file_name(signed.id()));
    std::fs::write(&cert_path, to_json_pretty(&signed.certificate)?)?;
    std::fs::write(&sig_path, serde_json::to_string_pretty(&signed.signature)?)?;

    info!(certificate = %signed.id(), path = %cert_path.display(), "certificate exported");
    Ok((cert_path, sig_path))
}

/// Read a certificate and the `.sig` file next to it.
pub fn read_bundle(cert_path: impl AsRef<Path>) -> Result<SignedCertificate> {
    let cert_path = cert_path.as_ref();
    let mut sig_path = cert_path.as_os_str().to_owned();
    sig_path.push(".sig");
    let sig_path = PathBuf::from(sig_path);
    if !sig_path.exists() {
        return Err(TrustwipeError::NotFound {
            kind: "signature file",
            id: sig_path.display().to_string(),
        });
    }

    let certificate: SanitizationCertificate =
        serde_json::from_slice(&std::fs::read(cert_path)?)?;
    let signature: DetachedSignature = serde_json::from_slice(&std::fs::read(&sig_path)?)?;
    Ok(SignedCertificate {
        certificate,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::issue_certificate;
    use crate::issue::tests::{sample_run, wiped_asset};
    use trustwipe_core::types::SanitizationMethod;
    use trustwipe_security::CertificateSigner;

    #[test]
    fn bundle_survives_disk() {
        let signer = CertificateSigner::generate().unwrap();
        let (asset, drive_id) = wiped_asset(SanitizationMethod::CryptoErase);
        let signed = issue_certificate(&asset, drive_id, &sample_run(), &signer, None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (cert_path, sig_path) = write_bundle(&signed, dir.path()).unwrap();
        assert!(sig_path.to_string_lossy().ends_with(".json.sig"));

        let loaded = read_bundle(&cert_path).unwrap();
        assert_eq!(loaded, signed);
        // Pretty-printing does not disturb the signed bytes.
        loaded.verify_signature().unwrap();
    }

    #[test]
    fn missing_signature_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swc-2025-09-08-ABC123.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(
            read_bundle(&path),
            Err(TrustwipeError::NotFound { .. })
        ));
    }
}
