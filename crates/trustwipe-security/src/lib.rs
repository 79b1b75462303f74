// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// trustwipe-security — Cryptographic foundation for sanitization certificates.
//
// Content hashing for tamper detection, ECDSA P-256 signing of certificate
// bodies, an age-sealed vault for the signing key and partner API keys, and
// the append-only audit trail.

pub mod audit;
pub mod integrity;
pub mod signing;
pub mod storage;

pub use audit::{AuditEntry, AuditLog};
pub use integrity::{hash_bytes, verify_hash};
pub use signing::{CertificateSigner, SIG_ALG, TrustStore, TrustedKey, verify_signature};
pub use storage::{KeyVault, VAULT_PASSPHRASE_ENV};
