// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// trustwipe-certificate — The sanitization certificate: its schema, how it is
// issued and amended, how an uploaded copy is verified, and JSON/PDF export.

pub mod export;
pub mod issue;
pub mod pdf;
pub mod schema;
pub mod verify;

pub use export::{read_bundle, signature_file_name, to_json_pretty, write_bundle};
pub use issue::{WipeRun, amend_certificate, issue_certificate};
pub use pdf::CertificatePdf;
pub use schema::{DetachedSignature, SCHEMA_URL, SanitizationCertificate, SignedCertificate};
pub use verify::{ReportStatus, VerificationReport, verify_certificate, verify_upload};
