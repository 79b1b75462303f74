// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TrustWipe — Core domain types, lifecycle rules, and error definitions
// shared across all crates.

pub mod compliance;
pub mod config;
pub mod error;
pub mod human_errors;
pub mod inventory;
pub mod lifecycle;
pub mod types;

pub use config::AppConfig;
pub use error::TrustwipeError;
pub use types::*;
