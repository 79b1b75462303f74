// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer — bridges the CLI subcommands to the trustwipe backend crates.
//
// Subcommands only parse arguments and print; every read or write of the
// ledger, the vault, or the audit trail goes through `AppServices`.

pub mod app_services;
pub mod data_dir;
