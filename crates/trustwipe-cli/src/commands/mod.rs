// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subcommands. Each module owns its clap action enum and a `run` that calls
// into `AppServices` and prints the result.

pub mod anchor;
pub mod asset;
pub mod audit;
pub mod cert;
pub mod compliance;
pub mod deliver;
pub mod partner;

use serde::Serialize;
use trustwipe_core::error::Result;

/// Text for people, pretty JSON with `--json`.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print `value` as JSON, or render it with `text`.
    pub fn emit<T: Serialize + ?Sized>(self, value: &T, text: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}

/// `2025-09-08 14:05 UTC`
pub(crate) fn short_time(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}
