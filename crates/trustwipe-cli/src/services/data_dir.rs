// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::{Path, PathBuf};

use trustwipe_core::error::Result;

/// Overrides every other location when set.
pub const DATA_DIR_ENV: &str = "TRUSTWIPE_DATA_DIR";

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> Result<PathBuf> {
    let dir = resolve(|key| std::env::var(key).ok());
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Return a subdirectory of `base` (e.g. "outbox", "exports"), creating it
/// if needed.
pub fn data_subdir(base: &Path, name: &str) -> Result<PathBuf> {
    let dir = base.join(name);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn resolve(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    let set = |key: &str| var(key).filter(|v| !v.is_empty());

    if let Some(dir) = set(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    let base = if let Some(xdg) = set("XDG_DATA_HOME") {
        PathBuf::from(xdg)
    } else if let Some(home) = set("HOME") {
        PathBuf::from(home).join(".local").join("share")
    } else {
        // Last resort
        PathBuf::from("/tmp")
    };
    base.join("trustwipe")
}
