//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate locations.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/aios/` | `~/.local/share/aios/` |
//! | Config | `~/Library/Application Support/aios/` | `~/.config/aios/` |
//! | Logs | `<data>/logs/` | `<data>/logs/` |
//!
//! # Environment Overrides
//!
//! - `AIOS_DATA_DIR` overrides [`data_dir`]
//! - `AIOS_CONFIG_DIR` overrides [`config_dir`]
//! - `AIOS_LOGS_DIR` overrides [`logs_dir`]

use std::path::PathBuf;

const APP_DIR_NAME: &str = "aios";

/// Application data root: persisted integrations and logs.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("AIOS_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("/tmp/aios-data"))
}

/// Directory holding `config.toml`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("AIOS_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("/tmp/aios-config"))
}

/// Rotated log files (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("AIOS_LOGS_DIR") {
        return PathBuf::from(override_dir);
    }
    data_dir().join("logs")
}
