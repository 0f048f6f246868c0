//! Default filesystem locations for the store, logs, and config.

use std::env;
use std::path::PathBuf;

/// Data directory: `$HOME/.adc`, falling back to `.adc` in the current
/// directory when `HOME` is unset (e.g. minimal containers).
#[must_use]
pub fn default_data_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(|| PathBuf::from(".adc"), |home| PathBuf::from(home).join(".adc"))
}

/// Default config file location inside the data directory.
#[must_use]
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("adc.toml")
}
