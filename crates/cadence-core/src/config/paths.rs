//! Standard paths for configuration and asset files

use std::path::PathBuf;

const APP_DIR: &str = "cadence";

/// Get the configuration directory
///
/// Returns: `<config dir>/cadence` (e.g. `~/.config/cadence` on Linux)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Get the default config file path for a given file name
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

/// Get the default asset root holding `music/` and `chart/`
///
/// Returns: `<data dir>/cadence/assets`
pub fn default_asset_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("assets")
}
