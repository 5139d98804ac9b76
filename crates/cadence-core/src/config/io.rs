//! YAML settings files
//!
//! Player settings, stage definitions and judge tuning all go through these
//! two functions. A broken or missing file never stops the game: it falls
//! back to defaults and says so in the log.

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parse a settings file, distinguishing "absent" (`Ok(None)`) from broken
pub fn read_config<T>(path: &Path) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
    };
    let config = serde_yaml::from_str(&contents)
        .with_context(|| format!("Invalid settings in {:?}", path))?;
    Ok(Some(config))
}

/// Load settings, falling back to `T::default()` when absent or unreadable
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match read_config(path) {
        Ok(Some(config)) => {
            log::info!("Settings loaded from {:?}", path);
            config
        }
        Ok(None) => {
            log::info!("No settings at {:?}, using defaults", path);
            T::default()
        }
        Err(e) => {
            log::warn!("{:#}; using defaults", e);
            T::default()
        }
    }
}

/// Write settings as YAML, creating parent directories
///
/// The file is written beside the target and renamed into place, so a
/// crash mid-save leaves the previous settings intact.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize settings")?;
    let staging = path.with_extension("yaml.tmp");
    std::fs::write(&staging, yaml).with_context(|| format!("Failed to write {:?}", staging))?;
    std::fs::rename(&staging, path)
        .with_context(|| format!("Failed to replace {:?}", path))?;

    log::info!("Settings saved to {:?}", path);
    Ok(())
}
