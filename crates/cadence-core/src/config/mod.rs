//! Shared configuration utilities
//!
//! - Generic YAML config loading/saving
//! - Standard config and asset paths
//!
//! # Usage
//!
//! ```ignore
//! use cadence_core::config::{load_config, save_config, default_config_path};
//!
//! let path = default_config_path("player.yaml");
//! let config: PlayerConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod io;
mod paths;

pub use io::{load_config, read_config, save_config};
pub use paths::{default_asset_root, default_config_dir, default_config_path};
