//! Asset access
//!
//! Audio and chart data are read as whole byte blobs by name, e.g.
//! `music/bopeebov.mp3` or `chart/1.1N.cht`. Where the bytes come from is
//! up to the [`AssetSource`] implementation: a directory on disk for the
//! player, an in-memory map for tests and tooling.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading an asset
#[derive(Error, Debug)]
pub enum AssetError {
    /// No asset with this name
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// The asset exists but could not be read
    #[error("Failed to read asset '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Asset names are relative and may not escape the asset root
    #[error("Invalid asset name: {0}")]
    InvalidName(String),
}

/// A read-only store of named assets
pub trait AssetSource: Send + Sync {
    /// Read the whole asset into memory
    fn read(&self, name: &str) -> Result<Vec<u8>, AssetError>;
}

impl<T: AssetSource + ?Sized> AssetSource for std::sync::Arc<T> {
    fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        (**self).read(name)
    }
}

/// Assets stored as plain files under a root directory
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, AssetError> {
        let relative = Path::new(name);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir)
        });
        if name.is_empty() || escapes {
            return Err(AssetError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl AssetSource for DirectoryAssets {
    fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.resolve(name)?;
        match std::fs::read(&path) {
            Ok(bytes) => {
                log::debug!("Read asset {} ({} bytes)", name, bytes.len());
                Ok(bytes)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(AssetError::NotFound(name.to_string()))
            }
            Err(e) => Err(AssetError::Io {
                name: name.to_string(),
                source: e,
            }),
        }
    }
}

/// Assets held in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(name.into(), bytes);
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl AssetSource for MemoryAssets {
    fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(name.to_string()))
    }
}

/// A song's audio: one file, or a vocal/instrumental pair
///
/// A vocal track reads `music/<name>v.mp3` into slot 0 and
/// `music/<name>i.mp3` into slot 1. A plain track reads `music/<name>.mp3`
/// into slot 0 and leaves slot 1 empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackSpec {
    pub name: String,
    #[serde(default)]
    pub vocal: bool,
}

impl TrackSpec {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vocal: false,
        }
    }

    pub fn vocal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vocal: true,
        }
    }

    /// Asset names for each mixer slot
    pub fn asset_names(&self) -> [Option<String>; 2] {
        if self.vocal {
            [
                Some(format!("music/{}v.mp3", self.name)),
                Some(format!("music/{}i.mp3", self.name)),
            ]
        } else {
            [Some(format!("music/{}.mp3", self.name)), None]
        }
    }
}

impl Default for TrackSpec {
    fn default() -> Self {
        Self::vocal("bopeebo")
    }
}

impl std::fmt::Display for TrackSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.vocal {
            write!(f, "{} (vocal)", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}
