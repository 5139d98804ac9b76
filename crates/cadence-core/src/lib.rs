//! Cadence Core - audio sync and rhythm engine for the Cadence player

pub mod assets;
pub mod audio;
pub mod audio_file;
pub mod chart;
pub mod config;
pub mod engine;
pub mod fixed;
pub mod rhythm;
pub mod types;

pub use types::*;
