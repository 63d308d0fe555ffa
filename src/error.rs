//! Error types for the misuse-rs library

use thiserror::Error;

/// Errors a detection run can surface.
///
/// Corrupt individual inputs never show up here; they are logged and
/// skipped so a single bad trace reduces recall instead of halting the
/// run.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading a corpus or writing an output file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// The bug report could not be written
    #[error("Reporting error: {0}")]
    Reporting(String),

    /// A summary or work-list artifact failed to (de)serialize
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
