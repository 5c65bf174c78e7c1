//! Error types for the compensation pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while setting up or configuring the pipeline.
#[derive(Error, Debug)]
pub enum WackError {
    /// A built-in pattern failed to compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] fancy_regex::Error),

    /// Settings file could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML or has unknown keys.
    #[error("malformed settings: {0}")]
    SettingsFormat(#[from] toml::de::Error),

    /// A setting has a value the compensation cannot use.
    #[error("invalid setting {name}: {value}")]
    InvalidSetting { name: &'static str, value: f64 },
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, WackError>;
