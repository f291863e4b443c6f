//! Error types for the arx analysis engine

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for analysis operations
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Scratch workspace could not be created
    #[error("Cannot create workspace at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Rule error
    #[error("Rule error: {0}")]
    Rule(String),

    /// Regex error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// AUR helper invocation failed
    #[error("Helper error: {0}")]
    Helper(String),

    /// A session was requested for zero packages
    #[error("Cannot summarize an empty set of package assessments")]
    EmptySession,
}

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;
