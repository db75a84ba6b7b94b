//! Error types
//!
//! Parsing, classification and comparison never fail: degraded input turns
//! into `Unknown` frames and mismatches are data (`ComparisonResult`). The
//! errors below cover configuration, static analysis, source maps and the
//! harness.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Config file parsed but holds an unusable value
    #[error("Invalid config '{}': {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

/// Static analysis errors
#[derive(Debug, Error)]
pub enum ScopeError {
    /// The JavaScript source did not parse
    #[error("Failed to parse '{file}': {message}")]
    Syntax { file: String, message: String },
}

/// Source-map loading errors
#[derive(Debug, Error)]
pub enum SourceMapError {
    /// The map is not a valid source map
    #[error("Failed to decode source map for '{file}': {source}")]
    Decode {
        file: String,
        #[source]
        source: sourcemap::Error,
    },

    /// The minified source did not parse
    #[error(transparent)]
    Scopes(#[from] ScopeError),
}

/// Errors building a function registry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two functions registered under one name
    #[error("function '{0}' is registered twice")]
    Duplicate(String),

    /// A body calls a name that was never registered
    #[error("function '{caller}' calls undeclared '{callee}'")]
    UndeclaredCallee { caller: String, callee: String },

    /// The entry point of a scenario is not registered
    #[error("entry point '{0}' is not registered")]
    UnknownEntry(String),
}

/// Scenario infrastructure failures, fatal for one scenario only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HarnessFault {
    /// The deepest frame returned normally
    #[error("scenario '{0}' completed without throwing")]
    NeverThrew(String),

    /// An async scenario did not settle in time
    #[error("scenario '{scenario}' did not settle within {timeout:?}")]
    NeverSettled { scenario: String, timeout: Duration },

    /// The captured trace contained no frame lines
    #[error("scenario '{0}' captured an empty stack trace")]
    EmptyTrace(String),

    /// The scenario's topology is invalid
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result type for configuration loading
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
