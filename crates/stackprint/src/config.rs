//! TOML configuration and the process-wide stack-trace limit

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{ConfigError, ConfigResult};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "stackprint.toml";

/// Frames an engine captures before anything configures the limit
pub const DEFAULT_STACK_TRACE_LIMIT: usize = 10;

/// Seconds an async scenario may run before it is reported as unsettled
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Normalization, comparison and harness settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StackprintConfig {
    /// Maximum number of frames kept after normalization (absent = unlimited)
    pub max_depth: Option<usize>,

    /// Prefix removed from every frame's file to make it repo-relative
    pub path_prefix_to_strip: Option<String>,

    /// Tolerate async boundary markers present on one side only
    pub lenient_async_boundaries: bool,

    /// Capture depth installed before any scenario runs (absent = unlimited)
    pub stack_trace_limit: Option<usize>,

    /// Drop engine-internal frames (`node:internal/...`, `[native code]`)
    pub drop_internal_frames: bool,

    /// Timeout in seconds per async scenario
    pub timeout_secs: Option<u64>,
}

impl Default for StackprintConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            path_prefix_to_strip: None,
            lenient_async_boundaries: false,
            stack_trace_limit: None,
            drop_internal_frames: true,
            timeout_secs: None,
        }
    }
}

impl StackprintConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_depth == Some(0) {
            return Err("max_depth must be at least 1".to_string());
        }
        Ok(())
    }

    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] when it exists, falling
    /// back to defaults on any error.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default_path.exists() {
                    return Self::default();
                }
                default_path
            }
        };
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}", e);
                Self::default()
            }
        }
    }

    /// Builder-style setter for `lenient_async_boundaries`
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient_async_boundaries = lenient;
        self
    }

    /// Builder-style setter for `max_depth`
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Builder-style setter for `path_prefix_to_strip`
    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix_to_strip = Some(prefix.into());
        self
    }

    /// Frame cap applied by normalization. A chain always keeps at least one
    /// frame, so a zero set through the builder counts as one.
    pub fn effective_max_depth(&self) -> Option<usize> {
        self.max_depth.map(|depth| depth.max(1))
    }

    /// The capture depth this config asks the harness to install
    pub fn requested_stack_trace_limit(&self) -> StackTraceLimit {
        match self.stack_trace_limit {
            Some(frames) => StackTraceLimit::Frames(frames),
            None => StackTraceLimit::Unlimited,
        }
    }

    /// Async scenario timeout
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

/// How many frames a captured trace may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackTraceLimit {
    /// At most this many frames
    Frames(usize),
    /// No limit
    Unlimited,
}

impl StackTraceLimit {
    /// Apply the limit to a frame count
    pub fn cap(self, frames: usize) -> usize {
        match self {
            StackTraceLimit::Frames(limit) => frames.min(limit),
            StackTraceLimit::Unlimited => frames,
        }
    }
}

static STACK_TRACE_LIMIT: OnceLock<StackTraceLimit> = OnceLock::new();

/// Install the process-wide capture depth.
///
/// The limit is written once. Installing the same value again succeeds;
/// installing a different one returns the limit already in force.
pub fn install_stack_trace_limit(limit: StackTraceLimit) -> Result<(), StackTraceLimit> {
    let installed = *STACK_TRACE_LIMIT.get_or_init(|| limit);
    if installed == limit {
        tracing::debug!(?limit, "stack trace limit installed");
        Ok(())
    } else {
        Err(installed)
    }
}

/// The capture depth in force ([`DEFAULT_STACK_TRACE_LIMIT`] until installed).
pub fn stack_trace_limit() -> StackTraceLimit {
    STACK_TRACE_LIMIT
        .get()
        .copied()
        .unwrap_or(StackTraceLimit::Frames(DEFAULT_STACK_TRACE_LIMIT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = StackprintConfig::default();
        assert_eq!(config.max_depth, None);
        assert!(config.drop_internal_frames);
        assert!(!config.lenient_async_boundaries);
        assert_eq!(config.requested_stack_trace_limit(), StackTraceLimit::Unlimited);
        assert_eq!(config.timeout().as_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "max_depth = 4\n\
             path_prefix_to_strip = \"/home/ci/project/\"\n\
             lenient_async_boundaries = true"
        )
        .unwrap();

        let config = StackprintConfig::load(file.path()).unwrap();
        assert_eq!(config.max_depth, Some(4));
        assert_eq!(config.path_prefix_to_strip.as_deref(), Some("/home/ci/project/"));
        assert!(config.lenient_async_boundaries);
        // unspecified keys keep their defaults
        assert!(config.drop_internal_frames);
    }

    #[test]
    fn test_load_errors() {
        let missing = StackprintConfig::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_depth = \"deep\"").unwrap();
        let bad = StackprintConfig::load(file.path());
        assert!(matches!(bad, Err(ConfigError::Parse { .. })));

        let fallback = StackprintConfig::load_or_default(Some(file.path()));
        assert_eq!(fallback, StackprintConfig::default());
    }

    #[test]
    fn test_zero_max_depth() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_depth = 0").unwrap();
        let err = StackprintConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("max_depth must be at least 1"));

        let built = StackprintConfig::default().with_max_depth(0);
        assert_eq!(built.effective_max_depth(), Some(1));
        assert_eq!(StackprintConfig::default().effective_max_depth(), None);
    }

    #[test]
    fn test_limit_cap() {
        assert_eq!(StackTraceLimit::Frames(10).cap(12), 10);
        assert_eq!(StackTraceLimit::Frames(10).cap(3), 3);
        assert_eq!(StackTraceLimit::Unlimited.cap(12), 12);
    }
}
