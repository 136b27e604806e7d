//! Script execution configuration using Figment.
//!
//! Configuration is loaded from (in order of precedence, highest first):
//! 1. Environment variables prefixed with `METAPOINT_`
//! 2. TOML configuration file (default: `config/meta_point.toml`)
//! 3. Built-in defaults
//!
//! # Environment Variables
//!
//! ```text
//! METAPOINT_FUNCTION_LIBRARY_PATH=/opt/meta/scripts/functions.rhai
//! METAPOINT_TIMEOUT_MS=500
//! METAPOINT_MAX_OPERATIONS=250000
//! ```
//!
//! # Example
//!
//! ```no_run
//! use meta_point::config::ScriptConfig;
//!
//! let config = ScriptConfig::load()?;
//! println!("Function library: {}", config.function_library_path.display());
//! # Ok::<(), meta_point::config::ConfigError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/meta_point.toml";

/// Default location of the shared function library.
pub const DEFAULT_FUNCTION_LIBRARY_PATH: &str = "scripts/functions.rhai";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Limits and paths for script evaluation.
///
/// Every execution builds its own engine from these values, so changing the
/// configuration affects only executors created afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Path of the helper library appended to every script.
    pub function_library_path: PathBuf,
    /// Wall-clock budget for one evaluation, in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of engine operations per evaluation.
    pub max_operations: u64,
    /// Maximum function call depth.
    pub max_call_levels: usize,
    /// Maximum expression nesting depth.
    pub max_expr_depth: usize,
    /// Maximum size of any string value.
    pub max_string_size: usize,
    /// Maximum size of any array.
    pub max_array_size: usize,
    /// Maximum size of any object map.
    pub max_map_size: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            function_library_path: PathBuf::from(DEFAULT_FUNCTION_LIBRARY_PATH),
            timeout_ms: 5_000,
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_string_size: 1_000_000,
            max_array_size: 100_000,
            max_map_size: 100_000,
        }
    }
}

impl ScriptConfig {
    /// Load configuration from `config/meta_point.toml` and environment variables.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error: defaults and environment overrides
    /// still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("METAPOINT_"))
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.function_library_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "function_library_path must not be empty".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_operations == 0 {
            return Err(ConfigError::ValidationError(
                "max_operations must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The evaluation timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn test_missing_file_yields_defaults() {
        let config = ScriptConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config, ScriptConfig::default());
    }

    #[test]
    #[serial]
    fn test_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
function_library_path = "/opt/meta/functions.rhai"
timeout_ms = 250
"#
        )
        .unwrap();

        let config = ScriptConfig::load_from(file.path()).unwrap();
        assert_eq!(
            config.function_library_path,
            PathBuf::from("/opt/meta/functions.rhai")
        );
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.max_operations, 1_000_000);
    }

    #[test]
    #[serial]
    fn test_validation_rejects_zero_timeout() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timeout_ms = 0").unwrap();

        let result = ScriptConfig::load_from(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
