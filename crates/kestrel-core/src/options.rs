//! Runtime configuration (kestrel.toml)
//!
//! ```toml
//! [runtime]
//! root_class = "object"
//! max_emit_depth = 64
//! miss_signals = true
//! error_signals = true
//! ```
//!
//! Every key is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Options for a [`Runtime`](crate::Runtime)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuntimeOptions {
    /// Name of the implicit root class (default: "object")
    #[serde(default = "default_root_class")]
    pub root_class: String,

    /// Maximum nesting of signal emissions (default: 64)
    #[serde(default = "default_max_emit_depth")]
    pub max_emit_depth: usize,

    /// Emit `debug::index::miss` / `debug::newindex::miss` when a lookup
    /// resolves nothing and the class has no miss handler
    #[serde(default = "default_true")]
    pub miss_signals: bool,

    /// Emit `debug::error` when a signal handler fails
    #[serde(default = "default_true")]
    pub error_signals: bool,
}

fn default_root_class() -> String {
    "object".to_string()
}

fn default_max_emit_depth() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            root_class: default_root_class(),
            max_emit_depth: default_max_emit_depth(),
            miss_signals: true,
            error_signals: true,
        }
    }
}

/// On-disk layout: options live under `[runtime]`
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    runtime: RuntimeOptions,
}

impl RuntimeOptions {
    /// Parse options from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse options from a string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        file.runtime.validate()?;
        Ok(file.runtime)
    }

    /// Validate the options
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_class.is_empty() {
            return Err(ConfigError::ValidationError(
                "root_class cannot be empty".to_string(),
            ));
        }

        if self.root_class.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "Invalid root_class: {}. Class names cannot contain '/'",
                self.root_class
            )));
        }

        if self.max_emit_depth == 0 {
            return Err(ConfigError::ValidationError(
                "max_emit_depth must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as a configuration file
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let file = ConfigFile {
            runtime: self.clone(),
        };
        Ok(toml::to_string_pretty(&file)?)
    }

    /// Write as a configuration file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}
