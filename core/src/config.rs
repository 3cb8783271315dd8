//! Configuration types for ane-rs.

use serde::Deserialize;
use std::path::PathBuf;

use crate::inference::DEFAULT_SEARCH_DIR;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Model configuration.
    #[serde(default)]
    pub model: ModelConfig,

    /// Output configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Model configuration.
#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    /// Path to the compiled model library.
    #[serde(default)]
    pub library: Option<PathBuf>,

    /// Directory bare library names are resolved against.
    #[serde(default = "default_search_dir")]
    pub search_dir: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            library: None,
            search_dir: default_search_dir(),
        }
    }
}

/// Output formats for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Compact single-line JSON.
    #[default]
    Json,
    /// Indented JSON.
    Pretty,
}

/// Output configuration.
#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_search_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SEARCH_DIR)
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(crate::error::AneError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> crate::error::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        if config.model.search_dir.as_os_str().is_empty() {
            return Err(crate::error::AneError::config("model.search_dir is empty"));
        }
        Ok(config)
    }
}
