//! Configuration handling for procflow
//!
//! Configuration is read from `procflow.toml` next to the graph file
//! (project) and `~/.config/procflow/config.toml` (global). An explicit
//! `--config` path replaces the project file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineConfig;

/// File name searched for beside the graph snapshot
pub const PROJECT_CONFIG_FILE: &str = "procflow.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Overrides the global default when set
    pub default_format: Option<OutputFormat>,
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProjectConfig {
    /// Propagation engine settings
    pub engine: EngineConfig,

    pub output: OutputConfig,
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    /// File the project configuration was read from, if any
    pub source: Option<PathBuf>,
}

impl Config {
    /// Loads configuration for a graph file.
    ///
    /// `explicit` wins over `procflow.toml` beside the graph and must exist.
    pub fn load(explicit: Option<&Path>, graph_path: &Path) -> Result<Self> {
        let global = Self::load_global()?;

        let (project, source) = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::Invalid(format!(
                        "config file not found: {}",
                        path.display()
                    )))
                    .context("Failed to load configuration");
                }
                (Self::load_project_config(path)?, Some(path.to_path_buf()))
            }
            None => match Self::find_project_config(graph_path) {
                Some(path) => (Self::load_project_config(&path)?, Some(path)),
                None => (ProjectConfig::default(), None),
            },
        };

        let config = Self {
            project,
            global,
            source,
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "procflow", "procflow")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// `procflow.toml` in the graph file's directory, if present
    pub fn find_project_config(graph_path: &Path) -> Option<PathBuf> {
        let dir = match graph_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let candidate = dir.join(PROJECT_CONFIG_FILE);
        candidate.is_file().then_some(candidate)
    }

    /// Format used when no `--format` flag is given
    pub fn default_format(&self) -> OutputFormat {
        self.project
            .output
            .default_format
            .unwrap_or(self.global.default_format)
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.project.engine
    }

    fn validate(&self) -> Result<()> {
        if self.project.engine.max_drain_passes == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_drain_passes must be at least 1".to_string(),
            ))
            .context("Failed to load configuration");
        }
        Ok(())
    }

    /// Loads global configuration
    fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    fn load_project_config(path: &Path) -> Result<ProjectConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read project config: {}", path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .with_context(|| format!("Failed to parse project config: {}", path.display()))
    }
}
