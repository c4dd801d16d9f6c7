//! Configuration system for the pipeline orchestrator
//!
//! Configuration is a single TOML file. Every section is optional; a missing
//! section falls back to the built-in agent catalog and local defaults.

use crate::pipeline::agents::{AgentCatalog, AgentName, AgentSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// Replaces the built-in agent catalog when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub review: ReviewSection,
    #[serde(default)]
    pub audit: AuditSection,
}

/// Remote agent service section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSection {
    /// Base URL of the agent service
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path template for agent runs (`{agent}` is substituted)
    #[serde(default = "default_agent_path")]
    pub agent_path: String,
    /// Path template for task validation (`{agent}` is substituted)
    #[serde(default = "default_validate_path")]
    pub validate_path: String,
    /// Request timeout in milliseconds (default: 300000 = 5 minutes)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Environment variable holding a bearer token
    pub api_token_env: Option<String>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            agent_path: default_agent_path(),
            validate_path: default_validate_path(),
            timeout_ms: default_timeout_ms(),
            api_token_env: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_agent_path() -> String {
    "/agents/{agent}".to_string()
}

fn default_validate_path() -> String {
    "/validate/{agent}".to_string()
}

fn default_timeout_ms() -> u64 {
    300_000 // agent runs are slow LLM calls
}

/// Pipeline section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineSection {
    /// Agents to run, in order. Empty means the whole catalog.
    #[serde(default)]
    pub sequence: Vec<AgentName>,
}

/// Review surface section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewSection {
    /// Directory review files are written to
    #[serde(default = "default_review_directory")]
    pub directory: PathBuf,
    /// Editor command launched on each review file (e.g. "code -n")
    pub editor: Option<String>,
}

impl Default for ReviewSection {
    fn default() -> Self {
        Self {
            directory: default_review_directory(),
            editor: None,
        }
    }
}

fn default_review_directory() -> PathBuf {
    PathBuf::from("review")
}

/// Audit section; no directory disables audit records
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuditSection {
    pub directory: Option<PathBuf>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-section consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.service.base_url).map_err(|e| {
            ConfigError::InvalidConfig(format!(
                "service.base_url '{}' is not a valid URL: {e}",
                self.service.base_url
            ))
        })?;

        if self.service.timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "service.timeout_ms must be greater than zero".to_string(),
            ));
        }

        let catalog = self.catalog()?;
        if !self.pipeline.sequence.is_empty() {
            catalog
                .validate_sequence(&self.pipeline.sequence)
                .map_err(|e| ConfigError::InvalidConfig(format!("pipeline.sequence: {e}")))?;
        }

        Ok(())
    }

    /// Agent catalog: the `[[agents]]` tables, or the built-in one
    pub fn catalog(&self) -> Result<AgentCatalog, ConfigError> {
        if self.agents.is_empty() {
            return Ok(AgentCatalog::default());
        }
        AgentCatalog::from_specs(self.agents.clone())
            .map_err(|e| ConfigError::InvalidConfig(format!("agents: {e}")))
    }

    /// Configured sequence, or the whole catalog in declaration order
    pub fn sequence(&self) -> Result<Vec<AgentName>, ConfigError> {
        if self.pipeline.sequence.is_empty() {
            Ok(self.catalog()?.default_sequence())
        } else {
            Ok(self.pipeline.sequence.clone())
        }
    }

    /// Resolve the service API token, if one is configured
    pub fn get_api_token(&self) -> Result<Option<String>, ConfigError> {
        match &self.service.api_token_env {
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
            None => Ok(None),
        }
    }
}
