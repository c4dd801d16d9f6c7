//! Remote agent service collaborators
//!
//! The orchestrator talks to a single HTTP service for two things: running an
//! agent on an assembled payload, and acknowledging individual task values.
//! Both sit behind traits so the controller can be driven by mocks in tests.

pub mod invoker;
pub mod validation;

pub use invoker::{AgentInvoker, HttpAgentInvoker};
pub use validation::{HttpValidationService, ValidationService};

use crate::config::ServiceSection;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::agents::AgentName;
use std::time::Duration;
use url::Url;

/// Connection settings shared by the HTTP invoker and validator
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the agent service (e.g. "http://localhost:8000")
    pub base_url: Url,
    /// Path template for agent runs; `{agent}` is replaced by the agent name
    pub agent_path: String,
    /// Path template for task validation; `{agent}` is replaced likewise
    pub validate_path: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Bearer token sent with every request, if set
    pub api_token: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost:8000").expect("default URL is valid"),
            agent_path: "/agents/{agent}".to_string(),
            validate_path: "/validate/{agent}".to_string(),
            timeout: Duration::from_secs(300),
            api_token: None,
        }
    }
}

impl ServiceConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            ..Default::default()
        }
    }

    /// Build from the `[service]` config section. The API token is resolved
    /// separately through [`crate::config::PipelineConfig::get_api_token`].
    pub fn from_section(section: &ServiceSection) -> Result<Self, crate::config::ConfigError> {
        let base_url = Url::parse(&section.base_url).map_err(|e| {
            crate::config::ConfigError::InvalidConfig(format!(
                "service.base_url '{}' is not a valid URL: {e}",
                section.base_url
            ))
        })?;

        Ok(Self {
            base_url,
            agent_path: section.agent_path.clone(),
            validate_path: section.validate_path.clone(),
            timeout: Duration::from_millis(section.timeout_ms),
            api_token: None,
        })
    }

    pub fn with_agent_path(mut self, path: impl Into<String>) -> Self {
        self.agent_path = path.into();
        self
    }

    pub fn with_validate_path(mut self, path: impl Into<String>) -> Self {
        self.validate_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn agent_url(&self, agent: &AgentName) -> String {
        self.join(&self.agent_path, agent)
    }

    pub fn validate_url(&self, agent: &AgentName) -> String {
        self.join(&self.validate_path, agent)
    }

    fn join(&self, template: &str, agent: &AgentName) -> String {
        let path = template.replace("{agent}", agent.as_str());
        let base = self.base_url.as_str().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    pub(crate) fn build_client(&self) -> PipelineResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| PipelineError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })
    }
}
