//! Per-task validation over HTTP
//!
//! A successful call is an acknowledgment; nothing in the response body is
//! read back into the output.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::agents::AgentName;
use crate::service::ServiceConfig;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Submits one finalized task value for acceptance
#[async_trait]
pub trait ValidationService: Send + Sync {
    async fn validate(&self, agent: &AgentName, task: &str, value: &Value) -> PipelineResult<()>;
}

#[derive(Debug, Serialize)]
struct ValidationRequest<'a> {
    task_name: &'a str,
    value: &'a Value,
}

/// [`ValidationService`] backed by the remote agent service
pub struct HttpValidationService {
    config: ServiceConfig,
    client: reqwest::Client,
}

impl HttpValidationService {
    pub fn new(config: ServiceConfig) -> PipelineResult<Self> {
        let client = config.build_client()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ValidationService for HttpValidationService {
    async fn validate(&self, agent: &AgentName, task: &str, value: &Value) -> PipelineResult<()> {
        let url = self.config.validate_url(agent);
        debug!(agent = %agent, task, url = %url, "Submitting task for validation");

        let mut request = self
            .client
            .post(&url)
            .json(&ValidationRequest {
                task_name: task,
                value,
            });
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            PipelineError::validation(agent, task, format!("transport error: {e}"))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        warn!(agent = %agent, task, status = %status, "Task rejected by validator");
        let message = match response.text().await {
            Ok(body) if body.trim().is_empty() => format!("validator responded with {status}"),
            Ok(body) => format!("validator responded with {status}: {}", body.trim()),
            Err(e) => format!("validator responded with {status} (body unreadable: {e})"),
        };
        Err(PipelineError::validation(agent, task, message))
    }
}
