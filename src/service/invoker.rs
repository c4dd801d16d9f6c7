//! Agent invocation over HTTP
//!
//! One request per dispatch, one response per agent. Retries are not done
//! here: a failed invocation surfaces to the controller, which halts the run
//! until a human asks for another attempt.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::agents::AgentName;
use crate::pipeline::resolver::InputPayload;
use crate::pipeline::store::TaskOutput;
use crate::service::ServiceConfig;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Runs one agent on its assembled input
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, agent: &AgentName, payload: &InputPayload) -> PipelineResult<TaskOutput>;
}

/// [`AgentInvoker`] backed by the remote agent service
pub struct HttpAgentInvoker {
    config: ServiceConfig,
    client: reqwest::Client,
}

impl HttpAgentInvoker {
    pub fn new(config: ServiceConfig) -> PipelineResult<Self> {
        let client = config.build_client()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl AgentInvoker for HttpAgentInvoker {
    async fn invoke(&self, agent: &AgentName, payload: &InputPayload) -> PipelineResult<TaskOutput> {
        let url = self.config.agent_url(agent);
        debug!(
            agent = %agent,
            url = %url,
            dependencies = payload.dependencies.len(),
            "Invoking agent service"
        );

        let mut request = self.client.post(&url).json(payload);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::invocation(
                    agent,
                    format!("request timed out after {:?}", self.config.timeout),
                )
            } else {
                PipelineError::invocation(agent, format!("transport error: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::invocation(agent, format!("failed to read body: {e}")))?;

        if !status.is_success() {
            warn!(agent = %agent, status = %status, "Agent service returned an error status");
            return Err(PipelineError::invocation(
                agent,
                format!("service responded with {status}: {}", body.trim()),
            ));
        }

        let output: TaskOutput = serde_json::from_str(&body).map_err(|e| {
            PipelineError::invocation(
                agent,
                format!("response is not a JSON object of tasks: {e}"),
            )
        })?;

        info!(agent = %agent, tasks = output.len(), "Agent produced output");
        Ok(output)
    }
}
