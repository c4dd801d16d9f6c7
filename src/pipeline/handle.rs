//! Client side of the controller's command channel

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::agents::AgentName;
use crate::pipeline::events::{BroadcastObserver, PipelineEvent};
use crate::pipeline::state::{PipelineInputs, PipelineSnapshot};
use crate::review::gate::ReviewSubmission;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

/// One task the validator refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task: String,
    pub message: String,
}

/// Result of a review submission or a task correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReviewOutcome {
    /// The agent was finalized and the next one dispatched
    Advanced {
        finalized: AgentName,
        next: AgentName,
    },
    /// The last agent was finalized
    Completed,
    /// Still at the checkpoint. `failed` lists rejections from this call,
    /// `pending_tasks` everything still lacking an acknowledgment.
    Pending {
        failed: Vec<TaskFailure>,
        pending_tasks: Vec<String>,
        submitted: bool,
    },
    /// A task of an already finalized agent was re-acknowledged.
    /// `changed` is false when the value was identical and nothing was sent.
    Corrected {
        agent: AgentName,
        task: String,
        changed: bool,
    },
}

/// Messages the controller task understands
#[derive(Debug)]
pub enum PipelineCommand {
    Start {
        inputs: PipelineInputs,
        reply: oneshot::Sender<PipelineResult<Uuid>>,
    },
    SubmitReview {
        agent: AgentName,
        submission: ReviewSubmission,
        reply: oneshot::Sender<PipelineResult<ReviewOutcome>>,
    },
    CorrectTask {
        agent: AgentName,
        task: String,
        value: Value,
        reply: oneshot::Sender<PipelineResult<ReviewOutcome>>,
    },
    Retry {
        reply: oneshot::Sender<PipelineResult<()>>,
    },
    Abandon {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<PipelineSnapshot>,
    },
}

/// Cloneable handle for driving a running controller
#[derive(Clone)]
pub struct PipelineHandle {
    commands: mpsc::Sender<PipelineCommand>,
    events: BroadcastObserver,
}

impl PipelineHandle {
    pub(crate) fn new(commands: mpsc::Sender<PipelineCommand>, events: BroadcastObserver) -> Self {
        Self { commands, events }
    }

    /// Subscribe to progress events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Start a fresh run, discarding any previous one
    pub async fn start(&self, inputs: PipelineInputs) -> PipelineResult<Uuid> {
        self.request(|reply| PipelineCommand::Start { inputs, reply })
            .await?
    }

    /// Hand back the reviewed output of the agent at the checkpoint
    pub async fn submit_review(
        &self,
        agent: AgentName,
        submission: ReviewSubmission,
    ) -> PipelineResult<ReviewOutcome> {
        self.request(|reply| PipelineCommand::SubmitReview {
            agent,
            submission,
            reply,
        })
        .await?
    }

    /// Correct and re-validate a single task
    pub async fn correct_task(
        &self,
        agent: AgentName,
        task: impl Into<String>,
        value: Value,
    ) -> PipelineResult<ReviewOutcome> {
        let task = task.into();
        self.request(|reply| PipelineCommand::CorrectTask {
            agent,
            task,
            value,
            reply,
        })
        .await?
    }

    /// Re-dispatch the agent a failed run stopped at
    pub async fn retry(&self) -> PipelineResult<()> {
        self.request(|reply| PipelineCommand::Retry { reply }).await?
    }

    /// Drop the active run, whatever its state
    pub async fn abandon(&self) -> PipelineResult<()> {
        self.request(|reply| PipelineCommand::Abandon { reply })
            .await
    }

    pub async fn snapshot(&self) -> PipelineResult<PipelineSnapshot> {
        self.request(|reply| PipelineCommand::Snapshot { reply })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> PipelineCommand,
    ) -> PipelineResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| PipelineError::ControllerClosed)?;
        response.await.map_err(|_| PipelineError::ControllerClosed)
    }
}
