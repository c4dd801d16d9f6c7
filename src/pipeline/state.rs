//! Run aggregate and status machine

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::agents::AgentName;
use crate::pipeline::store::{OutputStore, TaskOutput};
use crate::review::surface::ReviewTicket;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Seed data for a run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInputs {
    pub title: String,
    pub requirements: String,
    pub context: String,
    pub sequence: Vec<AgentName>,
}

impl PipelineInputs {
    pub fn new(
        title: impl Into<String>,
        requirements: impl Into<String>,
        context: impl Into<String>,
        sequence: Vec<AgentName>,
    ) -> Self {
        Self {
            title: title.into(),
            requirements: requirements.into(),
            context: context.into(),
            sequence,
        }
    }

    pub(crate) fn validate(&self) -> PipelineResult<()> {
        if self.title.trim().is_empty() {
            return Err(PipelineError::invalid_input("title must not be empty"));
        }
        Ok(())
    }
}

/// Controller status; positions are 0-based indices into the run sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineStatus {
    Idle,
    Dispatching { index: usize },
    AwaitingReview { index: usize },
    Completed,
    Failed { index: usize, reason: String },
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Completed | PipelineStatus::Failed { .. })
    }

    /// Position the status refers to, if any
    pub fn index(&self) -> Option<usize> {
        match self {
            PipelineStatus::Dispatching { index }
            | PipelineStatus::AwaitingReview { index }
            | PipelineStatus::Failed { index, .. } => Some(*index),
            PipelineStatus::Idle | PipelineStatus::Completed => None,
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Idle => write!(f, "Idle"),
            PipelineStatus::Dispatching { index } => write!(f, "Dispatching({index})"),
            PipelineStatus::AwaitingReview { index } => write!(f, "AwaitingReview({index})"),
            PipelineStatus::Completed => write!(f, "Completed"),
            PipelineStatus::Failed { index, reason } => write!(f, "Failed({index}, {reason})"),
        }
    }
}

/// Work-in-progress output of the agent under review.
///
/// `acknowledged` records, per task, the exact value the validator accepted.
/// A task counts as validated only while its current value equals that
/// acknowledged value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReviewDraft {
    pub output: TaskOutput,
    pub acknowledged: HashMap<String, Value>,
    /// Set once the human confirmed a full submission; corrections alone
    /// never release the checkpoint.
    pub submitted: bool,
}

impl ReviewDraft {
    pub fn new(output: TaskOutput) -> Self {
        Self {
            output,
            acknowledged: HashMap::new(),
            submitted: false,
        }
    }

    pub fn is_acknowledged(&self, task: &str) -> bool {
        match (self.output.get(task), self.acknowledged.get(task)) {
            (Some(current), Some(accepted)) => current == accepted,
            _ => false,
        }
    }

    /// Tasks that still need an acknowledgment for their current value
    pub fn pending_tasks(&self) -> Vec<String> {
        self.output
            .keys()
            .filter(|task| !self.is_acknowledged(task))
            .cloned()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.output.keys().all(|task| self.is_acknowledged(task))
    }

    /// Replace the whole draft, keeping acknowledgments that still match
    pub fn replace(&mut self, output: TaskOutput) {
        self.acknowledged
            .retain(|task, accepted| output.get(task) == Some(accepted));
        self.output = output;
    }
}

/// The single active run
#[derive(Debug, Clone)]
pub(crate) struct PipelineRun {
    pub id: Uuid,
    pub inputs: PipelineInputs,
    pub store: OutputStore,
    pub status: PipelineStatus,
    pub draft: Option<ReviewDraft>,
    pub ticket: Option<ReviewTicket>,
    /// A batch of validator calls for this run has not reported back yet
    pub validating: bool,
}

impl PipelineRun {
    pub fn new(inputs: PipelineInputs) -> Self {
        Self {
            id: Uuid::new_v4(),
            inputs,
            store: OutputStore::new(),
            status: PipelineStatus::Dispatching { index: 0 },
            draft: None,
            ticket: None,
            validating: false,
        }
    }

    pub fn agent_at(&self, index: usize) -> Option<&AgentName> {
        self.inputs.sequence.get(index)
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            run_id: Some(self.id),
            title: Some(self.inputs.title.clone()),
            sequence: self.inputs.sequence.clone(),
            status: self.status.clone(),
            current_agent: self.status.index().and_then(|i| self.agent_at(i).cloned()),
            pending_tasks: self
                .draft
                .as_ref()
                .map(ReviewDraft::pending_tasks)
                .unwrap_or_default(),
            review_location: self.ticket.as_ref().map(|t| t.location.clone()),
            outputs: self.store.clone(),
        }
    }
}

/// Read-only view of the controller state handed to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    pub run_id: Option<Uuid>,
    pub title: Option<String>,
    pub sequence: Vec<AgentName>,
    pub status: PipelineStatus,
    pub current_agent: Option<AgentName>,
    /// Tasks of the agent under review still lacking an acknowledgment
    pub pending_tasks: Vec<String>,
    /// Where the output under review can be edited
    pub review_location: Option<String>,
    pub outputs: OutputStore,
}

impl PipelineSnapshot {
    pub fn idle() -> Self {
        Self {
            run_id: None,
            title: None,
            sequence: Vec::new(),
            status: PipelineStatus::Idle,
            current_agent: None,
            pending_tasks: Vec::new(),
            review_location: None,
            outputs: OutputStore::new(),
        }
    }
}
