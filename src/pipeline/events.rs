//! Progress events emitted by the controller
//!
//! Events are notifications only. Observers receive them fire-and-forget and
//! have no channel back into the controller.

use crate::pipeline::agents::AgentName;
use crate::pipeline::store::TaskOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What happened, with the data the presentation layer needs to show it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEventPayload {
    RunStarted {
        title: String,
        sequence: Vec<AgentName>,
    },
    DispatchStarted {
        index: usize,
        agent: AgentName,
    },
    AwaitingReview {
        index: usize,
        agent: AgentName,
        output: TaskOutput,
    },
    ReviewRejected {
        index: usize,
        agent: AgentName,
        message: String,
    },
    TaskValidated {
        agent: AgentName,
        task: String,
    },
    TaskValidationFailed {
        agent: AgentName,
        task: String,
        message: String,
    },
    AgentValidated {
        index: usize,
        agent: AgentName,
    },
    RunCompleted {
        agents: usize,
    },
    RunFailed {
        index: usize,
        agent: AgentName,
        reason: String,
    },
    RunAbandoned,
}

/// Discriminant of [`PipelineEventPayload`], handy for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineEventKind {
    RunStarted,
    DispatchStarted,
    AwaitingReview,
    ReviewRejected,
    TaskValidated,
    TaskValidationFailed,
    AgentValidated,
    RunCompleted,
    RunFailed,
    RunAbandoned,
}

/// A timestamped event tied to one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: PipelineEventPayload,
}

impl PipelineEvent {
    pub fn new(run_id: Uuid, payload: PipelineEventPayload) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> PipelineEventKind {
        match &self.payload {
            PipelineEventPayload::RunStarted { .. } => PipelineEventKind::RunStarted,
            PipelineEventPayload::DispatchStarted { .. } => PipelineEventKind::DispatchStarted,
            PipelineEventPayload::AwaitingReview { .. } => PipelineEventKind::AwaitingReview,
            PipelineEventPayload::ReviewRejected { .. } => PipelineEventKind::ReviewRejected,
            PipelineEventPayload::TaskValidated { .. } => PipelineEventKind::TaskValidated,
            PipelineEventPayload::TaskValidationFailed { .. } => {
                PipelineEventKind::TaskValidationFailed
            }
            PipelineEventPayload::AgentValidated { .. } => PipelineEventKind::AgentValidated,
            PipelineEventPayload::RunCompleted { .. } => PipelineEventKind::RunCompleted,
            PipelineEventPayload::RunFailed { .. } => PipelineEventKind::RunFailed,
            PipelineEventPayload::RunAbandoned => PipelineEventKind::RunAbandoned,
        }
    }

    /// Agent the event refers to, if any
    pub fn agent(&self) -> Option<&AgentName> {
        match &self.payload {
            PipelineEventPayload::DispatchStarted { agent, .. }
            | PipelineEventPayload::AwaitingReview { agent, .. }
            | PipelineEventPayload::ReviewRejected { agent, .. }
            | PipelineEventPayload::TaskValidated { agent, .. }
            | PipelineEventPayload::TaskValidationFailed { agent, .. }
            | PipelineEventPayload::AgentValidated { agent, .. }
            | PipelineEventPayload::RunFailed { agent, .. } => Some(agent),
            PipelineEventPayload::RunStarted { .. }
            | PipelineEventPayload::RunCompleted { .. }
            | PipelineEventPayload::RunAbandoned => None,
        }
    }

    /// One-line description for terminals and logs
    pub fn summary(&self) -> String {
        match &self.payload {
            PipelineEventPayload::RunStarted { title, sequence } => {
                let names: Vec<&str> = sequence.iter().map(AgentName::as_str).collect();
                format!("Run '{title}' started: {}", names.join(" -> "))
            }
            PipelineEventPayload::DispatchStarted { index, agent } => {
                format!("[{index}] Dispatching {agent}")
            }
            PipelineEventPayload::AwaitingReview {
                index,
                agent,
                output,
            } => format!(
                "[{index}] {agent} produced {} task(s), awaiting review",
                output.len()
            ),
            PipelineEventPayload::ReviewRejected {
                index,
                agent,
                message,
            } => format!("[{index}] Review of {agent} rejected: {message}"),
            PipelineEventPayload::TaskValidated { agent, task } => {
                format!("{agent}.{task} validated")
            }
            PipelineEventPayload::TaskValidationFailed {
                agent,
                task,
                message,
            } => format!("{agent}.{task} failed validation: {message}"),
            PipelineEventPayload::AgentValidated { index, agent } => {
                format!("[{index}] {agent} fully validated")
            }
            PipelineEventPayload::RunCompleted { agents } => {
                format!("Run completed ({agents} agents)")
            }
            PipelineEventPayload::RunFailed {
                index,
                agent,
                reason,
            } => format!("[{index}] Run failed at {agent}: {reason}"),
            PipelineEventPayload::RunAbandoned => "Run abandoned".to_string(),
        }
    }
}

/// Receives progress events from the controller
pub trait PipelineObserver: Send + Sync {
    fn notify(&self, event: &PipelineEvent);
}

/// Fans events out to tokio broadcast subscribers
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    sender: broadcast::Sender<PipelineEvent>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl PipelineObserver for BroadcastObserver {
    fn notify(&self, event: &PipelineEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.sender.send(event.clone());
    }
}

/// Writes every event to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl PipelineObserver for LoggingObserver {
    fn notify(&self, event: &PipelineEvent) {
        let agent = event.agent().map(AgentName::as_str).unwrap_or("-");
        match event.kind() {
            PipelineEventKind::RunFailed => {
                error!(run_id = %event.run_id, agent, "{}", event.summary())
            }
            PipelineEventKind::ReviewRejected | PipelineEventKind::TaskValidationFailed => {
                warn!(run_id = %event.run_id, agent, "{}", event.summary())
            }
            _ => info!(run_id = %event.run_id, agent, "{}", event.summary()),
        }
    }
}

/// Ordered set of observers notified one after another
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn push(&mut self, observer: Arc<dyn PipelineObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn emit(&self, run_id: Uuid, payload: PipelineEventPayload) {
        let event = PipelineEvent::new(run_id, payload);
        for observer in &self.observers {
            observer.notify(&event);
        }
    }
}
