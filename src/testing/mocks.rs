//! Mock implementations for testing
//!
//! Provides mock AgentInvoker, ValidationService, ReviewSurface and an event
//! recorder so the controller can be exercised without an agent service or a
//! human at the keyboard.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::agents::AgentName;
use crate::pipeline::events::{PipelineEvent, PipelineEventKind, PipelineObserver};
use crate::pipeline::resolver::InputPayload;
use crate::pipeline::store::TaskOutput;
use crate::review::gate::ReviewGate;
use crate::review::surface::{amend_text, ReviewSurface, ReviewTicket};
use crate::service::{AgentInvoker, ValidationService};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build a [`TaskOutput`] from `(task, value)` pairs
pub fn task_output<I, S>(pairs: I) -> TaskOutput
where
    I: IntoIterator<Item = (S, Value)>,
    S: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Mock agent invoker with scripted responses per agent
#[derive(Debug, Default)]
pub struct MockAgentInvoker {
    responses: Mutex<HashMap<AgentName, VecDeque<PipelineResult<TaskOutput>>>>,
    payloads: Mutex<Vec<InputPayload>>,
    delay: Option<Duration>,
}

impl MockAgentInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every invocation, to keep dispatches in flight
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful output for the agent's next invocation
    pub fn respond(&self, agent: &AgentName, output: TaskOutput) -> &Self {
        lock(&self.responses)
            .entry(agent.clone())
            .or_default()
            .push_back(Ok(output));
        self
    }

    /// Queue a failure for the agent's next invocation
    pub fn fail(&self, agent: &AgentName, cause: &str) -> &Self {
        lock(&self.responses)
            .entry(agent.clone())
            .or_default()
            .push_back(Err(PipelineError::invocation(agent, cause)));
        self
    }

    /// Every payload received so far, in order
    pub fn payloads(&self) -> Vec<InputPayload> {
        lock(&self.payloads).clone()
    }

    pub fn invocations_for(&self, agent: &AgentName) -> usize {
        lock(&self.payloads)
            .iter()
            .filter(|p| &p.agent == agent)
            .count()
    }
}

#[async_trait]
impl AgentInvoker for MockAgentInvoker {
    async fn invoke(&self, agent: &AgentName, payload: &InputPayload) -> PipelineResult<TaskOutput> {
        lock(&self.payloads).push(payload.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = lock(&self.responses)
            .get_mut(agent)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Err(PipelineError::invocation(agent, "no scripted response")))
    }
}

/// Mock validator that acknowledges everything except configured rejections
#[derive(Debug, Default)]
pub struct MockValidationService {
    rejected_tasks: Mutex<HashMap<(AgentName, String), String>>,
    rejected_values: Mutex<Vec<(AgentName, String, Value, String)>>,
    calls: Mutex<Vec<(AgentName, String, Value)>>,
    delay: Option<Duration>,
}

impl MockValidationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every validation, to keep validator calls in flight
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject every value of this task until [`Self::accept_task`]
    pub fn reject_task(&self, agent: &AgentName, task: &str, message: &str) {
        lock(&self.rejected_tasks).insert((agent.clone(), task.to_string()), message.to_string());
    }

    pub fn accept_task(&self, agent: &AgentName, task: &str) {
        lock(&self.rejected_tasks).remove(&(agent.clone(), task.to_string()));
    }

    /// Reject this exact value of the task; other values pass
    pub fn reject_value(&self, agent: &AgentName, task: &str, value: Value, message: &str) {
        lock(&self.rejected_values).push((
            agent.clone(),
            task.to_string(),
            value,
            message.to_string(),
        ));
    }

    pub fn calls(&self) -> Vec<(AgentName, String, Value)> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, agent: &AgentName, task: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|(a, t, _)| a == agent && t == task)
            .count()
    }
}

#[async_trait]
impl ValidationService for MockValidationService {
    async fn validate(&self, agent: &AgentName, task: &str, value: &Value) -> PipelineResult<()> {
        lock(&self.calls).push((agent.clone(), task.to_string(), value.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = lock(&self.rejected_tasks).get(&(agent.clone(), task.to_string())) {
            return Err(PipelineError::validation(agent, task, message.clone()));
        }
        let rejected = lock(&self.rejected_values)
            .iter()
            .find(|(a, t, v, _)| a == agent && t == task && v == value)
            .map(|(_, _, _, message)| message.clone());
        match rejected {
            Some(message) => Err(PipelineError::validation(agent, task, message)),
            None => Ok(()),
        }
    }
}

/// In-memory review surface
///
/// `collect` returns text set with [`MockReviewSurface::set_content`] or
/// written by `amend`, otherwise the presented output unchanged.
#[derive(Debug, Default)]
pub struct MockReviewSurface {
    presented: Mutex<Vec<(AgentName, TaskOutput)>>,
    content: Mutex<HashMap<AgentName, String>>,
    fail_present: Mutex<bool>,
}

impl MockReviewSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the human editing the surface
    pub fn set_content(&self, agent: &AgentName, text: impl Into<String>) {
        lock(&self.content).insert(agent.clone(), text.into());
    }

    pub fn fail_presenting(&self, fail: bool) {
        *lock(&self.fail_present) = fail;
    }

    pub fn presented(&self) -> Vec<(AgentName, TaskOutput)> {
        lock(&self.presented).clone()
    }
}

#[async_trait]
impl ReviewSurface for MockReviewSurface {
    async fn present(
        &self,
        run_id: Uuid,
        _title: &str,
        agent: &AgentName,
        output: &TaskOutput,
    ) -> PipelineResult<ReviewTicket> {
        if *lock(&self.fail_present) {
            return Err(PipelineError::review("mock surface unavailable"));
        }
        lock(&self.presented).push((agent.clone(), output.clone()));
        lock(&self.content).remove(agent);
        Ok(ReviewTicket {
            run_id,
            agent: agent.clone(),
            location: format!("mock://{}/{}", run_id, agent),
        })
    }

    async fn collect(&self, ticket: &ReviewTicket) -> PipelineResult<String> {
        if let Some(text) = lock(&self.content).get(&ticket.agent) {
            return Ok(text.clone());
        }
        let presented = lock(&self.presented)
            .iter()
            .rev()
            .find(|(agent, _)| agent == &ticket.agent)
            .map(|(_, output)| output.clone());
        match presented {
            Some(output) => ReviewGate::render(&output),
            None => Err(PipelineError::review("nothing presented for this agent")),
        }
    }

    async fn amend(&self, ticket: &ReviewTicket, task: &str, value: &Value) -> PipelineResult<()> {
        let current = self.collect(ticket).await?;
        let amended = amend_text(&ticket.agent, &current, task, value)?;
        lock(&self.content).insert(ticket.agent.clone(), amended);
        Ok(())
    }
}

/// Observer that keeps every event for later assertions
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        lock(&self.events).clone()
    }

    pub fn kinds(&self) -> Vec<PipelineEventKind> {
        lock(&self.events).iter().map(PipelineEvent::kind).collect()
    }

    pub fn count(&self, kind: PipelineEventKind) -> usize {
        lock(&self.events).iter().filter(|e| e.kind() == kind).count()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl PipelineObserver for RecordingObserver {
    fn notify(&self, event: &PipelineEvent) {
        lock(&self.events).push(event.clone());
    }
}

/// Wait until an event of `kind` arrives, or `timeout` elapses
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<PipelineEvent>,
    kind: PipelineEventKind,
    timeout: Duration,
) -> Option<PipelineEvent> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if event.kind() == kind => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    };
    tokio::time::timeout(timeout, wait).await.ok().flatten()
}

/// Convenience bundle of mocks wired into a spawned controller
pub struct MockPipeline {
    pub invoker: Arc<MockAgentInvoker>,
    pub validator: Arc<MockValidationService>,
    pub surface: Arc<MockReviewSurface>,
    pub recorder: Arc<RecordingObserver>,
}

impl MockPipeline {
    pub fn new(invoker: MockAgentInvoker) -> Self {
        Self {
            invoker: Arc::new(invoker),
            validator: Arc::new(MockValidationService::new()),
            surface: Arc::new(MockReviewSurface::new()),
            recorder: Arc::new(RecordingObserver::new()),
        }
    }

    /// Use this validator instead of the default accepting one
    pub fn with_validator(mut self, validator: MockValidationService) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Build a controller over these mocks and the given catalog
    pub fn controller(
        &self,
        catalog: crate::pipeline::agents::AgentCatalog,
    ) -> crate::pipeline::controller::PipelineController {
        crate::pipeline::controller::PipelineController::new(
            catalog,
            self.invoker.clone(),
            self.validator.clone(),
            self.surface.clone(),
        )
        .with_observer(self.recorder.clone())
    }
}
