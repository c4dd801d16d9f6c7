//! Pipeline controller: the single driver of a run
//!
//! The controller runs as one tokio task that owns the [`PipelineRun`]. It
//! serves commands from [`PipelineHandle`]s and results from agent
//! invocations and validator calls. Both run in spawned tasks so the
//! controller stays responsive while the agent service works; a review
//! command's reply is sent once its validation results are applied. Nothing
//! else mutates run state.
//!
//! ```text
//! Idle --start--> Dispatching(0) --invoke ok--> AwaitingReview(0)
//!                      |                          |  submit + all tasks acknowledged
//!                      | invoke/resolve fails     v
//!                      +--> Failed(i)         Dispatching(i+1) ... --> Completed
//! ```

use crate::agent_span;
use crate::audit::{AuditRecord, AuditWriter};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::agents::{AgentCatalog, AgentName};
use crate::pipeline::events::{
    BroadcastObserver, ObserverSet, PipelineEventPayload, PipelineObserver,
};
use crate::pipeline::handle::{PipelineCommand, PipelineHandle, ReviewOutcome, TaskFailure};
use crate::pipeline::resolver::DependencyResolver;
use crate::pipeline::state::{
    PipelineInputs, PipelineRun, PipelineSnapshot, PipelineStatus, ReviewDraft,
};
use crate::pipeline::store::TaskOutput;
use crate::review::gate::{ReviewGate, ReviewSubmission};
use crate::review::surface::{ReviewSurface, ReviewTicket};
use crate::review_span;
use crate::service::{AgentInvoker, ValidationService};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Pending commands buffered before senders wait
const COMMAND_BUFFER: usize = 64;

/// Default capacity of the progress event broadcast
const EVENT_BUFFER: usize = 256;

type OutcomeReply = oneshot::Sender<PipelineResult<ReviewOutcome>>;

/// Result of one agent invocation and its presentation for review
struct DispatchCompletion {
    run_id: Uuid,
    index: usize,
    result: PipelineResult<(TaskOutput, ReviewTicket)>,
}

/// What a batch of validator calls was for
enum ValidationScope {
    /// Tasks of the draft held at this checkpoint
    Review { index: usize },
    /// One changed task of an already finalized agent
    Finalized,
}

/// Validator answers for a batch of tasks, with the caller's reply still owed
struct ValidationCompletion {
    run_id: Uuid,
    agent: AgentName,
    scope: ValidationScope,
    results: Vec<(String, Value, PipelineResult<()>)>,
    reply: OutcomeReply,
}

/// Work reported back to the controller task
enum Completion {
    Dispatch(DispatchCompletion),
    Validation(ValidationCompletion),
}

/// What a task correction needs once it was applied
enum CorrectionStep {
    /// The draft under review changed; validate this task
    Review { index: usize, task: String },
    /// A finalized task changed; the store waits for the validator
    Finalized { task: String, value: Value },
    /// Nothing to send to the validator
    Done(ReviewOutcome),
}

/// Orchestrates one run at a time through dispatch, review and validation
pub struct PipelineController {
    resolver: DependencyResolver,
    invoker: Arc<dyn AgentInvoker>,
    validator: Arc<dyn ValidationService>,
    surface: Arc<dyn ReviewSurface>,
    observers: ObserverSet,
    broadcast: BroadcastObserver,
    audit: Option<AuditWriter>,
    run: Option<PipelineRun>,
    /// Task invoking and presenting the agent being dispatched
    in_flight: Option<JoinHandle<()>>,
    completions: Option<mpsc::UnboundedSender<Completion>>,
}

impl PipelineController {
    pub fn new(
        catalog: AgentCatalog,
        invoker: Arc<dyn AgentInvoker>,
        validator: Arc<dyn ValidationService>,
        surface: Arc<dyn ReviewSurface>,
    ) -> Self {
        let broadcast = BroadcastObserver::new(EVENT_BUFFER);
        let observers = ObserverSet::new().with(Arc::new(broadcast.clone()));
        Self {
            resolver: DependencyResolver::new(catalog),
            invoker,
            validator,
            surface,
            observers,
            broadcast,
            audit: None,
            run: None,
            in_flight: None,
            completions: None,
        }
    }

    /// Add an observer notified of every progress event
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Write an audit record into this writer's directory on completion
    pub fn with_audit(mut self, writer: AuditWriter) -> Self {
        self.audit = Some(writer);
        self
    }

    pub fn catalog(&self) -> &AgentCatalog {
        self.resolver.catalog()
    }

    /// Move the controller onto its own task and return a handle to it.
    ///
    /// The task ends once every handle has been dropped.
    pub fn spawn(self) -> PipelineHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = PipelineHandle::new(commands_tx, self.broadcast.clone());
        tokio::spawn(
            self.run(commands_rx)
                .instrument(tracing::info_span!("pipeline_controller")),
        );
        handle
    }

    async fn run(mut self, mut commands: mpsc::Receiver<PipelineCommand>) {
        let (completions_tx, mut completions) = mpsc::unbounded_channel();
        self.completions = Some(completions_tx);
        info!(agents = self.catalog().len(), "Pipeline controller running");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(done) = completions.recv() => match done {
                    Completion::Dispatch(done) => self.handle_dispatch(done),
                    Completion::Validation(done) => self.handle_validation(done).await,
                },
            }
        }

        info!("Pipeline controller stopped");
    }

    async fn handle_command(&mut self, command: PipelineCommand) {
        match command {
            PipelineCommand::Start { inputs, reply } => {
                let _ = reply.send(self.start(inputs));
            }
            PipelineCommand::SubmitReview {
                agent,
                submission,
                reply,
            } => match self.accept_submission(&agent, submission).await {
                Ok(index) => self.validate_draft(index, agent, None, reply).await,
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            PipelineCommand::CorrectTask {
                agent,
                task,
                value,
                reply,
            } => match self.apply_correction(&agent, task, value).await {
                Ok(CorrectionStep::Review { index, task }) => {
                    self.validate_draft(index, agent, Some(task), reply).await
                }
                Ok(CorrectionStep::Finalized { task, value }) => {
                    self.spawn_validation(agent, ValidationScope::Finalized, vec![(task, value)], reply)
                }
                Ok(CorrectionStep::Done(outcome)) => {
                    let _ = reply.send(Ok(outcome));
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            PipelineCommand::Retry { reply } => {
                let _ = reply.send(self.retry());
            }
            PipelineCommand::Abandon { reply } => {
                self.abandon();
                let _ = reply.send(());
            }
            PipelineCommand::Snapshot { reply } => {
                let snapshot = self
                    .run
                    .as_ref()
                    .map(PipelineRun::snapshot)
                    .unwrap_or_else(PipelineSnapshot::idle);
                let _ = reply.send(snapshot);
            }
        }
    }

    fn status_label(&self) -> String {
        self.run
            .as_ref()
            .map(|run| run.status.to_string())
            .unwrap_or_else(|| PipelineStatus::Idle.to_string())
    }

    fn start(&mut self, inputs: PipelineInputs) -> PipelineResult<Uuid> {
        inputs.validate()?;
        self.catalog().validate_sequence(&inputs.sequence)?;

        self.cancel_dispatch();
        if let Some(previous) = self.run.take() {
            if !previous.status.is_terminal() {
                warn!(
                    run_id = %previous.id,
                    status = %previous.status,
                    "Discarding active run for new start"
                );
                self.observers
                    .emit(previous.id, PipelineEventPayload::RunAbandoned);
            }
        }

        let run = PipelineRun::new(inputs);
        let run_id = run.id;
        info!(
            run_id = %run_id,
            title = %run.inputs.title,
            agents = run.inputs.sequence.len(),
            "Starting pipeline run"
        );
        self.observers.emit(
            run_id,
            PipelineEventPayload::RunStarted {
                title: run.inputs.title.clone(),
                sequence: run.inputs.sequence.clone(),
            },
        );
        self.run = Some(run);
        self.dispatch(0);
        Ok(run_id)
    }

    /// Enter `Dispatching(index)`: resolve the payload and hand the
    /// invocation and its presentation to a background task.
    fn dispatch(&mut self, index: usize) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let Some(agent) = run.agent_at(index).cloned() else {
            error!(index, "Dispatch requested past the end of the sequence");
            return;
        };

        run.status = PipelineStatus::Dispatching { index };
        run.draft = None;
        run.ticket = None;
        let run_id = run.id;
        let title = run.inputs.title.clone();
        self.observers.emit(
            run_id,
            PipelineEventPayload::DispatchStarted {
                index,
                agent: agent.clone(),
            },
        );

        let payload = match self.resolver.resolve(&agent, &run.inputs, &run.store) {
            Ok(payload) => payload,
            Err(err) => {
                self.fail(index, &agent, err);
                return;
            }
        };

        let Some(completions) = self.completions.clone() else {
            self.fail(
                index,
                &agent,
                PipelineError::invalid_state("Dispatching", "controller is not running"),
            );
            return;
        };

        let invoker = Arc::clone(&self.invoker);
        let surface = Arc::clone(&self.surface);
        let span = agent_span!(run_id = %run_id, agent = %agent, index);
        let task = tokio::spawn(
            async move {
                debug!("Agent invocation started");
                let result = match invoker.invoke(&agent, &payload).await {
                    Ok(output) => surface
                        .present(run_id, &title, &agent, &output)
                        .await
                        .map(|ticket| (output, ticket)),
                    Err(err) => Err(err),
                };
                let _ = completions.send(Completion::Dispatch(DispatchCompletion {
                    run_id,
                    index,
                    result,
                }));
            }
            .instrument(span),
        );
        self.in_flight = Some(task);
    }

    /// Stop an agent invocation nobody is waiting for anymore
    fn cancel_dispatch(&mut self) {
        if let Some(task) = self.in_flight.take() {
            if !task.is_finished() {
                debug!("Cancelling in-flight agent invocation");
                task.abort();
            }
        }
    }

    fn handle_dispatch(&mut self, done: DispatchCompletion) {
        let Some(run) = self.run.as_mut() else {
            debug!(run_id = %done.run_id, "Discarding invocation result: no active run");
            return;
        };
        let expected = PipelineStatus::Dispatching { index: done.index };
        if run.id != done.run_id || run.status != expected {
            debug!(
                run_id = %done.run_id,
                index = done.index,
                "Discarding invocation result for abandoned dispatch"
            );
            return;
        }
        let Some(agent) = run.agent_at(done.index).cloned() else {
            return;
        };

        let (output, ticket) = match done.result {
            Ok(presented) => presented,
            Err(err) => {
                self.fail(done.index, &agent, err);
                return;
            }
        };

        run.status = PipelineStatus::AwaitingReview { index: done.index };
        run.draft = Some(ReviewDraft::new(output.clone()));
        run.ticket = Some(ticket);
        let run_id = run.id;
        self.observers.emit(
            run_id,
            PipelineEventPayload::AwaitingReview {
                index: done.index,
                agent,
                output,
            },
        );
    }

    fn fail(&mut self, index: usize, agent: &AgentName, err: PipelineError) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        if err.is_internal() {
            error!(run_id = %run.id, agent = %agent, error = %err, "Controller invariant violated");
        }
        let reason = err.public_message();
        run.status = PipelineStatus::Failed {
            index,
            reason: reason.clone(),
        };
        run.draft = None;
        run.ticket = None;
        self.observers.emit(
            run.id,
            PipelineEventPayload::RunFailed {
                index,
                agent: agent.clone(),
                reason,
            },
        );
    }

    /// Review commands wait for the previous validation of the run to land
    fn ensure_not_validating(&self) -> PipelineResult<()> {
        match self.run.as_ref() {
            Some(run) if run.validating => Err(PipelineError::invalid_state(
                run.status.to_string(),
                "validation of a previous review command is still in progress",
            )),
            _ => Ok(()),
        }
    }

    /// Index of the agent currently held at the checkpoint, or why there is none
    fn review_position(&self, agent: &AgentName) -> PipelineResult<usize> {
        let run = self
            .run
            .as_ref()
            .ok_or_else(|| PipelineError::invalid_state("Idle", "no active run"))?;
        let PipelineStatus::AwaitingReview { index } = run.status else {
            return Err(PipelineError::invalid_state(
                run.status.to_string(),
                "no agent is awaiting review",
            ));
        };
        match run.agent_at(index) {
            Some(current) if current == agent => Ok(index),
            Some(current) => Err(PipelineError::invalid_state(
                run.status.to_string(),
                format!("agent {agent} is not under review (current: {current})"),
            )),
            None => Err(PipelineError::invalid_state(
                run.status.to_string(),
                "review position outside sequence",
            )),
        }
    }

    /// Parse a submission into the draft and mark it submitted
    async fn accept_submission(
        &mut self,
        agent: &AgentName,
        submission: ReviewSubmission,
    ) -> PipelineResult<usize> {
        self.ensure_not_validating()?;
        let index = self.review_position(agent)?;

        let parsed = match submission {
            ReviewSubmission::Structured(output) => ReviewGate::check(agent, output),
            ReviewSubmission::Text(text) => ReviewGate::parse(agent, &text),
            ReviewSubmission::FromSurface => {
                let ticket = self.run.as_ref().and_then(|run| run.ticket.clone());
                match ticket {
                    Some(ticket) => match self.surface.collect(&ticket).await {
                        Ok(text) => ReviewGate::parse(agent, &text),
                        Err(err) => Err(err),
                    },
                    None => Err(PipelineError::review("nothing was presented for review")),
                }
            }
        };

        let output = match parsed {
            Ok(output) => output,
            Err(err) => {
                let run_id = self.run.as_ref().map(|run| run.id).unwrap_or_default();
                let message = match &err {
                    PipelineError::MalformedReview { message, .. } => message.clone(),
                    other => other.public_message(),
                };
                warn!(agent = %agent, %message, "Review submission rejected");
                self.observers.emit(
                    run_id,
                    PipelineEventPayload::ReviewRejected {
                        index,
                        agent: agent.clone(),
                        message,
                    },
                );
                return Err(err);
            }
        };

        if let Some(draft) = self.run.as_mut().and_then(|run| run.draft.as_mut()) {
            draft.replace(output);
            draft.submitted = true;
        }
        Ok(index)
    }

    /// Apply a correction to the draft under review or check it against a
    /// finalized entry.
    async fn apply_correction(
        &mut self,
        agent: &AgentName,
        task: String,
        value: Value,
    ) -> PipelineResult<CorrectionStep> {
        self.ensure_not_validating()?;
        let run = self
            .run
            .as_ref()
            .ok_or_else(|| PipelineError::invalid_state("Idle", "no active run"))?;

        let under_review = matches!(
            run.status,
            PipelineStatus::AwaitingReview { index } if run.agent_at(index) == Some(agent)
        );

        if under_review {
            let index = run.status.index().unwrap_or_default();
            let draft = run.draft.as_ref().ok_or_else(|| {
                PipelineError::invalid_state(run.status.to_string(), "no draft under review")
            })?;
            if !draft.output.contains_key(&task) {
                return Err(PipelineError::UnknownTask {
                    agent: agent.clone(),
                    task,
                });
            }

            // The surface is re-read on the next FromSurface submission
            if let Some(ticket) = run.ticket.clone() {
                self.surface.amend(&ticket, &task, &value).await?;
            }
            if let Some(slot) = self
                .run
                .as_mut()
                .and_then(|run| run.draft.as_mut())
                .and_then(|draft| draft.output.get_mut(&task))
            {
                *slot = value;
            }
            return Ok(CorrectionStep::Review { index, task });
        }

        if run.store.contains(agent) {
            let current = run
                .store
                .get(agent)
                .and_then(|output| output.get(&task))
                .cloned();
            let Some(current) = current else {
                return Err(PipelineError::UnknownTask {
                    agent: agent.clone(),
                    task,
                });
            };
            if current == value {
                debug!(agent = %agent, task = %task, "Correction identical to acknowledged value");
                return Ok(CorrectionStep::Done(ReviewOutcome::Corrected {
                    agent: agent.clone(),
                    task,
                    changed: false,
                }));
            }
            return Ok(CorrectionStep::Finalized { task, value });
        }

        if run.inputs.sequence.contains(agent) {
            Err(PipelineError::invalid_state(
                run.status.to_string(),
                format!("agent {agent} has no reviewed output yet"),
            ))
        } else {
            Err(PipelineError::UnknownAgent(agent.to_string()))
        }
    }

    /// Send every task of the draft lacking an acknowledgment for its current
    /// value to the validator (or only `only`, if given). With nothing to
    /// send the checkpoint settles right away.
    async fn validate_draft(
        &mut self,
        index: usize,
        agent: AgentName,
        only: Option<String>,
        reply: OutcomeReply,
    ) {
        let work: Vec<(String, Value)> = match self.run.as_ref().and_then(|run| run.draft.as_ref())
        {
            Some(draft) => draft
                .pending_tasks()
                .into_iter()
                .filter(|task| only.as_deref().map_or(true, |only| only == task.as_str()))
                .filter_map(|task| {
                    let value = draft.output.get(&task).cloned()?;
                    Some((task, value))
                })
                .collect(),
            None => Vec::new(),
        };

        if work.is_empty() {
            let outcome = self.settle(index, agent, Vec::new()).await;
            let _ = reply.send(outcome);
            return;
        }
        self.spawn_validation(agent, ValidationScope::Review { index }, work, reply);
    }

    /// Run the validator calls off the controller task; the results come back
    /// as a [`ValidationCompletion`] carrying the caller's reply.
    fn spawn_validation(
        &mut self,
        agent: AgentName,
        scope: ValidationScope,
        work: Vec<(String, Value)>,
        reply: OutcomeReply,
    ) {
        let Some(run) = self.run.as_mut() else {
            let _ = reply.send(Err(PipelineError::invalid_state("Idle", "no active run")));
            return;
        };
        let Some(completions) = self.completions.clone() else {
            let _ = reply.send(Err(PipelineError::invalid_state(
                run.status.to_string(),
                "controller is not running",
            )));
            return;
        };

        run.validating = true;
        let run_id = run.id;
        let validator = Arc::clone(&self.validator);
        let span = review_span!(run_id = %run_id, agent = %agent, tasks = work.len());
        tokio::spawn(
            async move {
                let mut results = Vec::with_capacity(work.len());
                for (task, value) in work {
                    debug!(task = %task, "Submitting task to validator");
                    let result = validator.validate(&agent, &task, &value).await;
                    results.push((task, value, result));
                }
                let _ = completions.send(Completion::Validation(ValidationCompletion {
                    run_id,
                    agent,
                    scope,
                    results,
                    reply,
                }));
            }
            .instrument(span),
        );
    }

    async fn handle_validation(&mut self, done: ValidationCompletion) {
        let ValidationCompletion {
            run_id,
            agent,
            scope,
            results,
            reply,
        } = done;

        let state = self.status_label();
        let Some(run) = self.run.as_mut().filter(|run| run.id == run_id) else {
            debug!(run_id = %run_id, agent = %agent, "Discarding validation result for abandoned run");
            let _ = reply.send(Err(PipelineError::invalid_state(
                state,
                "run was abandoned while validation was in flight",
            )));
            return;
        };
        run.validating = false;

        let outcome = match scope {
            ValidationScope::Review { index } => {
                let failed = self.record_review_results(run_id, &agent, results);
                self.settle(index, agent, failed).await
            }
            ValidationScope::Finalized => self.record_correction(run_id, agent, results),
        };
        let _ = reply.send(outcome);
    }

    /// Record acknowledgments on the draft and return the rejections
    fn record_review_results(
        &mut self,
        run_id: Uuid,
        agent: &AgentName,
        results: Vec<(String, Value, PipelineResult<()>)>,
    ) -> Vec<TaskFailure> {
        let mut failed = Vec::new();
        for (task, value, result) in results {
            match result {
                Ok(()) => {
                    if let Some(draft) = self.run.as_mut().and_then(|run| run.draft.as_mut()) {
                        draft.acknowledged.insert(task.clone(), value);
                    }
                    self.observers.emit(
                        run_id,
                        PipelineEventPayload::TaskValidated {
                            agent: agent.clone(),
                            task,
                        },
                    );
                }
                Err(err) => {
                    let message = validation_message(&err);
                    self.observers.emit(
                        run_id,
                        PipelineEventPayload::TaskValidationFailed {
                            agent: agent.clone(),
                            task: task.clone(),
                            message: message.clone(),
                        },
                    );
                    failed.push(TaskFailure { task, message });
                }
            }
        }
        failed
    }

    /// Store a re-acknowledged task of a finalized agent. The store entry
    /// changes only after the validator accepted the new value.
    fn record_correction(
        &mut self,
        run_id: Uuid,
        agent: AgentName,
        results: Vec<(String, Value, PipelineResult<()>)>,
    ) -> PipelineResult<ReviewOutcome> {
        let Some((task, value, result)) = results.into_iter().next() else {
            return Err(PipelineError::invalid_state(
                self.status_label(),
                "correction produced no validation result",
            ));
        };

        match result {
            Ok(()) => {
                if let Some(run) = self.run.as_mut() {
                    run.store.replace_task(&agent, &task, value);
                }
                self.observers.emit(
                    run_id,
                    PipelineEventPayload::TaskValidated {
                        agent: agent.clone(),
                        task: task.clone(),
                    },
                );
                Ok(ReviewOutcome::Corrected {
                    agent,
                    task,
                    changed: true,
                })
            }
            Err(err) => {
                self.observers.emit(
                    run_id,
                    PipelineEventPayload::TaskValidationFailed {
                        agent: agent.clone(),
                        task: task.clone(),
                        message: validation_message(&err),
                    },
                );
                Err(err)
            }
        }
    }

    /// Finalize the agent under review if it is submitted and fully
    /// acknowledged, then move on; otherwise report what is still open.
    async fn settle(
        &mut self,
        index: usize,
        agent: AgentName,
        failed: Vec<TaskFailure>,
    ) -> PipelineResult<ReviewOutcome> {
        let run = self
            .run
            .as_mut()
            .ok_or_else(|| PipelineError::invalid_state("Idle", "run abandoned during review"))?;
        let draft = run.draft.as_ref().ok_or_else(|| {
            PipelineError::invalid_state(run.status.to_string(), "no draft under review")
        })?;

        if !(draft.submitted && draft.is_complete()) {
            return Ok(ReviewOutcome::Pending {
                failed,
                pending_tasks: draft.pending_tasks(),
                submitted: draft.submitted,
            });
        }

        let Some(draft) = run.draft.take() else {
            return Err(PipelineError::invalid_state(
                run.status.to_string(),
                "no draft under review",
            ));
        };
        run.ticket = None;
        if !run.store.finalize(agent.clone(), draft.output) {
            // Ordering guarantees each agent is reviewed once per run.
            error!(agent = %agent, "Agent already finalized in this run");
        }
        let run_id = run.id;
        let next = run.agent_at(index + 1).cloned();
        self.observers.emit(
            run_id,
            PipelineEventPayload::AgentValidated {
                index,
                agent: agent.clone(),
            },
        );

        match next {
            Some(next) => {
                self.dispatch(index + 1);
                Ok(ReviewOutcome::Advanced {
                    finalized: agent,
                    next,
                })
            }
            None => {
                self.complete().await;
                Ok(ReviewOutcome::Completed)
            }
        }
    }

    async fn complete(&mut self) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        run.status = PipelineStatus::Completed;
        let run_id = run.id;
        let agents = run.store.len();
        let record = AuditRecord::new(run_id, &run.inputs, &run.store);
        info!(run_id = %run_id, agents, "Pipeline run completed");

        if let Some(writer) = &self.audit {
            if let Err(e) = writer.write(&record).await {
                warn!(run_id = %run_id, error = %e, "Audit record not written");
            }
        }
        self.observers
            .emit(run_id, PipelineEventPayload::RunCompleted { agents });
    }

    fn retry(&mut self) -> PipelineResult<()> {
        let status = self.status_label();
        let index = match self.run.as_ref().map(|run| &run.status) {
            Some(PipelineStatus::Failed { index, .. }) => *index,
            _ => {
                return Err(PipelineError::invalid_state(
                    status,
                    "only a failed run can be retried",
                ))
            }
        };
        info!(index, "Retrying failed dispatch");
        self.dispatch(index);
        Ok(())
    }

    fn abandon(&mut self) {
        self.cancel_dispatch();
        match self.run.take() {
            Some(run) => {
                info!(run_id = %run.id, status = %run.status, "Run abandoned");
                self.observers.emit(run.id, PipelineEventPayload::RunAbandoned);
            }
            None => debug!("Abandon requested with no active run"),
        }
    }
}

fn validation_message(err: &PipelineError) -> String {
    match err {
        PipelineError::Validation { message, .. } => crate::error::sanitize_error_message(message),
        other => other.public_message(),
    }
}
