//! Sequential, human-reviewed agent pipeline
//!
//! This module provides the orchestration core: the agent dependency table,
//! the output store, payload resolution, progress events and the controller
//! task that drives a run through dispatch, review and validation.

pub mod agents;
pub mod controller;
pub mod events;
pub mod handle;
pub mod resolver;
pub mod state;
pub mod store;

// Re-export public types for convenience
pub use agents::{AgentCatalog, AgentName, AgentSpec};
pub use controller::PipelineController;
pub use events::{
    BroadcastObserver, LoggingObserver, ObserverSet, PipelineEvent, PipelineEventKind,
    PipelineEventPayload, PipelineObserver,
};
pub use handle::{PipelineCommand, PipelineHandle, ReviewOutcome, TaskFailure};
pub use resolver::{DependencyResolver, InputPayload};
pub use state::{PipelineInputs, PipelineSnapshot, PipelineStatus};
pub use store::{OutputStore, TaskOutput};
