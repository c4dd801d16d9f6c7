//! agentflow - human-reviewed multi-agent pipeline orchestrator
//!
//! Runs an ordered sequence of remote agents. Each agent receives the run's
//! seed inputs plus the finalized outputs of the agents it depends on. Every
//! output stops at a human review checkpoint, and each task in it must be
//! acknowledged by the validation service before the next agent is dispatched.
//!
//! # Overview
//!
//! - [`pipeline`]: agent catalog, output store, payload resolution, progress
//!   events and the controller task
//! - [`review`]: review surface and the parsing rules for edited output
//! - [`service`]: HTTP agent invoker and validation service
//! - [`audit`]: JSON record of every completed run
//! - [`config`] and [`observability`]: TOML configuration and structured logging
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use agentflow::pipeline::{AgentCatalog, PipelineController, PipelineInputs};
//! use agentflow::review::FileReviewSurface;
//! use agentflow::service::{HttpAgentInvoker, HttpValidationService, ServiceConfig};
//! use std::sync::Arc;
//!
//! # async fn demo() -> agentflow::PipelineResult<()> {
//! let service = ServiceConfig::default();
//! let catalog = AgentCatalog::default();
//! let sequence = catalog.default_sequence();
//!
//! let handle = PipelineController::new(
//!     catalog,
//!     Arc::new(HttpAgentInvoker::new(service.clone())?),
//!     Arc::new(HttpValidationService::new(service)?),
//!     Arc::new(FileReviewSurface::new("review")),
//! )
//! .spawn();
//!
//! let run_id = handle
//!     .start(PipelineInputs::new("Inventory service", "Track stock", "", sequence))
//!     .await?;
//! println!("started run {run_id}");
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod review;
pub mod service;
pub mod testing;

pub use config::{ConfigError, PipelineConfig};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{
    AgentCatalog, AgentName, OutputStore, PipelineController, PipelineEvent, PipelineHandle,
    PipelineInputs, PipelineSnapshot, PipelineStatus, ReviewOutcome, TaskOutput,
};
pub use review::ReviewSubmission;
