//! Observability for the orchestrator
//!
//! Structured logging only; progress reporting to the presentation layer goes
//! through pipeline events.

pub mod logging;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, parse_level, LogFormat, LogSettings};

// Span macros for structured logging
pub use logging::{agent_span, review_span};
