//! Turns a human's review submission back into a [`TaskOutput`]

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::agents::AgentName;
use crate::pipeline::store::TaskOutput;
use serde_json::Value;

/// What the human hands back at the review checkpoint
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewSubmission {
    /// Already-structured output (e.g. from an API client)
    Structured(TaskOutput),
    /// Raw edited text that still needs parsing
    Text(String),
    /// Read the edited content back from the review surface
    FromSurface,
}

/// Parsing rules for edited review content
#[derive(Debug, Default, Clone, Copy)]
pub struct ReviewGate;

impl ReviewGate {
    /// Parse edited text into a task map.
    ///
    /// The text must be a JSON object with at least one non-empty task name.
    /// Failures carry a message precise enough for the human to fix the file.
    pub fn parse(agent: &AgentName, text: &str) -> PipelineResult<TaskOutput> {
        if text.trim().is_empty() {
            return Err(PipelineError::malformed_review(agent, "review content is empty"));
        }

        let value: Value = serde_json::from_str(text).map_err(|e| {
            PipelineError::malformed_review(
                agent,
                format!("invalid JSON at line {}, column {}: {e}", e.line(), e.column()),
            )
        })?;

        if !value.is_object() {
            return Err(PipelineError::malformed_review(
                agent,
                format!(
                    "expected a JSON object mapping task names to values, found {}",
                    json_kind(&value)
                ),
            ));
        }

        // Re-parse into the ordered map so task order survives the edit.
        let output: TaskOutput = serde_json::from_str(text)
            .map_err(|e| PipelineError::malformed_review(agent, e.to_string()))?;
        Self::check(agent, output)
    }

    /// Apply the shape rules to an already-structured submission
    pub fn check(agent: &AgentName, output: TaskOutput) -> PipelineResult<TaskOutput> {
        if output.is_empty() {
            return Err(PipelineError::malformed_review(
                agent,
                "review content contains no tasks",
            ));
        }
        if output.keys().any(|task| task.trim().is_empty()) {
            return Err(PipelineError::malformed_review(
                agent,
                "task names must not be empty",
            ));
        }
        Ok(output)
    }

    /// Render an output the way the review surface shows it
    pub fn render(output: &TaskOutput) -> PipelineResult<String> {
        serde_json::to_string_pretty(output)
            .map_err(|e| PipelineError::review(format!("failed to render output: {e}")))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
