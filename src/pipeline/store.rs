//! Finalized agent outputs
//!
//! The store only ever holds outputs that cleared review and validation. It is
//! owned by the controller's run aggregate; nothing else gets a mutable handle.

use crate::pipeline::agents::AgentName;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of one agent invocation: task name to arbitrary structured value
pub type TaskOutput = IndexMap<String, Value>;

/// Agent name to finalized output, ordered by completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputStore {
    entries: IndexMap<AgentName, TaskOutput>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, agent: &AgentName) -> Option<&TaskOutput> {
        self.entries.get(agent)
    }

    pub fn contains(&self, agent: &AgentName) -> bool {
        self.entries.contains_key(agent)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentName> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AgentName, &TaskOutput)> {
        self.entries.iter()
    }

    /// Record a finalized output.
    ///
    /// Returns false and leaves the store untouched if the agent already has
    /// an entry; re-dispatch never overwrites finalized output.
    pub(crate) fn finalize(&mut self, agent: AgentName, output: TaskOutput) -> bool {
        if self.entries.contains_key(&agent) {
            return false;
        }
        self.entries.insert(agent, output);
        true
    }

    /// Replace a single task value of a finalized entry after it was
    /// re-acknowledged. Returns false if the agent or task does not exist.
    pub(crate) fn replace_task(&mut self, agent: &AgentName, task: &str, value: Value) -> bool {
        match self.entries.get_mut(agent).and_then(|output| output.get_mut(task)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}
