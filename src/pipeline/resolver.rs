//! Builds the input payload for an agent from the shared inputs and the
//! finalized outputs of its declared predecessors.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::agents::{AgentCatalog, AgentName};
use crate::pipeline::state::PipelineInputs;
use crate::pipeline::store::{OutputStore, TaskOutput};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Request body sent to the agent service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPayload {
    pub agent: AgentName,
    pub title: String,
    pub requirements: String,
    pub context: String,
    /// Finalized outputs of the predecessors, in declaration order
    pub dependencies: IndexMap<AgentName, TaskOutput>,
}

/// Table-driven dependency resolution over an [`AgentCatalog`]
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    catalog: AgentCatalog,
}

impl DependencyResolver {
    pub fn new(catalog: AgentCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    /// Assemble the payload for `agent`.
    ///
    /// Predecessors that do not take part in this run are skipped. A
    /// predecessor that does take part but has no finalized output yields
    /// [`PipelineError::MissingDependency`].
    pub fn resolve(
        &self,
        agent: &AgentName,
        inputs: &PipelineInputs,
        store: &OutputStore,
    ) -> PipelineResult<InputPayload> {
        if !self.catalog.contains(agent) {
            return Err(PipelineError::UnknownAgent(agent.to_string()));
        }

        let mut dependencies = IndexMap::new();
        for dep in self.catalog.required_predecessors(agent, &inputs.sequence) {
            let Some(output) = store.get(dep) else {
                error!(
                    agent = %agent,
                    missing = %dep,
                    "Dependency resolved before predecessor was finalized"
                );
                return Err(PipelineError::MissingDependency {
                    agent: agent.clone(),
                    missing: dep.clone(),
                });
            };
            dependencies.insert(dep.clone(), output.clone());
        }

        Ok(InputPayload {
            agent: agent.clone(),
            title: inputs.title.clone(),
            requirements: inputs.requirements.clone(),
            context: inputs.context.clone(),
            dependencies,
        })
    }
}
