//! Agent names and the declarative dependency table
//!
//! Which prior outputs an agent consumes is data, not control flow: the
//! catalog maps each [`AgentName`] to the predecessors it requires, and the
//! resolver walks that table uniformly for every agent.

use crate::error::{PipelineError, PipelineResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Identifier of one pipeline step (must match `[A-Za-z0-9_-]+`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentName(String);

impl AgentName {
    pub fn new<S: Into<String>>(name: S) -> PipelineResult<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PipelineError::invalid_input(format!(
                "Agent name '{name}' must match pattern [A-Za-z0-9_-]+"
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AgentName {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AgentName::new(value)
    }
}

impl From<AgentName> for String {
    fn from(name: AgentName) -> Self {
        name.0
    }
}

impl std::str::FromStr for AgentName {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentName::new(s.trim())
    }
}

/// One row of the dependency table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: AgentName,
    /// Agents whose finalized output this agent consumes, in payload order
    #[serde(default)]
    pub depends_on: Vec<AgentName>,
}

impl AgentSpec {
    pub fn new(name: AgentName, depends_on: Vec<AgentName>) -> Self {
        Self { name, depends_on }
    }
}

/// Ordered, declarative table of every agent the pipeline knows about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCatalog {
    specs: IndexMap<AgentName, AgentSpec>,
}

/// Built-in agents and their declared predecessors, in pipeline order
const DEFAULT_AGENTS: &[(&str, &[&str])] = &[
    ("KnowledgeBase", &[]),
    ("Requirements", &["KnowledgeBase"]),
    ("Architecture", &["Requirements", "KnowledgeBase"]),
    ("Skeletons", &["Architecture", "Requirements"]),
    ("Generator", &["Skeletons", "Architecture", "Requirements"]),
];

impl Default for AgentCatalog {
    fn default() -> Self {
        let specs = DEFAULT_AGENTS
            .iter()
            .map(|(name, deps)| {
                let name = AgentName(name.to_string());
                let depends_on = deps.iter().map(|d| AgentName(d.to_string())).collect();
                (name.clone(), AgentSpec::new(name, depends_on))
            })
            .collect();
        Self { specs }
    }
}

impl AgentCatalog {
    /// Build a catalog from explicit specs.
    ///
    /// Rejects duplicate names and predecessors that are not themselves in
    /// the catalog.
    pub fn from_specs(specs: Vec<AgentSpec>) -> PipelineResult<Self> {
        let mut table = IndexMap::new();
        for spec in specs {
            if table.contains_key(&spec.name) {
                return Err(PipelineError::invalid_input(format!(
                    "Agent {} is declared more than once",
                    spec.name
                )));
            }
            table.insert(spec.name.clone(), spec);
        }

        for spec in table.values() {
            for dep in &spec.depends_on {
                if dep == &spec.name {
                    return Err(PipelineError::invalid_input(format!(
                        "Agent {} cannot depend on itself",
                        spec.name
                    )));
                }
                if !table.contains_key(dep) {
                    return Err(PipelineError::invalid_input(format!(
                        "Agent {} depends on undeclared agent {dep}",
                        spec.name
                    )));
                }
            }
        }

        Ok(Self { specs: table })
    }

    pub fn get(&self, name: &AgentName) -> Option<&AgentSpec> {
        self.specs.get(name)
    }

    /// Look up an agent by its textual name
    pub fn find(&self, name: &str) -> Option<&AgentSpec> {
        self.specs.values().find(|spec| spec.name.as_str() == name)
    }

    pub fn contains(&self, name: &AgentName) -> bool {
        self.specs.contains_key(name)
    }

    /// Agents in declaration order, which is also the default run sequence
    pub fn default_sequence(&self) -> Vec<AgentName> {
        self.specs.keys().cloned().collect()
    }

    pub fn specs(&self) -> impl Iterator<Item = &AgentSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Check that a run sequence can be executed front to back.
    ///
    /// Every agent must be known and appear once, and every declared
    /// predecessor that takes part in the run must come before its dependent.
    /// Predecessors absent from the sequence are optional for that run.
    pub fn validate_sequence(&self, sequence: &[AgentName]) -> PipelineResult<()> {
        if sequence.is_empty() {
            return Err(PipelineError::invalid_sequence("sequence is empty"));
        }

        let mut seen = HashSet::new();
        for name in sequence {
            if !self.contains(name) {
                return Err(PipelineError::invalid_sequence(format!(
                    "agent {name} is not in the catalog"
                )));
            }
            if !seen.insert(name) {
                return Err(PipelineError::invalid_sequence(format!(
                    "agent {name} appears more than once"
                )));
            }
        }

        for (position, name) in sequence.iter().enumerate() {
            let Some(spec) = self.get(name) else {
                continue;
            };
            for dep in &spec.depends_on {
                if let Some(dep_position) = sequence.iter().position(|n| n == dep) {
                    if dep_position > position {
                        return Err(PipelineError::invalid_sequence(format!(
                            "agent {name} depends on {dep}, which runs after it"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Predecessors of `name` that take part in the given sequence
    pub fn required_predecessors<'a>(
        &'a self,
        name: &AgentName,
        sequence: &'a [AgentName],
    ) -> Vec<&'a AgentName> {
        self.get(name)
            .map(|spec| {
                spec.depends_on
                    .iter()
                    .filter(|dep| sequence.contains(dep))
                    .collect()
            })
            .unwrap_or_default()
    }
}
