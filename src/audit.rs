//! Audit snapshot written when a run completes

use crate::pipeline::agents::AgentName;
use crate::pipeline::state::PipelineInputs;
use crate::pipeline::store::OutputStore;
use crate::review::surface::slugify;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to write audit record: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Inputs plus every finalized output of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub run_id: Uuid,
    pub title: String,
    pub requirements: String,
    pub context: String,
    pub sequence: Vec<AgentName>,
    pub outputs: OutputStore,
    pub completed_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(run_id: Uuid, inputs: &PipelineInputs, outputs: &OutputStore) -> Self {
        Self {
            run_id,
            title: inputs.title.clone(),
            requirements: inputs.requirements.clone(),
            context: inputs.context.clone(),
            sequence: inputs.sequence.clone(),
            outputs: outputs.clone(),
            completed_at: Utc::now(),
        }
    }
}

/// Writes audit records as pretty JSON into one directory
#[derive(Debug, Clone)]
pub struct AuditWriter {
    directory: PathBuf,
}

impl AuditWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub async fn write(&self, record: &AuditRecord) -> Result<PathBuf, AuditError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self
            .directory
            .join(format!("{}-{}.json", slugify(&record.title), record.run_id));
        let body = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, body).await?;
        info!(path = %path.display(), "Audit record written");
        Ok(path)
    }
}
