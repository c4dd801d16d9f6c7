//! Where a human views and edits agent output
//!
//! The controller only needs two things from a surface: show this output, and
//! later give back whatever the human left there. How the human edits it is
//! the surface's business.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::agents::AgentName;
use crate::pipeline::store::TaskOutput;
use crate::review::gate::ReviewGate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handle to content shown on a review surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewTicket {
    pub run_id: Uuid,
    pub agent: AgentName,
    /// Surface-specific location (a file path for [`FileReviewSurface`])
    pub location: String,
}

/// Presents agent output for inspection and editing
#[async_trait]
pub trait ReviewSurface: Send + Sync {
    /// Show `output` to the human. Must not wait for the human.
    async fn present(
        &self,
        run_id: Uuid,
        title: &str,
        agent: &AgentName,
        output: &TaskOutput,
    ) -> PipelineResult<ReviewTicket>;

    /// Read back whatever the human left on the surface
    async fn collect(&self, ticket: &ReviewTicket) -> PipelineResult<String>;

    /// Write a corrected task value onto the surface, keeping the human's
    /// other edits, so a later [`ReviewSurface::collect`] returns it.
    async fn amend(&self, ticket: &ReviewTicket, task: &str, value: &Value) -> PipelineResult<()>;
}

/// Apply one task correction to surface text holding a task object
pub fn amend_text(
    agent: &AgentName,
    text: &str,
    task: &str,
    value: &Value,
) -> PipelineResult<String> {
    let mut output = ReviewGate::parse(agent, text).map_err(|e| {
        PipelineError::review(format!(
            "cannot apply correction to '{task}': review content is not valid ({e})"
        ))
    })?;
    output.insert(task.to_string(), value.clone());
    ReviewGate::render(&output)
}

/// Writes each output to `<root>/<title-slug>-<run-id>/<agent>.json` for
/// editing. Runs never share a directory.
pub struct FileReviewSurface {
    root: PathBuf,
    editor: Option<String>,
}

impl FileReviewSurface {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            editor: None,
        }
    }

    /// Launch this command with the file path when output is presented.
    /// The editor is not waited on.
    pub fn with_editor(mut self, editor: impl Into<String>) -> Self {
        self.editor = Some(editor.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, run_id: Uuid, title: &str, agent: &AgentName) -> PathBuf {
        self.root
            .join(format!("{}-{run_id}", slugify(title)))
            .join(format!("{}.json", agent.as_str()))
    }

    fn launch_editor(&self, path: &Path) {
        let Some(editor) = &self.editor else {
            return;
        };
        let mut parts = editor.split_whitespace();
        let Some(program) = parts.next() else {
            return;
        };
        match tokio::process::Command::new(program)
            .args(parts)
            .arg(path)
            .spawn()
        {
            Ok(_) => debug!(editor = %editor, path = %path.display(), "Launched editor"),
            Err(e) => warn!(editor = %editor, error = %e, "Failed to launch editor"),
        }
    }
}

#[async_trait]
impl ReviewSurface for FileReviewSurface {
    async fn present(
        &self,
        run_id: Uuid,
        title: &str,
        agent: &AgentName,
        output: &TaskOutput,
    ) -> PipelineResult<ReviewTicket> {
        let path = self.path_for(run_id, title, agent);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PipelineError::review(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let rendered = ReviewGate::render(output)?;
        tokio::fs::write(&path, rendered)
            .await
            .map_err(|e| PipelineError::review(format!("cannot write {}: {e}", path.display())))?;

        info!(agent = %agent, path = %path.display(), "Output ready for review");
        self.launch_editor(&path);

        Ok(ReviewTicket {
            run_id,
            agent: agent.clone(),
            location: path.display().to_string(),
        })
    }

    async fn collect(&self, ticket: &ReviewTicket) -> PipelineResult<String> {
        tokio::fs::read_to_string(&ticket.location)
            .await
            .map_err(|e| PipelineError::review(format!("cannot read {}: {e}", ticket.location)))
    }

    async fn amend(&self, ticket: &ReviewTicket, task: &str, value: &Value) -> PipelineResult<()> {
        let current = self.collect(ticket).await?;
        let amended = amend_text(&ticket.agent, &current, task, value)?;
        tokio::fs::write(&ticket.location, amended)
            .await
            .map_err(|e| PipelineError::review(format!("cannot write {}: {e}", ticket.location)))?;
        debug!(agent = %ticket.agent, task, path = %ticket.location, "Correction written to review file");
        Ok(())
    }
}

/// Lowercase, dash-separated, filesystem-safe form of a title
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}
