use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::model::{ChatMessage, ModelCaller};
use crate::source::file_name_of;

use super::prompts::PromptSet;

/// Step recorded in the action log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    PrimaryAnalysis,
    DeepDive,
    ReadFailed,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::PrimaryAnalysis => "primary_analysis",
            ActionKind::DeepDive => "deep_dive",
            ActionKind::ReadFailed => "read_failed",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered as `<file>: <action>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLogEntry {
    pub file: String,
    pub action: ActionKind,
}

impl ActionLogEntry {
    pub fn new(file: impl Into<String>, action: ActionKind) -> Self {
        Self {
            file: file.into(),
            action,
        }
    }
}

impl fmt::Display for ActionLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file, self.action)
    }
}

/// Append-only record of what the run did, in order.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    entries: Vec<ActionLogEntry>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = ActionLogEntry>) {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[ActionLogEntry] {
        &self.entries
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[ActionLogEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Free-text review plan. Only a non-blank revision replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    text: String,
}

impl Plan {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns whether the revision was applied.
    pub fn apply_revision(&mut self, revision: &str) -> bool {
        if revision.trim().is_empty() {
            return false;
        }
        self.text = revision.to_string();
        true
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Model-driven planning loop: initial plan, per-file revision and a final
/// reflection.
pub struct Planner {
    model: Arc<dyn ModelCaller>,
    prompts: Arc<PromptSet>,
    log_window: usize,
}

impl Planner {
    pub fn new(model: Arc<dyn ModelCaller>, prompts: Arc<PromptSet>, log_window: usize) -> Self {
        Self {
            model,
            prompts,
            log_window,
        }
    }

    pub async fn get_plan(&self, files: &[PathBuf]) -> String {
        let user = format!("Project files: {}", file_names(files));
        self.model
            .call(&[
                ChatMessage::system(self.prompts.plan.clone()),
                ChatMessage::user(user),
            ])
            .await
    }

    /// Asks for a revised plan given the recent actions and the files still
    /// to review. The caller decides whether to keep the answer.
    pub async fn update_plan(&self, plan: &Plan, log: &ActionLog, remaining: &[PathBuf]) -> String {
        let recent = log
            .recent(self.log_window)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        let remaining = if remaining.is_empty() {
            "none".to_string()
        } else {
            file_names(remaining)
        };
        let user = format!(
            "Current plan:\n{}\n\nRecent actions:\n{}\n\nRemaining files: {}",
            plan.text(),
            recent,
            remaining
        );
        debug!(remaining = %remaining, "Requesting plan revision");
        self.model
            .call(&[
                ChatMessage::system(self.prompts.update_plan.clone()),
                ChatMessage::user(user),
            ])
            .await
    }

    pub async fn reflect(&self, plan: &Plan, log: &ActionLog) -> String {
        let user = format!(
            "Plan:\n{}\n\nObservations:\n{}",
            plan.text(),
            log.lines().join("\n")
        );
        self.model
            .call(&[
                ChatMessage::system(self.prompts.reflect.clone()),
                ChatMessage::user(user),
            ])
            .await
    }
}

fn file_names(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|f| file_name_of(f))
        .collect::<Vec<_>>()
        .join(", ")
}
