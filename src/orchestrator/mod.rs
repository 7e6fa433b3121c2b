//! Drives one review run over a project tree.

pub mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::analysis::{ActionKind, ActionLog, ActionLogEntry, AnalysisEngine, Plan, Planner, PromptSet};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::languages::LanguageRegistry;
use crate::memory::{latest_per_scope, MemoryStore, RecordKind};
use crate::model::{is_error_result, ModelCaller};
use crate::source::FileWalker;

pub use progress::{ProgressSnapshot, RunProgress};

/// Everything the report renderer needs from a finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// `(file path, per-file report)` in processing order.
    pub results: Vec<(String, String)>,
    pub project_summary: String,
    pub reflection: String,
    pub plan: String,
    pub action_log: Vec<ActionLogEntry>,
}

pub struct Orchestrator {
    engine: AnalysisEngine,
    planner: Planner,
    memory: Arc<dyn MemoryStore>,
    walker: FileWalker,
    progress: RunProgress,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ModelCaller>,
        memory: Arc<dyn MemoryStore>,
        settings: AnalysisConfig,
    ) -> Self {
        let prompts = Arc::new(PromptSet::load(settings.prompt_dir.as_deref()));
        let planner = Planner::new(
            Arc::clone(&model),
            Arc::clone(&prompts),
            settings.action_log_window,
        );
        let engine = AnalysisEngine::new(model, Arc::clone(&memory), prompts, settings);
        Self {
            engine,
            planner,
            memory,
            walker: FileWalker::new(LanguageRegistry::new()),
            progress: RunProgress::new(),
        }
    }

    pub fn with_progress(mut self, progress: RunProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Files a run over `root` would analyse, in processing order.
    pub fn collect_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        self.walker.walk(root)
    }

    /// Plans, analyses every eligible file in order while revising the plan,
    /// then asks for the project summary and a reflection.
    pub async fn run(&self, root: &Path) -> Result<RunOutcome> {
        let files = self.collect_files(root)?;
        info!(root = %root.display(), files = files.len(), "Collected files for review");
        self.progress.start(files.len());

        let mut plan = Plan::new(self.planner.get_plan(&files).await);
        debug!(plan = %plan.text(), "Initial plan");

        let mut log = ActionLog::new();
        let mut results = Vec::with_capacity(files.len());

        for (idx, path) in files.iter().enumerate() {
            let file_id = path.to_string_lossy().into_owned();
            info!(file = %file_id, "Reviewing file");
            self.progress.begin_file(&file_id);

            let outcome = self.engine.run_file_actions(path).await;
            let read_failed = outcome
                .entries
                .iter()
                .any(|e| e.action == ActionKind::ReadFailed);
            self.progress.finish_file(outcome.deepened, read_failed);

            results.push((file_id.clone(), outcome.report));
            log.extend(outcome.entries);

            let revision = self
                .planner
                .update_plan(&plan, &log, &files[idx + 1..])
                .await;
            if is_error_result(&revision) {
                warn!(file = %file_id, "Plan revision failed: {}", revision);
            }
            if plan.apply_revision(&revision) {
                debug!(plan = %plan.text(), "Plan revised");
            }
        }

        // A deep dive supersedes the file's primary-pass summary.
        let summaries = self
            .memory
            .list_summaries(RecordKind::FileSummary)
            .map(latest_per_scope)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to list file summaries");
                Vec::new()
            });
        let project_summary = self.engine.summarize_project(&summaries).await;
        let reflection = self.planner.reflect(&plan, &log).await;

        self.progress.finish();
        info!(
            files = results.len(),
            actions = log.len(),
            "Review finished"
        );

        Ok(RunOutcome {
            results,
            project_summary,
            reflection,
            plan: plan.into_text(),
            action_log: log.entries().to_vec(),
        })
    }
}
