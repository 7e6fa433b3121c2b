use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::languages::Language;

const DEFAULT_LANGUAGE_PROMPT: &str = "You are reviewing source code for bugs and logic \
defects. Ignore style and formatting; report only real problems.";

const DEFAULT_PLAN_PROMPT: &str = "Draft a short review plan for the following list of \
project files. Answer with a numbered list.";

const DEFAULT_UPDATE_PLAN_PROMPT: &str = "You maintain the review plan for a project. Given \
the current plan, the most recent actions and the files still to review, return the revised \
plan. Answer with the plan only.";

const DEFAULT_REFLECT_PROMPT: &str = "Assess how the review went against its plan and say \
what could be improved.";

const DEFAULT_FILE_SUMMARY_PROMPT: &str = "Summarize the findings for one file into a short \
list of the most important defects. Drop duplicates.";

const DEFAULT_PROJECT_SUMMARY_PROMPT: &str = "Summarize the per-file findings into an overall \
assessment of the project. Name the most serious defects first.";

/// System prompts for every model call, read once from an optional prompt
/// directory. Missing or blank files fall back to built-in text.
#[derive(Debug, Clone)]
pub struct PromptSet {
    languages: HashMap<Language, String>,
    generic: String,
    pub plan: String,
    pub update_plan: String,
    pub reflect: String,
    pub file_summary: String,
    pub project_summary: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::load(None)
    }
}

impl PromptSet {
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let read = |file: &str, fallback: &str| read_prompt(prompt_dir, file, fallback);

        let languages = Language::ALL
            .iter()
            .map(|lang| (*lang, read(lang.prompt_file(), DEFAULT_LANGUAGE_PROMPT)))
            .collect();

        Self {
            languages,
            generic: read(Language::Generic.prompt_file(), DEFAULT_LANGUAGE_PROMPT),
            plan: read("plan.txt", DEFAULT_PLAN_PROMPT),
            update_plan: read("update_plan.txt", DEFAULT_UPDATE_PLAN_PROMPT),
            reflect: read("reflect.txt", DEFAULT_REFLECT_PROMPT),
            file_summary: read("file_summary.txt", DEFAULT_FILE_SUMMARY_PROMPT),
            project_summary: read("project_summary.txt", DEFAULT_PROJECT_SUMMARY_PROMPT),
        }
    }

    /// System prompt for a language, falling back to the generic one.
    pub fn language(&self, language: Language) -> &str {
        self.languages
            .get(&language)
            .map(String::as_str)
            .unwrap_or(&self.generic)
    }
}

fn read_prompt(dir: Option<&Path>, file: &str, fallback: &str) -> String {
    let Some(dir) = dir else {
        return fallback.to_string();
    };
    let path = dir.join(file);
    match fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => {
            debug!(path = %path.display(), "Loaded prompt file");
            text.trim().to_string()
        }
        Ok(_) => fallback.to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => fallback.to_string(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read prompt file");
            fallback.to_string()
        }
    }
}
