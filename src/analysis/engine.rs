use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::languages::LanguageRegistry;
use crate::memory::{latest_per_scope, MemoryRecord, MemoryStore, RecordKind};
use crate::model::{ChatMessage, ModelCaller, ERROR_PREFIX};
use crate::source::{chunk, extract_symbol_names, SourceFile};

use super::planner::{ActionKind, ActionLogEntry};
use super::prompts::PromptSet;

/// Case-insensitive substrings that send a file through a second, focused
/// pass.
pub const TRIGGER_TOKENS: &[&str] = &[
    "error",
    "vulnerability",
    "critical",
    "race",
    "injection",
    "overflow",
];

/// Focus hint used for the second pass.
pub const DEEP_DIVE_FOCUS: &str =
    "For every problem found, explain its cause, its consequences and how to fix it.";

/// Report for a file that produced no chunks.
pub const EMPTY_FILE_REPORT: &str = "_Empty file, nothing to review._";

const SCOPE_PROJECT: &str = "project";

/// What happened to one file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub entries: Vec<ActionLogEntry>,
    pub report: String,
    pub deepened: bool,
}

pub fn needs_deeper_check(result: &str) -> bool {
    let lowered = result.to_lowercase();
    TRIGGER_TOKENS.iter().any(|token| lowered.contains(token))
}

/// Chunk-level analysis with memory-augmented context, file summarization
/// and adaptive re-analysis.
pub struct AnalysisEngine {
    model: Arc<dyn ModelCaller>,
    memory: Arc<dyn MemoryStore>,
    prompts: Arc<PromptSet>,
    registry: LanguageRegistry,
    settings: AnalysisConfig,
}

impl AnalysisEngine {
    pub fn new(
        model: Arc<dyn ModelCaller>,
        memory: Arc<dyn MemoryStore>,
        prompts: Arc<PromptSet>,
        settings: AnalysisConfig,
    ) -> Self {
        Self {
            model,
            memory,
            prompts,
            registry: LanguageRegistry::new(),
            settings,
        }
    }

    /// Reads the file and runs the primary pass, plus one deep dive when the
    /// primary result carries a trigger token.
    pub async fn run_file_actions(&self, path: &Path) -> FileOutcome {
        let file_id = path.to_string_lossy().into_owned();
        let code = match tokio::fs::read(path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(file = %file_id, error = %e, "Failed to read file");
                return FileOutcome {
                    entries: vec![ActionLogEntry::new(file_id, ActionKind::ReadFailed)],
                    report: format!("{}cannot read file ({})", ERROR_PREFIX, e),
                    deepened: false,
                };
            }
        };

        let mut entries = vec![ActionLogEntry::new(file_id.clone(), ActionKind::PrimaryAnalysis)];
        let mut report = self.analyze_file(path, &code, None).await;
        let mut deepened = false;

        if needs_deeper_check(&report) {
            info!(file = %file_id, "Severity signal found, running deep dive");
            entries.push(ActionLogEntry::new(file_id, ActionKind::DeepDive));
            report = self.analyze_file(path, &code, Some(DEEP_DIVE_FOCUS)).await;
            deepened = true;
        }

        FileOutcome {
            entries,
            report,
            deepened,
        }
    }

    /// Analyses every chunk of `code`, then summarizes the file. Returns the
    /// per-file report: block findings in order followed by the summary.
    pub async fn analyze_file(&self, path: &Path, code: &str, focus_hint: Option<&str>) -> String {
        let file = SourceFile::new(path, &self.registry);
        let file_id = file.id();
        let language = file.language;
        let system_prompt = self.prompts.language(language).to_string();

        let chunks = chunk(code, self.settings.chunk_size);
        if chunks.is_empty() {
            debug!(file = %file_id, "Nothing to analyse");
            return EMPTY_FILE_REPORT.to_string();
        }

        if let Err(e) = self
            .memory
            .store_chunks(&file_id, language.label(), &chunks, RecordKind::Code)
        {
            warn!(file = %file_id, error = %e, "Failed to store code chunks");
        }

        let cross_file = self.cross_file_context(&file_id);
        let total = chunks.len();
        let mut findings = Vec::with_capacity(total);

        for (index, block) in chunks.iter().enumerate() {
            let memory_context = if block.chars().count() < self.settings.augment_threshold
                || focus_hint.is_some()
            {
                self.memory_context(&file, block, total)
            } else {
                Vec::new()
            };

            let user_prompt = self.block_prompt(
                &file,
                block,
                index,
                total,
                focus_hint,
                &cross_file,
                &memory_context,
            );
            debug!(
                file = %file_id,
                block = index + 1,
                total,
                memory_hits = memory_context.len(),
                "Analysing block"
            );

            let finding = self
                .model
                .call(&[
                    ChatMessage::system(system_prompt.clone()),
                    ChatMessage::user(user_prompt),
                ])
                .await;

            let scope = format!("{}:{}", file_id, index);
            if let Err(e) = self
                .memory
                .store_summary(&scope, &finding, RecordKind::BlockSummary)
            {
                warn!(scope = %scope, error = %e, "Failed to store block finding");
            }
            findings.push(finding);
        }

        let summary = self.summarize_file(&file, &findings).await;
        if let Err(e) = self
            .memory
            .store_summary(&file_id, &summary, RecordKind::FileSummary)
        {
            warn!(file = %file_id, error = %e, "Failed to store file summary");
        }

        render_file_report(&findings, &summary)
    }

    /// Asks for an overall assessment from the per-file summaries and stores
    /// it as the project summary. No summaries means no call.
    pub async fn summarize_project(&self, summaries: &[MemoryRecord]) -> String {
        if summaries.is_empty() {
            return String::new();
        }
        let body = summaries
            .iter()
            .map(|r| format!("### {}\n{}", r.scope, r.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        let summary = self
            .model
            .call(&[
                ChatMessage::system(self.prompts.project_summary.clone()),
                ChatMessage::user(format!("Per-file findings:\n\n{}", body)),
            ])
            .await;

        if let Err(e) =
            self.memory
                .store_summary(SCOPE_PROJECT, &summary, RecordKind::ProjectSummary)
        {
            warn!(error = %e, "Failed to store project summary");
        }
        summary
    }

    async fn summarize_file(&self, file: &SourceFile, findings: &[String]) -> String {
        let total = findings.len();
        let blocks = findings
            .iter()
            .enumerate()
            .map(|(i, f)| format!("Block {}/{}:\n{}", i + 1, total, f))
            .collect::<Vec<_>>()
            .join("\n\n");
        let user = format!(
            "File: {}\nLanguage: {}\n\nBlock findings:\n{}",
            file.file_name(),
            file.language,
            blocks
        );
        self.model
            .call(&[
                ChatMessage::system(self.prompts.file_summary.clone()),
                ChatMessage::user(user),
            ])
            .await
    }

    /// Latest summaries of the most recently reviewed other files.
    fn cross_file_context(&self, file_id: &str) -> Vec<MemoryRecord> {
        match self.memory.list_summaries(RecordKind::FileSummary) {
            Ok(records) => {
                let mut others: Vec<MemoryRecord> = latest_per_scope(records)
                    .into_iter()
                    .filter(|r| r.scope != file_id)
                    .collect();
                let excess = others.len().saturating_sub(self.settings.context_summaries);
                others.drain(..excess);
                others
            }
            Err(e) => {
                warn!(error = %e, "Failed to load file summaries");
                Vec::new()
            }
        }
    }

    /// Code fragments from other files related to the block, found by the
    /// symbol names it defines or, failing that, by file name and language.
    fn memory_context(&self, file: &SourceFile, block: &str, own_chunks: usize) -> Vec<MemoryRecord> {
        let file_id = file.id();
        let top_k = self.settings.memory_top_k;
        if top_k == 0 {
            return Vec::new();
        }

        let mut queries = extract_symbol_names(block, self.settings.symbol_queries);
        if queries.is_empty() {
            queries = vec![file.file_name(), file.language.label().to_string()];
        }

        let mut seen = HashSet::new();
        let mut hits = Vec::new();
        'queries: for query in &queries {
            // Over-fetch so dropping this file's own chunks still leaves top_k.
            for record in self
                .memory
                .query(query, top_k + own_chunks, Some(RecordKind::Code))
            {
                if record.scope == file_id || !seen.insert(record.id.clone()) {
                    continue;
                }
                hits.push(record);
                if hits.len() >= top_k {
                    break 'queries;
                }
            }
        }
        hits
    }

    #[allow(clippy::too_many_arguments)]
    fn block_prompt(
        &self,
        file: &SourceFile,
        block: &str,
        index: usize,
        total: usize,
        focus_hint: Option<&str>,
        cross_file: &[MemoryRecord],
        memory_context: &[MemoryRecord],
    ) -> String {
        let mut prompt = format!(
            "File: {}\nLanguage: {}\nBlock {} of {}\nCode:\n```{}\n{}\n```\n\
             Find bugs, logic errors and vulnerabilities. Ignore style and formatting.",
            file.file_name(),
            file.language,
            index + 1,
            total,
            file.language.fence(),
            block
        );
        if let Some(hint) = focus_hint {
            prompt.push_str(&format!("\nAdditional focus: {}", hint));
        }
        if !cross_file.is_empty() {
            prompt.push_str("\nFindings from previously reviewed files:\n");
            prompt.push_str(&self.bullet_list(cross_file));
        }
        if !memory_context.is_empty() {
            prompt.push_str("\nContext from memory (code fragments):\n");
            prompt.push_str(&self.bullet_list(memory_context));
        }
        prompt
    }

    fn bullet_list(&self, records: &[MemoryRecord]) -> String {
        records
            .iter()
            .map(|r| {
                format!(
                    "- [{}] {}",
                    r.scope,
                    truncate_chars(&r.text, self.settings.snippet_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

fn render_file_report(findings: &[String], summary: &str) -> String {
    let total = findings.len();
    let mut sections: Vec<String> = findings
        .iter()
        .enumerate()
        .map(|(i, f)| format!("### Block {}/{}\n\n{}", i + 1, total, f))
        .collect();
    sections.push(format!("### File summary\n\n{}", summary));
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LinearMemory;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replies by looking up the first rule whose needle occurs in the user
    /// message; records every conversation.
    struct ScriptedModel {
        rules: Vec<(String, String)>,
        default_reply: String,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(rules: &[(&str, &str)], default_reply: &str) -> Arc<Self> {
            Arc::new(Self {
                rules: rules
                    .iter()
                    .map(|(n, r)| (n.to_string(), r.to_string()))
                    .collect(),
                default_reply: default_reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn user_messages(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|m| m[1].content.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ModelCaller for ScriptedModel {
        async fn call(&self, messages: &[ChatMessage]) -> String {
            self.seen.lock().unwrap().push(messages.to_vec());
            let user = &messages[1].content;
            self.rules
                .iter()
                .find(|(needle, _)| user.contains(needle.as_str()))
                .map(|(_, reply)| reply.clone())
                .unwrap_or_else(|| self.default_reply.clone())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn engine(
        model: Arc<ScriptedModel>,
        memory: Arc<LinearMemory>,
        settings: AnalysisConfig,
    ) -> AnalysisEngine {
        AnalysisEngine::new(model, memory, Arc::new(PromptSet::default()), settings)
    }

    #[test]
    fn test_needs_deeper_check_tokens() {
        assert!(needs_deeper_check("Possible buffer OVERFLOW in read()"));
        assert!(needs_deeper_check("a data race on counter"));
        assert!(needs_deeper_check("SQL Injection via format string"));
        assert!(needs_deeper_check("ERROR: model request timed out"));
        // Substring match, so "errors" and "traces" count too.
        assert!(needs_deeper_check("no errors"));
        assert!(needs_deeper_check("stack traces"));
        assert!(!needs_deeper_check("Looks fine."));
        assert!(!needs_deeper_check(""));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("жжжж", 2), "жж");
    }

    #[test]
    fn test_render_file_report() {
        let report = render_file_report(&["first".to_string(), "second".to_string()], "sum");
        assert_eq!(
            report,
            "### Block 1/2\n\nfirst\n\n### Block 2/2\n\nsecond\n\n### File summary\n\nsum"
        );
        assert!(!needs_deeper_check(&render_file_report(&["ok".to_string()], "fine")));
    }

    #[tokio::test]
    async fn analyze_file_persists_chunks_findings_and_summary() {
        let model = ScriptedModel::new(&[("Block findings:", "file is fine")], "block ok");
        let memory = Arc::new(LinearMemory::new());
        let settings = AnalysisConfig {
            chunk_size: 30,
            ..Default::default()
        };
        let engine = engine(Arc::clone(&model), Arc::clone(&memory), settings);

        let code = "def load(path):\n    pass\n\ndef save(path):\n    pass\n";
        let report = engine.analyze_file(Path::new("proj/io.py"), code, None).await;

        assert!(report.starts_with("### Block 1/2\n\nblock ok"));
        assert!(report.ends_with("### File summary\n\nfile is fine"));

        let code_hits = memory.query("def ", 10, Some(RecordKind::Code));
        let ids: Vec<&str> = code_hits.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["proj/io.py:0", "proj/io.py:1"]);
        assert_eq!(code_hits[0].language.as_deref(), Some("Python"));

        let blocks = memory.list_summaries(RecordKind::BlockSummary).unwrap();
        let scopes: Vec<&str> = blocks.iter().map(|r| r.scope.as_str()).collect();
        assert_eq!(scopes, vec!["proj/io.py:0", "proj/io.py:1"]);

        let files = memory.list_summaries(RecordKind::FileSummary).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].scope, "proj/io.py");
        assert_eq!(files[0].text, "file is fine");

        let prompts = model.user_messages();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("File: io.py\nLanguage: Python\nBlock 1 of 2"));
        assert!(prompts[0].contains("```python\ndef load(path):"));
    }

    #[tokio::test]
    async fn analyze_empty_file_makes_no_calls() {
        let model = ScriptedModel::new(&[], "unused");
        let memory = Arc::new(LinearMemory::new());
        let engine = engine(Arc::clone(&model), memory, AnalysisConfig::default());

        let report = engine.analyze_file(Path::new("empty.sql"), "", None).await;
        assert_eq!(report, EMPTY_FILE_REPORT);
        assert!(model.user_messages().is_empty());
    }

    #[tokio::test]
    async fn short_blocks_get_memory_context_from_other_files() {
        let model = ScriptedModel::new(&[], "ok");
        let memory = Arc::new(LinearMemory::new());
        memory
            .store_chunks(
                "proj/cache.py",
                "Python",
                &["def load_cache(path):\n    return open(path)".to_string()],
                RecordKind::Code,
            )
            .unwrap();
        memory
            .store_summary("proj/cache.py", "cache leaks file handles", RecordKind::FileSummary)
            .unwrap();
        let engine = engine(Arc::clone(&model), memory, AnalysisConfig::default());

        engine
            .analyze_file(
                Path::new("proj/main.py"),
                "def main():\n    load_cache('x')\n",
                None,
            )
            .await;

        let prompt = &model.user_messages()[0];
        assert!(prompt.contains("Findings from previously reviewed files:\n- [proj/cache.py] cache leaks file handles"));
        // "main" finds nothing elsewhere; the block's own chunk is excluded.
        assert!(!prompt.contains("Context from memory"));
    }

    #[tokio::test]
    async fn memory_query_falls_back_to_file_name() {
        let model = ScriptedModel::new(&[], "ok");
        let memory = Arc::new(LinearMemory::new());
        memory
            .store_chunks(
                "proj/other.sql",
                "SQL",
                &["-- see report.sql for the totals".to_string()],
                RecordKind::Code,
            )
            .unwrap();
        let engine = engine(Arc::clone(&model), memory, AnalysisConfig::default());

        engine
            .analyze_file(Path::new("proj/report.sql"), "SELECT 1;", None)
            .await;

        let prompt = &model.user_messages()[0];
        assert!(prompt.contains(
            "Context from memory (code fragments):\n- [proj/other.sql] -- see report.sql for the totals"
        ));
    }

    #[tokio::test]
    async fn long_blocks_skip_memory_unless_focused() {
        let model = ScriptedModel::new(&[], "ok");
        let memory = Arc::new(LinearMemory::new());
        memory
            .store_chunks(
                "proj/util.py",
                "Python",
                &["def helper(): pass".to_string()],
                RecordKind::Code,
            )
            .unwrap();
        let settings = AnalysisConfig {
            augment_threshold: 5,
            ..Default::default()
        };
        let engine = engine(Arc::clone(&model), memory, settings);
        let code = "def helper():\n    return 1\n";

        engine.analyze_file(Path::new("proj/a.py"), code, None).await;
        assert!(!model.user_messages()[0].contains("Context from memory"));

        engine
            .analyze_file(Path::new("proj/a.py"), code, Some(DEEP_DIVE_FOCUS))
            .await;
        let focused = &model.user_messages()[2];
        assert!(focused.contains(&format!("Additional focus: {}", DEEP_DIVE_FOCUS)));
        assert!(focused.contains("- [proj/util.py] def helper(): pass"));
    }

    #[tokio::test]
    async fn deep_dive_runs_once_when_triggered() {
        let model = ScriptedModel::new(&[("Additional focus:", "cause and fix")], "integer overflow");
        let memory = Arc::new(LinearMemory::new());
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("calc.py");
        std::fs::write(&path, "def add(a, b):\n    return a + b\n").unwrap();
        let engine = engine(Arc::clone(&model), memory, AnalysisConfig::default());

        let outcome = engine.run_file_actions(&path).await;

        assert!(outcome.deepened);
        let actions: Vec<ActionKind> = outcome.entries.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![ActionKind::PrimaryAnalysis, ActionKind::DeepDive]);
        assert!(outcome.report.contains("cause and fix"));
        // Two passes of one block plus one summary each.
        assert_eq!(model.user_messages().len(), 4);
    }

    #[tokio::test]
    async fn clean_result_is_not_deepened() {
        let model = ScriptedModel::new(&[], "looks fine");
        let memory = Arc::new(LinearMemory::new());
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.h");
        std::fs::write(&path, "int add(int a, int b);\n").unwrap();
        let engine = engine(Arc::clone(&model), memory, AnalysisConfig::default());

        let outcome = engine.run_file_actions(&path).await;

        assert!(!outcome.deepened);
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].action, ActionKind::PrimaryAnalysis);
        assert_eq!(model.user_messages().len(), 2);
    }

    #[tokio::test]
    async fn unreadable_file_short_circuits() {
        let model = ScriptedModel::new(&[], "unused");
        let memory = Arc::new(LinearMemory::new());
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.py");
        let engine = engine(Arc::clone(&model), memory, AnalysisConfig::default());

        let outcome = engine.run_file_actions(&path).await;

        assert!(outcome.report.starts_with("ERROR:"));
        assert_eq!(
            outcome.entries[0].to_string(),
            format!("{}: read_failed", path.display())
        );
        assert!(model.user_messages().is_empty());
    }

    #[tokio::test]
    async fn invalid_utf8_is_decoded_lossily() {
        let model = ScriptedModel::new(&[], "fine");
        let memory = Arc::new(LinearMemory::new());
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("latin1.sql");
        std::fs::write(&path, b"SELECT '\xe9t\xe9';\n").unwrap();
        let engine = engine(Arc::clone(&model), memory, AnalysisConfig::default());

        let outcome = engine.run_file_actions(&path).await;

        assert_eq!(outcome.entries[0].action, ActionKind::PrimaryAnalysis);
        assert!(model.user_messages()[0].contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn cross_file_context_uses_latest_summary_per_file() {
        let model = ScriptedModel::new(&[], "ok");
        let memory = Arc::new(LinearMemory::new());
        for (scope, text) in [
            ("old.sql", "old summary"),
            ("a.h", "a primary"),
            ("a.h", "a deep"),
            ("c.java", "c summary"),
        ] {
            memory
                .store_summary(scope, text, RecordKind::FileSummary)
                .unwrap();
        }
        let settings = AnalysisConfig {
            context_summaries: 2,
            ..Default::default()
        };
        let engine = engine(Arc::clone(&model), Arc::clone(&memory), settings);

        engine.analyze_file(Path::new("d.py"), "x = 1\n", None).await;

        let block_prompt = &model.user_messages()[0];
        assert!(block_prompt.contains("- [a.h] a deep"));
        assert!(block_prompt.contains("- [c.java] c summary"));
        assert!(!block_prompt.contains("a primary"));
        assert!(!block_prompt.contains("old summary"));
    }

    #[tokio::test]
    async fn project_summary_is_persisted() {
        let model = ScriptedModel::new(&[("Per-file findings:", "overall fine")], "unused");
        let memory = Arc::new(LinearMemory::new());
        memory
            .store_summary("a.py", "a ok", RecordKind::FileSummary)
            .unwrap();
        let engine = engine(Arc::clone(&model), Arc::clone(&memory), AnalysisConfig::default());

        let summaries = memory.list_summaries(RecordKind::FileSummary).unwrap();
        let summary = engine.summarize_project(&summaries).await;

        assert_eq!(summary, "overall fine");
        assert!(model.user_messages()[0].contains("### a.py\na ok"));
        let stored = memory.list_summaries(RecordKind::ProjectSummary).unwrap();
        assert_eq!(stored[0].text, "overall fine");
        assert!(engine.summarize_project(&[]).await.is_empty());
    }
}
