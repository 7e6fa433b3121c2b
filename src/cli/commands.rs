use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tracing::info;

use review_agent::config::ReviewConfig;
use review_agent::error::{ReviewError, Result};
use review_agent::languages::LanguageRegistry;
use review_agent::memory::{open_memory, MemoryBackend, MemoryRecord, MemoryStore, RecordKind, SqliteMemory};
use review_agent::model::{ChatCompletionsClient, ModelCaller, Provider};
use review_agent::orchestrator::{Orchestrator, RunProgress};
use review_agent::report;
use review_agent::source::{FileWalker, ProjectSource};

#[derive(Parser)]
#[command(name = "review-agent")]
#[command(about = "LLM-driven code review with planning and short-term code memory")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Review the project placed in ./sandbox with a local KoboldCpp server
    review-agent run

    # Clone and review a repository with Groq
    review-agent run https://github.com/user/repo.git --provider groq

    # Keep memory between runs and inspect it afterwards
    review-agent run ./project --memory-db .review-memory.db --keep-memory
    review-agent memory --db .review-memory.db dump --kind file_summary

    # List the files a run would review
    review-agent files ./project
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Review a project and write a markdown report
    Run(RunArgs),

    /// List the files a review would analyse, in order
    Files {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Inspect a persistent memory database
    Memory {
        /// Path to the memory database
        #[arg(long, default_value = ".review-memory.db")]
        db: PathBuf,

        #[command(subcommand)]
        command: MemoryCommands,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Git URL (http/https) or local project directory
    #[arg(default_value = "sandbox")]
    pub source: String,

    /// Where to save the markdown report
    #[arg(short, long, default_value = "analysis_report.md")]
    pub output: PathBuf,

    /// Model provider (openai, groq, gigachat, kobold)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model name understood by the provider
    #[arg(long)]
    pub model: Option<String>,

    /// Override the provider endpoint
    #[arg(long)]
    pub endpoint: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Store memory in this SQLite file instead of in memory
    #[arg(long)]
    pub memory_db: Option<PathBuf>,

    /// Keep records left in the memory database by earlier runs
    #[arg(long)]
    pub keep_memory: bool,

    /// Use the linear substring memory instead of SQLite
    #[arg(long, conflicts_with = "memory_db")]
    pub linear_memory: bool,

    /// Directory with prompt overrides (python.txt, plan.txt, ...)
    #[arg(long)]
    pub prompt_dir: Option<PathBuf>,

    /// Do not print the report or show progress
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// Print stored records
    Dump {
        /// Only records of this kind (code, block_summary, file_summary, project_summary)
        #[arg(long)]
        kind: Option<String>,

        /// Show at most this many of the most recent records per kind
        #[arg(long, default_value = "50")]
        limit: usize,

        /// Output JSON lines instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run a memory query the way the analysis engine does
    Query {
        /// Query text
        text: String,

        /// Only records of this kind
        #[arg(long)]
        kind: Option<String>,

        /// Maximum number of results
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
}

/// Merges the configuration file with command-line overrides.
pub fn resolve_config(args: &RunArgs) -> Result<ReviewConfig> {
    let mut config = match args.config.as_deref() {
        Some(path) => ReviewConfig::from_file(path)?,
        None => ReviewConfig::default(),
    };

    if let Some(provider) = args.provider.as_deref() {
        config.provider.name = provider.parse::<Provider>()?;
    }
    if let Some(model) = args.model.as_ref() {
        config.provider.model = Some(model.clone());
    }
    if let Some(endpoint) = args.endpoint.as_ref() {
        config.provider.endpoint = Some(endpoint.clone());
    }
    if let Some(db) = args.memory_db.as_ref() {
        config.memory.backend = MemoryBackend::Sqlite;
        config.memory.path = Some(db.clone());
    }
    if args.keep_memory {
        config.memory.reset_on_open = false;
    }
    if args.linear_memory {
        config.memory.backend = MemoryBackend::Linear;
    }
    if let Some(dir) = args.prompt_dir.as_ref() {
        config.analysis.prompt_dir = Some(dir.clone());
    }

    Ok(config)
}

pub async fn run_review(args: &RunArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let client = ChatCompletionsClient::new(config.model_client_config()?)?;
    info!(
        provider = %client.config().provider,
        model = %client.model_name(),
        "Model client ready"
    );
    let model: Arc<dyn ModelCaller> = Arc::new(client);

    let source = ProjectSource::acquire(&args.source, &config.analysis.sandbox_dir)?;
    let memory = open_memory(&config.memory);
    let progress = RunProgress::new();
    let orchestrator = Orchestrator::new(model, memory, config.analysis.clone())
        .with_progress(progress.clone());

    let spinner = (!args.quiet).then(|| spawn_spinner(progress));
    let outcome = orchestrator.run(source.path()).await;
    if let Some((bar, ticker)) = spinner {
        ticker.abort();
        bar.finish_and_clear();
    }

    // Release the clone even when the run failed.
    let released = source.release();
    let outcome = outcome?;
    released?;

    let document = report::render_outcome(&outcome);
    report::persist(&document, &args.output)?;
    if !args.quiet {
        report::display(&document)?;
    }
    eprintln!("Report saved to {}", args.output.display());
    Ok(())
}

fn spawn_spinner(progress: RunProgress) -> (ProgressBar, JoinHandle<()>) {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{elapsed}] {msg}") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message("planning");

    let ticker_bar = bar.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(250));
        loop {
            interval.tick().await;
            let snap = progress.snapshot();
            let message = match snap.current_file {
                Some(file) => format!(
                    "[{}/{}] {} ({} deep dives)",
                    snap.files_processed, snap.files_total, file, snap.deep_dives
                ),
                None if snap.files_total > 0 && snap.files_processed == snap.files_total => {
                    "summarizing".to_string()
                }
                None => "planning".to_string(),
            };
            ticker_bar.set_message(message);
        }
    });
    (bar, ticker)
}

pub fn list_files(path: &Path) -> Result<()> {
    let registry = LanguageRegistry::new();
    let files = FileWalker::new(registry.clone()).walk(path)?;

    if files.is_empty() {
        println!("No supported files under {}", path.display());
        return Ok(());
    }

    for file in &files {
        println!("{} ({})", file.display(), registry.detect(file));
    }
    println!("\n{} files", files.len());
    Ok(())
}

fn open_existing(db: &Path) -> Result<SqliteMemory> {
    if !db.is_file() {
        return Err(ReviewError::Config(format!(
            "memory database '{}' does not exist",
            db.display()
        )));
    }
    SqliteMemory::open(db)
}

fn parse_kind(kind: Option<&str>) -> Result<Option<RecordKind>> {
    kind.map(str::parse::<RecordKind>).transpose()
}

pub fn memory_dump(db: &Path, kind: Option<&str>, limit: usize, json: bool) -> Result<()> {
    let store = open_existing(db)?;
    let kinds = match parse_kind(kind)? {
        Some(kind) => vec![kind],
        None => vec![
            RecordKind::Code,
            RecordKind::BlockSummary,
            RecordKind::FileSummary,
            RecordKind::ProjectSummary,
        ],
    };

    let mut printed = 0;
    for kind in kinds {
        for record in store.recent_summaries(kind, limit)? {
            print_record(&record, json)?;
            printed += 1;
        }
    }
    if printed == 0 && !json {
        println!("No records in {}", db.display());
    }
    Ok(())
}

pub fn memory_query(db: &Path, text: &str, kind: Option<&str>, top_k: usize) -> Result<()> {
    let store = open_existing(db)?;
    let records = store.query(text, top_k, parse_kind(kind)?);

    if records.is_empty() {
        println!("No records found for query: {}", text);
        return Ok(());
    }
    for record in &records {
        print_record(record, false)?;
    }
    Ok(())
}

fn print_record(record: &MemoryRecord, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(record)
            .map_err(|e| ReviewError::Memory(format!("failed to encode record: {}", e)))?;
        println!("{}", line);
        return Ok(());
    }
    let first_line = record.text.lines().next().unwrap_or_default();
    let preview: String = first_line.chars().take(120).collect();
    println!("[{}] {} {} - {}", record.seq, record.kind, record.id, preview);
    Ok(())
}
