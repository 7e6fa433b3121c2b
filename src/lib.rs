pub mod analysis;
pub mod config;
pub mod error;
pub mod languages;
pub mod memory;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod source;

pub use analysis::{
    needs_deeper_check, ActionKind, ActionLog, ActionLogEntry, AnalysisEngine, FileOutcome, Plan,
    Planner, PromptSet,
};
pub use config::{AnalysisConfig, ProviderConfig, ReviewConfig};
pub use error::{ReviewError, Result};
pub use languages::{Language, LanguageRegistry};
pub use memory::{
    latest_per_scope, open_memory, LinearMemory, MemoryBackend, MemoryConfig, MemoryRecord,
    MemoryStore, RecordKind, SqliteMemory,
};
pub use model::{ChatCompletionsClient, ChatMessage, ModelCaller, ModelClientConfig, Provider, Role};
pub use orchestrator::{Orchestrator, RunOutcome, RunProgress};
pub use source::{chunk, FileWalker, ProjectSource, SourceFile};
