//! Model-driven review of individual files and the planning loop around it.

pub mod engine;
pub mod planner;
pub mod prompts;

pub use engine::{needs_deeper_check, AnalysisEngine, FileOutcome, DEEP_DIVE_FOCUS, TRIGGER_TOKENS};
pub use planner::{ActionKind, ActionLog, ActionLogEntry, Plan, Planner};
pub use prompts::PromptSet;
