//! Short-term memory of code fragments and findings.
//!
//! Two back-ends share the [`MemoryStore`] contract: a SQLite structured
//! index with per-record embeddings ([`SqliteMemory`]) and an in-process
//! ordered list searched by substring ([`LinearMemory`]). The back-end is
//! picked once by [`open_memory`] and used for the whole run.

pub mod embedding;
pub mod linear;
pub mod sqlite;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ReviewError, Result};

pub use embedding::{Embedder, PlaceholderEmbedder};
pub use linear::LinearMemory;
pub use sqlite::SqliteMemory;

/// Discriminator carried by every memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Code,
    BlockSummary,
    FileSummary,
    ProjectSummary,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Code => "code",
            RecordKind::BlockSummary => "block_summary",
            RecordKind::FileSummary => "file_summary",
            RecordKind::ProjectSummary => "project_summary",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "code" => Ok(RecordKind::Code),
            "block_summary" => Ok(RecordKind::BlockSummary),
            "file_summary" => Ok(RecordKind::FileSummary),
            "project_summary" => Ok(RecordKind::ProjectSummary),
            other => Err(ReviewError::Memory(format!("unknown record kind '{}'", other))),
        }
    }
}

/// A stored chunk or finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// `{path}:{index}` for chunks, `{kind}:{scope}:{seq}` for findings.
    pub id: String,
    pub kind: RecordKind,
    /// File path for chunks; finding scope otherwise.
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    pub text: String,
    /// Store-wide insertion sequence; higher is more recent.
    pub seq: u64,
}

pub fn chunk_record_id(file_id: &str, index: usize) -> String {
    format!("{}:{}", file_id, index)
}

pub fn summary_record_id(kind: RecordKind, scope: &str, seq: u64) -> String {
    format!("{}:{}:{}", kind.as_str(), scope, seq)
}

/// Keeps only the newest record of each scope. `records` must be in
/// chronological order; the result stays chronological.
pub fn latest_per_scope(records: Vec<MemoryRecord>) -> Vec<MemoryRecord> {
    let mut newest: HashMap<String, u64> = HashMap::new();
    for record in &records {
        newest.insert(record.scope.clone(), record.seq);
    }
    records
        .into_iter()
        .filter(|r| newest.get(&r.scope) == Some(&r.seq))
        .collect()
}

pub trait MemoryStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Persists every chunk of a file under `{file_id}:{index}`.
    fn store_chunks(
        &self,
        file_id: &str,
        language: &str,
        chunks: &[String],
        kind: RecordKind,
    ) -> Result<()>;

    /// Appends a finding. Empty text is ignored.
    fn store_summary(&self, scope: &str, text: &str, kind: RecordKind) -> Result<()>;

    /// At most `limit` most recent findings of `kind`, oldest first.
    fn recent_summaries(&self, kind: RecordKind, limit: usize) -> Result<Vec<MemoryRecord>>;

    /// Every finding of `kind` in insertion order.
    fn list_summaries(&self, kind: RecordKind) -> Result<Vec<MemoryRecord>>;

    /// At most `top_k` relevant records. Back-end failures yield an empty list.
    fn query(&self, text: &str, top_k: usize, kind: Option<RecordKind>) -> Vec<MemoryRecord>;

    fn len(&self) -> Result<usize>;

    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    #[default]
    Sqlite,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub backend: MemoryBackend,
    /// Database file for the SQLite back-end; `None` keeps it in memory.
    pub path: Option<PathBuf>,
    /// Drop records left over from previous runs when the store is opened.
    pub reset_on_open: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::Sqlite,
            path: None,
            reset_on_open: true,
        }
    }
}

/// Builds the configured back-end, falling back to [`LinearMemory`] when the
/// structured index cannot be opened.
pub fn open_memory(config: &MemoryConfig) -> Arc<dyn MemoryStore> {
    match config.backend {
        MemoryBackend::Linear => {
            info!(backend = "linear", "Memory store ready");
            Arc::new(LinearMemory::new())
        }
        MemoryBackend::Sqlite => {
            let opened = match config.path.as_ref() {
                Some(path) => SqliteMemory::open(path),
                None => SqliteMemory::in_memory(),
            };
            let store = opened.and_then(|store| {
                if config.reset_on_open {
                    store.clear()?;
                }
                Ok(store)
            });
            match store {
                Ok(store) => {
                    info!(
                        backend = "sqlite",
                        path = ?config.path,
                        "Memory store ready"
                    );
                    Arc::new(store)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Structured memory unavailable, using linear fallback"
                    );
                    Arc::new(LinearMemory::new())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_kind_round_trip_through_str() {
        for kind in [
            RecordKind::Code,
            RecordKind::BlockSummary,
            RecordKind::FileSummary,
            RecordKind::ProjectSummary,
        ] {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
        assert!("summary".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_record_ids() {
        assert_eq!(chunk_record_id("src/a.py", 3), "src/a.py:3");
        assert_eq!(
            summary_record_id(RecordKind::FileSummary, "src/a.py", 7),
            "file_summary:src/a.py:7"
        );
    }

    #[test]
    fn test_latest_per_scope_drops_superseded_summaries() {
        let record = |scope: &str, text: &str, seq: u64| MemoryRecord {
            id: summary_record_id(RecordKind::FileSummary, scope, seq),
            kind: RecordKind::FileSummary,
            scope: scope.to_string(),
            language: None,
            chunk_index: None,
            text: text.to_string(),
            seq,
        };
        let records = vec![
            record("a.h", "a first", 1),
            record("b.py", "b primary", 2),
            record("b.py", "b deep", 3),
            record("a.h", "a again", 4),
            record("c.sql", "c", 5),
        ];

        let texts: Vec<String> = latest_per_scope(records)
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["b deep", "a again", "c"]);
        assert!(latest_per_scope(Vec::new()).is_empty());
    }

    #[test]
    fn test_open_memory_selects_backend() {
        let linear = open_memory(&MemoryConfig {
            backend: MemoryBackend::Linear,
            ..Default::default()
        });
        assert_eq!(linear.backend_name(), "linear");

        let sqlite = open_memory(&MemoryConfig::default());
        assert_eq!(sqlite.backend_name(), "sqlite");
    }

    #[test]
    fn test_open_memory_falls_back_when_sqlite_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        // A directory cannot be opened as a database file.
        let store = open_memory(&MemoryConfig {
            backend: MemoryBackend::Sqlite,
            path: Some(temp_dir.path().to_path_buf()),
            reset_on_open: true,
        });
        assert_eq!(store.backend_name(), "linear");
    }

    #[test]
    fn test_open_memory_reset_clears_previous_run() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.db");
        let config = MemoryConfig {
            backend: MemoryBackend::Sqlite,
            path: Some(path.clone()),
            reset_on_open: false,
        };

        let first = open_memory(&config);
        first
            .store_summary("a.py", "x", RecordKind::FileSummary)
            .unwrap();
        drop(first);

        let kept = open_memory(&config);
        assert_eq!(kept.list_summaries(RecordKind::FileSummary).unwrap().len(), 1);
        drop(kept);

        let reset = open_memory(&MemoryConfig {
            reset_on_open: true,
            ..config
        });
        assert!(reset.list_summaries(RecordKind::FileSummary).unwrap().is_empty());
    }
}
