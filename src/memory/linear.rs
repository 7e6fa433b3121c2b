use std::sync::{Mutex, MutexGuard};

use crate::error::{ReviewError, Result};

use super::{chunk_record_id, summary_record_id, MemoryRecord, MemoryStore, RecordKind};

#[derive(Default)]
struct LinearState {
    records: Vec<MemoryRecord>,
    next_seq: u64,
}

/// In-process ordered list. Queries match by literal substring containment
/// and return hits in insertion order.
#[derive(Default)]
pub struct LinearMemory {
    state: Mutex<LinearState>,
}

impl LinearMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, LinearState>> {
        self.state
            .lock()
            .map_err(|_| ReviewError::Memory("linear memory lock poisoned".to_string()))
    }
}

impl MemoryStore for LinearMemory {
    fn backend_name(&self) -> &'static str {
        "linear"
    }

    fn store_chunks(
        &self,
        file_id: &str,
        language: &str,
        chunks: &[String],
        kind: RecordKind,
    ) -> Result<()> {
        let mut state = self.state()?;
        for (index, text) in chunks.iter().enumerate() {
            let id = chunk_record_id(file_id, index);
            // Re-analysing a file rewrites its chunks in place.
            if let Some(existing) = state.records.iter_mut().find(|r| r.id == id) {
                existing.text = text.clone();
                existing.language = Some(language.to_string());
                continue;
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.records.push(MemoryRecord {
                id,
                kind,
                scope: file_id.to_string(),
                language: Some(language.to_string()),
                chunk_index: Some(index),
                text: text.clone(),
                seq,
            });
        }
        Ok(())
    }

    fn store_summary(&self, scope: &str, text: &str, kind: RecordKind) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let mut state = self.state()?;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.records.push(MemoryRecord {
            id: summary_record_id(kind, scope, seq),
            kind,
            scope: scope.to_string(),
            language: None,
            chunk_index: None,
            text: text.to_string(),
            seq,
        });
        Ok(())
    }

    fn recent_summaries(&self, kind: RecordKind, limit: usize) -> Result<Vec<MemoryRecord>> {
        let state = self.state()?;
        let mut recent: Vec<MemoryRecord> = state
            .records
            .iter()
            .rev()
            .filter(|r| r.kind == kind)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    fn list_summaries(&self, kind: RecordKind) -> Result<Vec<MemoryRecord>> {
        let state = self.state()?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect())
    }

    fn query(&self, text: &str, top_k: usize, kind: Option<RecordKind>) -> Vec<MemoryRecord> {
        let Ok(state) = self.state() else {
            return Vec::new();
        };
        state
            .records
            .iter()
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .filter(|r| r.text.contains(text))
            .take(top_k)
            .cloned()
            .collect()
    }

    fn len(&self) -> Result<usize> {
        Ok(self.state()?.records.len())
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state()?;
        state.records.clear();
        Ok(())
    }
}
