use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::{ReviewError, Result};

use super::embedding::{cosine_similarity, decode_vector, encode_vector};
use super::{
    chunk_record_id, summary_record_id, Embedder, MemoryRecord, MemoryStore,
    PlaceholderEmbedder, RecordKind,
};

const RECORD_COLUMNS: &str = "id, kind, scope, language, chunk_index, text, seq";

/// Structured memory index backed by SQLite. Each record carries an
/// embedding; queries rank by cosine similarity to the query embedding.
pub struct SqliteMemory {
    conn: Mutex<Connection>,
    embedder: Box<dyn Embedder>,
    next_seq: AtomicU64,
}

struct RawRecord {
    id: String,
    kind: String,
    scope: String,
    language: Option<String>,
    chunk_index: Option<i64>,
    text: String,
    seq: i64,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            scope: row.get(2)?,
            language: row.get(3)?,
            chunk_index: row.get(4)?,
            text: row.get(5)?,
            seq: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<MemoryRecord> {
        Ok(MemoryRecord {
            id: self.id,
            kind: self.kind.parse()?,
            scope: self.scope,
            language: self.language,
            chunk_index: self.chunk_index.map(|i| i as usize),
            text: self.text,
            seq: self.seq as u64,
        })
    }
}

impl SqliteMemory {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::configure_pragmas(&conn)?;
        Self::init_schema(&conn)?;
        let max_seq: Option<i64> = conn
            .query_row("SELECT MAX(seq) FROM memory_records", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .optional()?
            .flatten();
        Ok(Self {
            conn: Mutex::new(conn),
            embedder: Box::new(PlaceholderEmbedder),
            next_seq: AtomicU64::new(max_seq.map_or(0, |s| s as u64 + 1)),
        })
    }

    /// Replaces the embedding function used for new records and queries.
    pub fn with_embedder(mut self, embedder: Box<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;
        Ok(())
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS memory_records (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                scope TEXT NOT NULL,
                language TEXT,
                chunk_index INTEGER,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                seq INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_memory_kind_seq ON memory_records(kind, seq);
            CREATE INDEX IF NOT EXISTS idx_memory_scope ON memory_records(scope);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ReviewError::Memory("sqlite memory lock poisoned".to_string()))
    }

    fn take_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn ranked_query(
        &self,
        text: &str,
        top_k: usize,
        kind: Option<RecordKind>,
    ) -> Result<Vec<MemoryRecord>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(text);
        let conn = self.conn()?;

        let sql = match kind {
            Some(_) => format!(
                "SELECT {}, embedding FROM memory_records WHERE kind = ?1 ORDER BY seq",
                RECORD_COLUMNS
            ),
            None => format!(
                "SELECT {}, embedding FROM memory_records ORDER BY seq",
                RECORD_COLUMNS
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(RawRecord, Vec<u8>)> {
            Ok((RawRecord::from_row(row)?, row.get(7)?))
        };
        let rows = match kind {
            Some(k) => stmt
                .query_map(params![k.as_str()], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map([], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };

        let mut scored = Vec::with_capacity(rows.len());
        for (raw, blob) in rows {
            let score = cosine_similarity(&query_vector, &decode_vector(&blob));
            scored.push((score, raw.into_record()?));
        }
        // Stable sort keeps seq order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(top_k).map(|(_, r)| r).collect())
    }
}

impl MemoryStore for SqliteMemory {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn store_chunks(
        &self,
        file_id: &str,
        language: &str,
        chunks: &[String],
        kind: RecordKind,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for (index, text) in chunks.iter().enumerate() {
            let embedding = encode_vector(&self.embedder.embed(text));
            tx.execute(
                r#"
                INSERT INTO memory_records
                    (id, kind, scope, language, chunk_index, text, embedding, seq)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO UPDATE SET
                    language = excluded.language,
                    text = excluded.text,
                    embedding = excluded.embedding
                "#,
                params![
                    chunk_record_id(file_id, index),
                    kind.as_str(),
                    file_id,
                    language,
                    index as i64,
                    text,
                    embedding,
                    self.take_seq() as i64,
                ],
            )?;
        }
        tx.commit()?;
        debug!(file = file_id, chunks = chunks.len(), "Stored code chunks");
        Ok(())
    }

    fn store_summary(&self, scope: &str, text: &str, kind: RecordKind) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let seq = self.take_seq();
        let embedding = encode_vector(&self.embedder.embed(text));
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO memory_records (id, kind, scope, text, embedding, seq)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                summary_record_id(kind, scope, seq),
                kind.as_str(),
                scope,
                text,
                embedding,
                seq as i64,
            ],
        )?;
        Ok(())
    }

    fn recent_summaries(&self, kind: RecordKind, limit: usize) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM memory_records WHERE kind = ?1 ORDER BY seq DESC LIMIT ?2",
            RECORD_COLUMNS
        ))?;
        let raw = stmt
            .query_map(params![kind.as_str(), limit as i64], RawRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut records = raw
            .into_iter()
            .map(RawRecord::into_record)
            .collect::<Result<Vec<_>>>()?;
        records.reverse();
        Ok(records)
    }

    fn list_summaries(&self, kind: RecordKind) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM memory_records WHERE kind = ?1 ORDER BY seq",
            RECORD_COLUMNS
        ))?;
        let raw = stmt
            .query_map(params![kind.as_str()], RawRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(RawRecord::into_record).collect()
    }

    fn query(&self, text: &str, top_k: usize, kind: Option<RecordKind>) -> Vec<MemoryRecord> {
        match self.ranked_query(text, top_k, kind) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Memory query failed");
                Vec::new()
            }
        }
    }

    fn len(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memory_records", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM memory_records", [])?;
        Ok(())
    }
}
