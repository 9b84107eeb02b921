//! Persistence for query and answer records.

use crate::types::{AnswerRecord, Citation, QueryRecord, RankedHit, RecordSummary, SearchMode, TopQuery};
use chrono::{DateTime, Utc};
use kbase_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// Append-only store for served queries and answers.
///
/// Owned by the recorder thread, so implementations only need `Send`.
pub trait RecordStore: Send {
    fn append_query(&mut self, record: &QueryRecord) -> AppResult<()>;

    fn append_answer(&mut self, record: &AnswerRecord) -> AppResult<()>;

    /// Attach a helpfulness rating. `NotFound` for unknown ids.
    fn rate(&mut self, answer_id: &str, helpful: bool) -> AppResult<()>;

    /// Record which result was opened.
    ///
    /// `NotFound` for unknown queries; `InvalidInput` when the article was
    /// not among the query's results.
    fn click(&mut self, query_id: &str, article_id: &str) -> AppResult<()>;

    fn query(&self, id: &str) -> AppResult<Option<QueryRecord>>;

    fn answer(&self, id: &str) -> AppResult<Option<AnswerRecord>>;

    /// Totals and the `top_n` most frequent query texts.
    fn summary(&self, top_n: usize) -> AppResult<RecordSummary>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS query_records (
    id TEXT PRIMARY KEY,
    query TEXT NOT NULL,
    mode TEXT NOT NULL,
    results TEXT NOT NULL,
    clicked_article_id TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS answer_records (
    id TEXT PRIMARY KEY,
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    citations TEXT NOT NULL,
    tokens INTEGER NOT NULL,
    latency_ms INTEGER NOT NULL,
    confidence REAL NOT NULL,
    helpful INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_query_records_query ON query_records(query);
"#;

/// SQLite-backed record store.
pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("Failed to create record directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Storage(format!("Failed to open record store: {}", e)))?;

        tracing::debug!("Opened record store at {:?}", db_path);
        Self::init(conn)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Storage(format!("Failed to open in-memory store: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Storage(format!("Failed to create tables: {}", e)))?;
        Ok(Self { conn })
    }

    fn count(&self, sql: &str) -> AppResult<u64> {
        self.conn
            .query_row(sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| AppError::Storage(format!("Failed to count records: {}", e)))
    }
}

impl RecordStore for SqliteRecordStore {
    fn append_query(&mut self, record: &QueryRecord) -> AppResult<()> {
        self.conn
            .execute(
                "INSERT INTO query_records (id, query, mode, results, clicked_article_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.query,
                    record.mode.as_str(),
                    serde_json::to_string(&record.results)?,
                    record.clicked_article_id,
                    record.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| AppError::Storage(format!("Failed to append query record: {}", e)))?;
        Ok(())
    }

    fn append_answer(&mut self, record: &AnswerRecord) -> AppResult<()> {
        self.conn
            .execute(
                "INSERT INTO answer_records (id, question, answer, citations, tokens, latency_ms,
                                             confidence, helpful, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.question,
                    record.answer,
                    serde_json::to_string(&record.citations)?,
                    record.tokens,
                    record.latency_ms as i64,
                    record.confidence as f64,
                    record.helpful,
                    record.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| AppError::Storage(format!("Failed to append answer record: {}", e)))?;
        Ok(())
    }

    fn rate(&mut self, answer_id: &str, helpful: bool) -> AppResult<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE answer_records SET helpful = ?1 WHERE id = ?2",
                params![helpful, answer_id],
            )
            .map_err(|e| AppError::Storage(format!("Failed to rate answer: {}", e)))?;

        if updated == 0 {
            return Err(AppError::NotFound(format!("answer {} not found", answer_id)));
        }
        Ok(())
    }

    fn click(&mut self, query_id: &str, article_id: &str) -> AppResult<()> {
        let record = self
            .query(query_id)?
            .ok_or_else(|| AppError::NotFound(format!("query {} not found", query_id)))?;

        if !record.results.iter().any(|hit| hit.article_id == article_id) {
            return Err(AppError::InvalidInput(format!(
                "article {} was not a result of query {}",
                article_id, query_id
            )));
        }

        self.conn
            .execute(
                "UPDATE query_records SET clicked_article_id = ?1 WHERE id = ?2",
                params![article_id, query_id],
            )
            .map_err(|e| AppError::Storage(format!("Failed to record click: {}", e)))?;
        Ok(())
    }

    fn query(&self, id: &str) -> AppResult<Option<QueryRecord>> {
        self.conn
            .query_row(
                "SELECT id, query, mode, results, clicked_article_id, created_at
                 FROM query_records WHERE id = ?1",
                params![id],
                row_to_query,
            )
            .optional()
            .map_err(|e| AppError::Storage(format!("Failed to load query record: {}", e)))
    }

    fn answer(&self, id: &str) -> AppResult<Option<AnswerRecord>> {
        self.conn
            .query_row(
                "SELECT id, question, answer, citations, tokens, latency_ms, confidence, helpful, created_at
                 FROM answer_records WHERE id = ?1",
                params![id],
                row_to_answer,
            )
            .optional()
            .map_err(|e| AppError::Storage(format!("Failed to load answer record: {}", e)))
    }

    fn summary(&self, top_n: usize) -> AppResult<RecordSummary> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT query, COUNT(*) AS n FROM query_records
                 GROUP BY query ORDER BY n DESC, query ASC LIMIT ?1",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let top_queries = stmt
            .query_map(params![top_n as i64], |row| {
                Ok(TopQuery {
                    query: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| AppError::Storage(format!("Failed to read top queries: {}", e)))?;

        Ok(RecordSummary {
            total_queries: self.count("SELECT COUNT(*) FROM query_records")?,
            clicked_queries: self
                .count("SELECT COUNT(*) FROM query_records WHERE clicked_article_id IS NOT NULL")?,
            total_answers: self.count("SELECT COUNT(*) FROM answer_records")?,
            rated_answers: self.count("SELECT COUNT(*) FROM answer_records WHERE helpful IS NOT NULL")?,
            helpful_answers: self.count("SELECT COUNT(*) FROM answer_records WHERE helpful = 1")?,
            top_queries,
        })
    }
}

fn row_to_query(row: &Row<'_>) -> rusqlite::Result<QueryRecord> {
    let mode: String = row.get(2)?;
    let results: String = row.get(3)?;

    Ok(QueryRecord {
        id: row.get(0)?,
        query: row.get(1)?,
        mode: mode.parse::<SearchMode>().map_err(|e| conversion_error(2, e))?,
        results: serde_json::from_str::<Vec<RankedHit>>(&results).map_err(|e| conversion_error(3, e))?,
        clicked_article_id: row.get(4)?,
        created_at: parse_timestamp(row, 5)?,
    })
}

fn row_to_answer(row: &Row<'_>) -> rusqlite::Result<AnswerRecord> {
    let citations: String = row.get(3)?;

    Ok(AnswerRecord {
        id: row.get(0)?,
        question: row.get(1)?,
        answer: row.get(2)?,
        citations: serde_json::from_str::<Vec<Citation>>(&citations)
            .map_err(|e| conversion_error(3, e))?,
        tokens: row.get(4)?,
        latency_ms: row.get::<_, i64>(5)? as u64,
        confidence: row.get::<_, f64>(6)? as f32,
        helpful: row.get(7)?,
        created_at: parse_timestamp(row, 8)?,
    })
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}
