//! Article storage.
//!
//! [`ArticleStore`] is the seam the retrieval pipelines read through;
//! [`SqliteArticleStore`] keeps articles and their embeddings in a single
//! SQLite table, embeddings as little-endian `f32` BLOBs.

use crate::types::{Article, ArticleStatus};
use chrono::{DateTime, Utc};
use kbase_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Content changed; any stored embedding was dropped
    Changed,
    /// Same content hash; only metadata may have changed
    Unchanged,
}

/// Article counts for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArticleCounts {
    pub total: u64,
    pub published: u64,
    pub embedded: u64,
}

/// Trait for article storage backends.
pub trait ArticleStore: Send + Sync {
    fn get(&self, id: &str) -> AppResult<Option<Article>>;

    /// Every article, drafts included, ordered by id.
    fn all(&self) -> AppResult<Vec<Article>>;

    /// Published articles, ordered by id.
    fn published(&self) -> AppResult<Vec<Article>>;

    /// Insert or update an article.
    ///
    /// An update that changes the content hash clears the stored embedding
    /// in the same statement, unless the incoming article carries one.
    fn upsert(&self, article: &Article) -> AppResult<UpsertOutcome>;

    /// Replace an article's embedding. `NotFound` for unknown ids.
    fn set_embedding(&self, id: &str, embedding: &[f32]) -> AppResult<()>;

    /// Articles that have no embedding yet.
    fn missing_embeddings(&self) -> AppResult<Vec<Article>>;

    /// Distinct non-empty categories, sorted.
    fn categories(&self) -> AppResult<Vec<String>>;

    /// Add one to an article's view count. `NotFound` for unknown ids.
    fn increment_views(&self, id: &str) -> AppResult<()>;

    fn counts(&self) -> AppResult<ArticleCounts>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    summary TEXT,
    category TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    embedding BLOB,
    view_count INTEGER NOT NULL DEFAULT 0,
    machine_generated INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'published',
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(status);
"#;

const COLUMNS: &str = "id, title, body, summary, category, tags, embedding, view_count, \
                       machine_generated, status, content_hash, created_at, updated_at";

/// SQLite-backed article store.
pub struct SqliteArticleStore {
    conn: Mutex<Connection>,
}

impl SqliteArticleStore {
    /// Open (and create if needed) the store at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("Failed to create store directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Storage(format!("Failed to open article store: {}", e)))?;

        tracing::debug!("Opened article store at {:?}", db_path);
        Self::init(conn)
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Storage(format!("Failed to open in-memory store: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Storage(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Storage("Article store lock poisoned".to_string()))
    }

    fn query_articles(&self, where_clause: &str) -> AppResult<Vec<Article>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM articles {} ORDER BY id", COLUMNS, where_clause);

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], row_to_article)
            .map_err(|e| AppError::Storage(format!("Failed to query articles: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to read article row: {}", e)))
    }
}

impl ArticleStore for SqliteArticleStore {
    fn get(&self, id: &str) -> AppResult<Option<Article>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM articles WHERE id = ?1", COLUMNS),
            params![id],
            row_to_article,
        )
        .optional()
        .map_err(|e| AppError::Storage(format!("Failed to load article {}: {}", id, e)))
    }

    fn all(&self) -> AppResult<Vec<Article>> {
        self.query_articles("")
    }

    fn published(&self) -> AppResult<Vec<Article>> {
        self.query_articles("WHERE status = 'published'")
    }

    fn upsert(&self, article: &Article) -> AppResult<UpsertOutcome> {
        let conn = self.lock()?;
        let content_hash = article.content_hash();

        let previous_hash: Option<String> = conn
            .query_row(
                "SELECT content_hash FROM articles WHERE id = ?1",
                params![article.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Storage(format!("Failed to read article hash: {}", e)))?;

        let tags = serde_json::to_string(&article.tags)?;
        let embedding = article.embedding.as_deref().map(embedding_to_bytes);

        conn.execute(
            "INSERT INTO articles (id, title, body, summary, category, tags, embedding, view_count,
                                   machine_generated, status, content_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 body = excluded.body,
                 summary = excluded.summary,
                 category = excluded.category,
                 tags = excluded.tags,
                 embedding = COALESCE(
                     excluded.embedding,
                     CASE WHEN articles.content_hash = excluded.content_hash
                          THEN articles.embedding END
                 ),
                 machine_generated = excluded.machine_generated,
                 status = excluded.status,
                 content_hash = excluded.content_hash,
                 updated_at = excluded.updated_at",
            params![
                article.id,
                article.title,
                article.body,
                article.summary,
                article.category,
                tags,
                embedding,
                article.view_count as i64,
                article.machine_generated,
                article.status.as_str(),
                content_hash,
                article.created_at.to_rfc3339(),
                article.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to upsert article {}: {}", article.id, e)))?;

        let outcome = match previous_hash {
            None => UpsertOutcome::Inserted,
            Some(previous) if previous == content_hash => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Changed,
        };

        tracing::debug!(article_id = %article.id, ?outcome, "Upserted article");
        Ok(outcome)
    }

    fn set_embedding(&self, id: &str, embedding: &[f32]) -> AppResult<()> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE articles SET embedding = ?1 WHERE id = ?2",
                params![embedding_to_bytes(embedding), id],
            )
            .map_err(|e| AppError::Storage(format!("Failed to store embedding: {}", e)))?;

        if updated == 0 {
            return Err(AppError::NotFound(format!("article {} not found", id)));
        }
        Ok(())
    }

    fn missing_embeddings(&self) -> AppResult<Vec<Article>> {
        self.query_articles("WHERE embedding IS NULL")
    }

    fn categories(&self) -> AppResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT category FROM articles
                 WHERE category IS NOT NULL AND TRIM(category) != ''
                 ORDER BY category",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| AppError::Storage(format!("Failed to query categories: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Storage(format!("Failed to read category: {}", e)))
    }

    fn increment_views(&self, id: &str) -> AppResult<()> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE articles SET view_count = view_count + 1 WHERE id = ?1",
                params![id],
            )
            .map_err(|e| AppError::Storage(format!("Failed to update view count: {}", e)))?;

        if updated == 0 {
            return Err(AppError::NotFound(format!("article {} not found", id)));
        }
        Ok(())
    }

    fn counts(&self) -> AppResult<ArticleCounts> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'published'), 0),
                    COALESCE(SUM(embedding IS NOT NULL), 0)
             FROM articles",
            [],
            |row| {
                Ok(ArticleCounts {
                    total: row.get::<_, i64>(0)? as u64,
                    published: row.get::<_, i64>(1)? as u64,
                    embedded: row.get::<_, i64>(2)? as u64,
                })
            },
        )
        .map_err(|e| AppError::Storage(format!("Failed to count articles: {}", e)))
    }
}

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<Article> {
    let tags_json: String = row.get(5)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| conversion_error(5, e))?;

    let embedding = row
        .get::<_, Option<Vec<u8>>>(6)?
        .map(|bytes| bytes_to_embedding(&bytes))
        .transpose()
        .map_err(|e| conversion_error(6, e))?;

    let status: String = row.get(9)?;
    let status = status
        .parse::<ArticleStatus>()
        .map_err(|e| conversion_error(9, e))?;

    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        summary: row.get(3)?,
        category: row.get(4)?,
        tags,
        embedding,
        view_count: row.get::<_, i64>(7)? as u64,
        machine_generated: row.get(8)?,
        status,
        created_at: parse_timestamp(row, 11)?,
        updated_at: parse_timestamp(row, 12)?,
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

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Storage(format!(
            "Invalid embedding length: {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
