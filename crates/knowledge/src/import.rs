//! Markdown import and embedding backfill.
//!
//! Articles are Markdown files with optional YAML front matter:
//!
//! ```markdown
//! ---
//! id: kb-create-project
//! title: Creating a project
//! summary: Create a project from the dashboard
//! category: Getting Started
//! tags: [projects, onboarding]
//! status: published
//! ---
//! # Creating a project
//! ...
//! ```

use crate::embeddings::EmbeddingProvider;
use crate::store::{ArticleStore, UpsertOutcome};
use crate::types::{Article, ArticleStatus};
use kbase_core::{AppError, AppResult};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Counters for one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub files: usize,
    pub inserted: usize,
    /// Existing articles whose content changed (embedding dropped)
    pub changed: usize,
    pub unchanged: usize,
    /// Files that could not be read or parsed
    pub skipped: usize,
}

/// Counters for one backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillStats {
    pub embedded: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrontMatter {
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    status: Option<String>,
    #[serde(default)]
    machine_generated: bool,
}

/// Import every Markdown file under the given paths.
///
/// A file that fails to parse is skipped with a warning; the run goes on.
pub fn import_paths(store: &dyn ArticleStore, paths: &[impl AsRef<Path>]) -> AppResult<ImportStats> {
    let mut stats = ImportStats::default();

    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AppError::InvalidInput(format!(
                "Path does not exist: {:?}",
                path
            )));
        }

        for entry in WalkDir::new(path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let entry_path = entry.path();
            if !entry_path.is_file() || !is_markdown(entry_path) {
                continue;
            }

            stats.files += 1;

            let article = match read_article(entry_path) {
                Ok(article) => article,
                Err(e) => {
                    tracing::warn!(path = ?entry_path, error = %e, "Skipping article");
                    stats.skipped += 1;
                    continue;
                }
            };

            match store.upsert(&article)? {
                UpsertOutcome::Inserted => stats.inserted += 1,
                UpsertOutcome::Changed => stats.changed += 1,
                UpsertOutcome::Unchanged => stats.unchanged += 1,
            }

            tracing::debug!(id = %article.id, path = ?entry_path, "Imported article");
        }
    }

    tracing::info!(
        files = stats.files,
        inserted = stats.inserted,
        changed = stats.changed,
        unchanged = stats.unchanged,
        skipped = stats.skipped,
        "Import completed"
    );

    Ok(stats)
}

fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md") | Some("markdown")
    )
}

/// Read one Markdown file into an article.
pub fn read_article(path: &Path) -> AppResult<Article> {
    let raw = fs::read_to_string(path)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AppError::InvalidInput(format!("Invalid file name: {:?}", path)))?;
    parse_article(stem, &raw)
}

/// Parse Markdown with optional front matter. `fallback_id` is used when the
/// front matter names no id.
pub fn parse_article(fallback_id: &str, raw: &str) -> AppResult<Article> {
    let (front, body) = split_front_matter(raw)?;
    let body = body.trim();

    let id = front
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| fallback_id.to_string());

    let title = front
        .title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| first_heading(body))
        .unwrap_or_else(|| fallback_id.to_string());

    let status = match front.status {
        Some(status) => status.parse()?,
        None => ArticleStatus::default(),
    };

    let mut article = Article::new(id, title, body)
        .with_tags(front.tags.into_iter().filter(|t| !t.trim().is_empty()))
        .with_status(status);
    article.summary = front.summary.filter(|s| !s.trim().is_empty());
    article.category = front.category.filter(|c| !c.trim().is_empty());
    article.machine_generated = front.machine_generated;

    Ok(article)
}

fn split_front_matter(raw: &str) -> AppResult<(FrontMatter, &str)> {
    let rest = match raw.strip_prefix("---\n").or_else(|| raw.strip_prefix("---\r\n")) {
        Some(rest) => rest,
        None => return Ok((FrontMatter::default(), raw)),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let front: FrontMatter = if yaml.trim().is_empty() {
                FrontMatter::default()
            } else {
                serde_yaml::from_str(yaml).map_err(|e| {
                    AppError::InvalidInput(format!("Invalid front matter: {}", e))
                })?
            };
            return Ok((front, &rest[offset + line.len()..]));
        }
        offset += line.len();
    }

    Err(AppError::InvalidInput(
        "Front matter is not terminated".to_string(),
    ))
}

fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|heading| heading.trim().to_string())
        .filter(|heading| !heading.is_empty())
}

/// Embed articles that have no embedding (or every article with `all`).
///
/// Batches that fail are logged and counted; the run continues.
pub async fn backfill_embeddings(
    store: &dyn ArticleStore,
    embedder: &dyn EmbeddingProvider,
    batch_size: usize,
    all: bool,
) -> AppResult<BackfillStats> {
    let pending = if all {
        store.all()?
    } else {
        store.missing_embeddings()?
    };

    let mut stats = BackfillStats::default();
    if pending.is_empty() {
        tracing::info!("No articles need embeddings");
        return Ok(stats);
    }

    tracing::info!(
        articles = pending.len(),
        provider = embedder.provider_name(),
        model = embedder.model_name(),
        "Embedding articles"
    );

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(Article::embedding_text).collect();

        let vectors = match embedder.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == batch.len() => vectors,
            Ok(vectors) => {
                tracing::warn!(
                    expected = batch.len(),
                    received = vectors.len(),
                    "Embedding batch returned the wrong number of vectors"
                );
                stats.failed += batch.len();
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, batch = batch.len(), "Embedding batch failed");
                stats.failed += batch.len();
                continue;
            }
        };

        for (article, vector) in batch.iter().zip(vectors) {
            store.set_embedding(&article.id, &vector)?;
            stats.embedded += 1;
        }
    }

    tracing::info!(embedded = stats.embedded, failed = stats.failed, "Embedding completed");
    Ok(stats)
}
