//! Knowledge base maintenance commands.
//!
//! Imports Markdown articles, backfills embeddings and suggests categories.

use super::print_json;
use clap::Args;
use kbase_core::{config::AppConfig, AppError, AppResult};
use kbase_knowledge::{
    backfill_embeddings, import_paths, BackfillStats, ImportStats, KnowledgeService,
};
use std::path::PathBuf;

/// Import Markdown articles
#[derive(Args, Debug)]
pub struct ImportCommand {
    /// Files or directories to import
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Skip computing embeddings after the import
    #[arg(long)]
    pub no_embed: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ImportCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!(paths = ?self.paths, "Importing articles");

        let service = KnowledgeService::open(config)?;
        let result = self.run(&service).await;
        service.shutdown();
        let (imported, embedded) = result?;

        if self.json {
            let output = serde_json::json!({
                "files": imported.files,
                "inserted": imported.inserted,
                "changed": imported.changed,
                "unchanged": imported.unchanged,
                "skipped": imported.skipped,
                "embedded": embedded.map(|s| s.embedded),
                "embedFailed": embedded.map(|s| s.failed),
            });
            return print_json(&output);
        }

        println!(
            "Imported {} files: {} new, {} changed, {} unchanged, {} skipped",
            imported.files, imported.inserted, imported.changed, imported.unchanged, imported.skipped
        );
        if let Some(stats) = embedded {
            println!("Embedded {} articles ({} failed)", stats.embedded, stats.failed);
        }

        Ok(())
    }

    async fn run(
        &self,
        service: &KnowledgeService,
    ) -> AppResult<(ImportStats, Option<BackfillStats>)> {
        let imported = import_paths(service.store().as_ref(), self.paths.as_slice())?;

        if self.no_embed {
            return Ok((imported, None));
        }

        let embedded = backfill_embeddings(
            service.store().as_ref(),
            service.embedder().as_ref(),
            service.config().embedding.batch_size,
            false,
        )
        .await?;

        Ok((imported, Some(embedded)))
    }
}

/// Compute missing article embeddings
#[derive(Args, Debug)]
pub struct EmbedCommand {
    /// Re-embed every article, not only those without an embedding
    #[arg(long)]
    pub all: bool,
}

impl EmbedCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = KnowledgeService::open(config)?;
        let result = backfill_embeddings(
            service.store().as_ref(),
            service.embedder().as_ref(),
            service.config().embedding.batch_size,
            self.all,
        )
        .await;
        service.shutdown();
        let stats = result?;

        println!("Embedded {} articles ({} failed)", stats.embedded, stats.failed);
        Ok(())
    }
}

/// Suggest a category and tags for new content
#[derive(Args, Debug)]
pub struct CategorizeCommand {
    /// Article title
    #[arg(long)]
    pub title: String,

    /// Article content
    #[arg(long, conflicts_with = "file")]
    pub content: Option<String>,

    /// Read the content from a file
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CategorizeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let content = match (&self.content, &self.file) {
            (Some(content), _) => content.clone(),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                AppError::InvalidInput(format!("Failed to read content file {:?}: {}", path, e))
            })?,
            (None, None) => return Err(AppError::InvalidInput("content is required".to_string())),
        };

        let service = KnowledgeService::open(config)?;
        let result = service.categorize(&self.title, &content).await;
        service.shutdown();
        let classification = result?;

        if self.json {
            return print_json(&classification);
        }

        println!("Category: {}", classification.category);
        if !classification.tags.is_empty() {
            println!("Tags: {}", classification.tags.join(", "));
        }

        Ok(())
    }
}
