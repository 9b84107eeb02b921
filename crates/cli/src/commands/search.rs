//! Search and related-article command handlers.

use super::print_json;
use clap::Args;
use kbase_core::{config::AppConfig, AppResult};
use kbase_knowledge::{KnowledgeService, SearchMode};

/// Search articles
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Maximum number of results
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Retrieval mode (text, semantic, hybrid)
    #[arg(long, default_value = "hybrid")]
    pub mode: SearchMode,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = KnowledgeService::open(config)?;
        let limit = self.limit.unwrap_or(service.config().default_limit);

        let response = service.search(&self.query, self.mode, limit).await;
        service.shutdown();
        let response = response?;

        if self.json {
            return print_json(&response);
        }

        if response.results.is_empty() {
            println!("No matching articles.");
            return Ok(());
        }

        for (i, hit) in response.results.iter().enumerate() {
            println!("{}. {} [{}] (score {:.3})", i + 1, hit.title, hit.id, hit.score);
            if let Some(summary) = &hit.summary {
                println!("   {}", summary);
            }
        }
        println!("\nQuery id: {}", response.query_id);

        Ok(())
    }
}

/// Show one article's metadata
#[derive(Args, Debug)]
pub struct ShowCommand {
    /// Article id
    pub article_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ShowCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = KnowledgeService::open(config)?;
        let details = service.article(&self.article_id);
        service.shutdown();
        let details = details?;

        if self.json {
            return print_json(&details);
        }

        println!("{} [{}]", details.title, details.id);
        if let Some(summary) = &details.summary {
            println!("  {}", summary);
        }
        println!("  Category:  {}", details.category.as_deref().unwrap_or("-"));
        if !details.tags.is_empty() {
            println!("  Tags:      {}", details.tags.join(", "));
        }
        println!("  Status:    {}", details.status.as_str());
        println!("  Read time: {} min", details.read_time_minutes);
        println!("  Views:     {}", details.view_count);
        println!("  Embedded:  {}", if details.embedded { "yes" } else { "no" });
        if details.machine_generated {
            println!("  Machine generated");
        }

        Ok(())
    }
}

/// Articles similar to a given one
#[derive(Args, Debug)]
pub struct RelatedCommand {
    /// Article id
    pub article_id: String,

    /// Maximum number of results
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RelatedCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = KnowledgeService::open(config)?;
        let limit = self.limit.unwrap_or(service.config().default_limit);

        let related = service.related(&self.article_id, limit);
        service.shutdown();
        let related = related?;

        if self.json {
            return print_json(&related);
        }

        if related.is_empty() {
            println!("No related articles.");
        }
        for article in &related {
            println!(
                "{} [{}] {} (similarity {:.3})",
                article.title,
                article.id,
                article.category.as_deref().unwrap_or("-"),
                article.similarity
            );
        }

        Ok(())
    }
}
