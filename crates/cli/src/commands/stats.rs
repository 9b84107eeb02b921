//! Stats command handler.
//!
//! Shows article counts and recorded usage.

use super::print_json;
use clap::Args;
use kbase_core::{config::AppConfig, AppResult};
use kbase_knowledge::KnowledgeService;

/// Show article and usage statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = KnowledgeService::open(config)?;
        let result = service.stats().await;
        service.shutdown();
        let stats = result?;

        if self.json {
            return print_json(&stats);
        }

        let articles = &stats.articles;
        let records = &stats.records;

        println!("Articles:  {} ({} published, {} embedded)", articles.total, articles.published, articles.embedded);
        println!("Queries:   {} ({} clicked)", records.total_queries, records.clicked_queries);
        println!(
            "Answers:   {} ({} rated, {} helpful)",
            records.total_answers, records.rated_answers, records.helpful_answers
        );

        if !records.top_queries.is_empty() {
            println!("\nTop queries:");
            for top in &records.top_queries {
                println!("  {:>4}  {}", top.count, top.query);
            }
        }

        Ok(())
    }
}
