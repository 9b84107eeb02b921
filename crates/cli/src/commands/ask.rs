//! Ask and feedback command handlers.

use super::print_json;
use clap::Args;
use kbase_core::{config::AppConfig, AppError, AppResult};
use kbase_knowledge::KnowledgeService;
use std::path::PathBuf;

/// Ask a question answered from the knowledge base
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Answer without retrieving articles
    #[arg(long)]
    pub no_context: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let question = self.question_text()?;

        let service = KnowledgeService::open(config)?;
        let response = service.ask(&question, !self.no_context).await;
        service.shutdown();
        let response = response?;

        if self.json {
            return print_json(&response);
        }

        println!("{}", response.answer);

        if !response.referenced_articles.is_empty() {
            println!("\nSources:");
            for article in &response.referenced_articles {
                println!("  - {} [{}]", article.title, article.id);
            }
        }

        tracing::debug!(
            confidence = response.confidence,
            tokens = response.tokens,
            "Answer details"
        );
        println!("\nAnswer id: {}", response.answer_id);

        Ok(())
    }

    fn question_text(&self) -> AppResult<String> {
        if let Some(question) = &self.question {
            return Ok(question.clone());
        }

        if let Some(path) = &self.file {
            return std::fs::read_to_string(path).map_err(|e| {
                AppError::InvalidInput(format!("Failed to read question file {:?}: {}", path, e))
            });
        }

        Err(AppError::InvalidInput("question is required".to_string()))
    }
}

/// Rate an answer
#[derive(Args, Debug)]
pub struct FeedbackCommand {
    /// Answer id printed by `kbase ask`
    pub answer_id: String,

    /// Mark the answer as not helpful
    #[arg(long)]
    pub unhelpful: bool,
}

impl FeedbackCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = KnowledgeService::open(config)?;
        let result = service.feedback(&self.answer_id, !self.unhelpful).await;
        service.shutdown();
        let response = result?;

        println!(
            "Recorded answer {} as {}",
            response.answer_id,
            if response.helpful { "helpful" } else { "not helpful" }
        );
        Ok(())
    }
}
