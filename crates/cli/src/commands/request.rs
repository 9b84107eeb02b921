//! Raw request command handler.
//!
//! Dispatches a JSON body exactly as the HTTP endpoint would, with a local
//! session.

use clap::Args;
use kbase_core::{config::AppConfig, AppResult};
use kbase_knowledge::{KnowledgeService, Session};
use std::io::Read;

/// Dispatch a raw JSON request
#[derive(Args, Debug)]
pub struct RequestCommand {
    /// Request body (read from stdin when omitted)
    pub body: Option<String>,
}

impl RequestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let body = match &self.body {
            Some(body) => body.clone(),
            None => {
                let mut body = String::new();
                std::io::stdin().read_to_string(&mut body)?;
                body
            }
        };

        let service = KnowledgeService::open(config)?;
        let result = service.handle(Some(&Session::local()), &body).await;
        service.shutdown();

        match result {
            Ok(response) => {
                println!("{}", serde_json::to_string_pretty(&response)?);
                Ok(())
            }
            Err(e) => {
                println!("{}", serde_json::to_string_pretty(&e.to_body())?);
                Err(e)
            }
        }
    }
}
