//! Serve command handler.

use crate::server;
use clap::Args;
use kbase_core::{config::AppConfig, AppError, AppResult};
use kbase_knowledge::KnowledgeService;
use std::sync::Arc;

/// Serve the knowledge endpoint over HTTP
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Listen address (overrides server.addr)
    #[arg(long, env = "KBASE_ADDR")]
    pub addr: Option<String>,
}

impl ServeCommand {
    pub async fn execute(&self, mut config: AppConfig) -> AppResult<()> {
        if let Some(addr) = &self.addr {
            config.server_addr = addr.clone();
        }

        let service = Arc::new(KnowledgeService::open(&config)?);
        let result = server::start_server(service.clone(), config).await;
        service.shutdown();

        result.map_err(|e| AppError::Other(format!("{:#}", e)))
    }
}
