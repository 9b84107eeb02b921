//! kbase CLI
//!
//! Main entry point for the kbase command-line tool.
//! Searches and answers questions over a local knowledge base, and serves
//! the same actions over HTTP.

mod commands;
mod server;

use clap::{Parser, Subcommand};
use commands::{
    AskCommand, CategorizeCommand, EmbedCommand, FeedbackCommand, ImportCommand, RelatedCommand,
    RequestCommand, SearchCommand, ServeCommand, ShowCommand, StatsCommand,
};
use kbase_core::{
    config::AppConfig,
    logging::{self, LogFormat},
    AppResult,
};
use std::path::PathBuf;

/// kbase - knowledge base search and grounded answers
#[derive(Parser, Debug)]
#[command(name = "kbase")]
#[command(about = "Knowledge base search and grounded answers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "KBASE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "KBASE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Generation provider
    #[arg(short, long, global = true, env = "KBASE_PROVIDER")]
    provider: Option<String>,

    /// Generation model identifier
    #[arg(short, long, global = true, env = "KBASE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search articles
    Search(SearchCommand),

    /// Ask a question answered from the knowledge base
    Ask(AskCommand),

    /// Articles similar to a given one
    Related(RelatedCommand),

    /// Show one article's metadata
    Show(ShowCommand),

    /// Suggest a category and tags for new content
    Categorize(CategorizeCommand),

    /// Import Markdown articles
    Import(ImportCommand),

    /// Compute missing article embeddings
    Embed(EmbedCommand),

    /// Rate an answer
    Feedback(FeedbackCommand),

    /// Dispatch a raw JSON request
    Request(RequestCommand),

    /// Show article and usage statistics
    Stats(StatsCommand),

    /// Serve the knowledge endpoint over HTTP
    Serve(ServeCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Search(_) => "search",
            Commands::Ask(_) => "ask",
            Commands::Related(_) => "related",
            Commands::Show(_) => "show",
            Commands::Categorize(_) => "categorize",
            Commands::Import(_) => "import",
            Commands::Embed(_) => "embed",
            Commands::Feedback(_) => "feedback",
            Commands::Request(_) => "request",
            Commands::Stats(_) => "stats",
            Commands::Serve(_) => "serve",
        }
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load()?.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    let format = match cli.command {
        Commands::Serve(_) => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    logging::init_logging(config.log_level.as_deref(), config.no_color, format)?;

    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.validate()?;

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Related(cmd) => cmd.execute(&config).await,
        Commands::Show(cmd) => cmd.execute(&config).await,
        Commands::Categorize(cmd) => cmd.execute(&config).await,
        Commands::Import(cmd) => cmd.execute(&config).await,
        Commands::Embed(cmd) => cmd.execute(&config).await,
        Commands::Feedback(cmd) => cmd.execute(&config).await,
        Commands::Request(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
        Commands::Serve(cmd) => cmd.execute(config).await,
    };

    match &result {
        Ok(_) => tracing::debug!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
