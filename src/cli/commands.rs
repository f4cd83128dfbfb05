//! CLI parser and command dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::blobstore::BlobStore;
use crate::broker::Broker;
use crate::config::Settings;
use crate::ingest::{AccessLogIngestor, StoreSink};
use crate::ocr::{check_tools, PageExtractor};
use crate::repository::SqliteStore;
use crate::summarizer::SummarizerClient;
use crate::workers::{self, Stage, WorkerContext};

/// Peek at argv for the verbose flag before clap runs, so logging can be
/// initialized first.
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Parser)]
#[command(name = "docloader")]
#[command(about = "Asynchronous document enrichment pipeline")]
#[command(version)]
pub struct Cli {
    /// Config file path (default: docloader.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pipeline stage workers
    Worker {
        /// Stage to run
        #[arg(value_enum, default_value = "all")]
        stage: StageArg,
    },

    /// Process pending access-log batch files once
    Ingest,

    /// Database utilities
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Check availability of the external OCR tools
    CheckTools,
}

/// Pipeline stage selection for `worker`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum StageArg {
    /// OCR stage worker
    Ocr,
    /// Summarization stage worker
    Summarize,
    /// Summary consumer
    Consumer,
    /// All stages in one process
    #[default]
    All,
}

#[derive(Subcommand)]
enum DbCommands {
    /// Create the database schema if missing
    Init,
}

/// Parse arguments and dispatch.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Worker { stage } => cmd_worker(&settings, stage).await,
        Commands::Ingest => cmd_ingest(&settings).await,
        Commands::Db {
            command: DbCommands::Init,
        } => cmd_db_init(&settings).await,
        Commands::CheckTools => cmd_check_tools(),
    }
}

async fn cmd_worker(settings: &Settings, stage: StageArg) -> anyhow::Result<()> {
    let stages = match stage {
        StageArg::Ocr => vec![Stage::Ocr],
        StageArg::Summarize => vec![Stage::Summarize],
        StageArg::Consumer => vec![Stage::Summary],
        StageArg::All => vec![Stage::Ocr, Stage::Summarize, Stage::Summary],
    };

    let store = SqliteStore::open(&settings.database.path)?;
    store.init_schema().await?;

    let broker = Broker::connect(&settings.broker.url, settings.broker.max_attempts).await?;

    let ctx = WorkerContext {
        settings: settings.clone(),
        broker: broker.clone(),
        store: Arc::new(store),
        blobs: Arc::new(BlobStore::new(&settings.blobstore)),
        extractor: Arc::new(PageExtractor::new(&settings.ocr)),
        summarizer: Arc::new(SummarizerClient::new(settings.summarizer.clone())),
    };

    // Ctrl+C stops taking new deliveries; in-flight handlers finish.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested, draining in-flight work");
                shutdown.cancel();
            }
        });
    }

    println!(
        "{} Workers running ({} stage{}). Press Ctrl+C to stop",
        style("→").cyan(),
        stages.len(),
        if stages.len() == 1 { "" } else { "s" }
    );

    workers::run_stages(ctx, &stages, shutdown).await?;
    broker.close().await;
    Ok(())
}

async fn cmd_ingest(settings: &Settings) -> anyhow::Result<()> {
    let store = SqliteStore::open(&settings.database.path)?;
    store.init_schema().await?;

    let sink = Arc::new(StoreSink::new(Arc::new(store)));
    let ingestor = AccessLogIngestor::new(&settings.ingest, sink);

    println!(
        "{} Processing batch files from {}",
        style("→").cyan(),
        settings.ingest.input_dir.display()
    );
    let report = ingestor.run_once().await?;
    println!(
        "  {} {} archived, {} errored",
        style("✓").green(),
        report.archived,
        report.errored
    );
    Ok(())
}

async fn cmd_db_init(settings: &Settings) -> anyhow::Result<()> {
    let store = SqliteStore::open(&settings.database.path)?;
    store.init_schema().await?;
    println!(
        "  {} Database ready at {}",
        style("✓").green(),
        settings.database.path.display()
    );
    Ok(())
}

fn cmd_check_tools() -> anyhow::Result<()> {
    for (tool, available) in check_tools() {
        if available {
            println!("  {} {}", style("✓").green(), tool);
        } else {
            println!(
                "  {} {} missing (install poppler-utils / tesseract-ocr)",
                style("✗").red(),
                tool
            );
        }
    }
    Ok(())
}
