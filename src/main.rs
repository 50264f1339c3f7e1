//! answer-engine: budgeted web retrieval with ranked, cited answers
//!
//! Command-line entry point. Runs one query through the pipeline and prints
//! the response as JSON.

use answer_engine::{
    config,
    query::RecencyWindow,
    search::{SearchPipeline, SearchRequest},
};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    name = "answer-engine",
    version,
    about = "Search the web, rank the results and optionally synthesize a cited answer"
)]
struct Cli {
    /// Settings file (defaults to settings.yml lookup)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only return results from this window: day, week, month or year
    #[arg(short, long)]
    recency: Option<RecencyWindow>,

    /// Number of ranked results to return
    #[arg(short = 'n', long)]
    max_results: Option<usize>,

    /// Synthesize an answer with inline citations
    #[arg(short, long)]
    synthesize: bool,

    /// Earlier conversation turns to condition on
    #[arg(long)]
    context: Option<String>,

    /// Overall budget for the run in milliseconds
    #[arg(long)]
    budget_ms: Option<u64>,

    /// Query text
    #[arg(required = true)]
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting answer-engine v{}", answer_engine::VERSION);

    let settings = config::load(cli.config.as_deref())?;
    info!("Instance: {}", settings.general.instance_name);
    let pipeline = SearchPipeline::from_settings(&settings)?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            on_ctrl_c.cancel();
        }
    });

    let mut request = SearchRequest::new(cli.query.join(" ")).with_cancel(cancel);
    request.recency = cli.recency;
    request.max_results = cli.max_results;
    request.synthesize = cli.synthesize;
    request.context = cli.context;
    request.budget = cli.budget_ms.map(Duration::from_millis);

    let response = pipeline.search(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    let report = pipeline.shutdown().await;
    if !report.drained() {
        warn!("{} requests still in flight at shutdown", report.outstanding);
    }

    Ok(())
}
