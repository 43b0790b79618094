// Tracks recent arXiv papers per research domain, analyzes them with an LLM
// and keeps one deduplicated record per day.

// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use paper_tracker::analysis::Analyzer;
use paper_tracker::arxiv::ArxivClient;
use paper_tracker::config::{Config, DEFAULT_CONFIG_PATH};
use paper_tracker::fetch::DomainOutcome;
use paper_tracker::llm::LlmBackend;
use paper_tracker::pipeline::Pipeline;
use paper_tracker::store::DailyStore;
use paper_tracker::web;

// CL arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Daily arXiv paper tracker with AI analysis", long_about = None)]
struct Args {
    /// Path to the JSON configuration
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch recent papers, analyze them and save today's record
    FetchAndAnalyze {
        /// Lookback window in days, overrides the config
        #[arg(short, long)]
        days: Option<u32>,

        /// Fetch only, no analysis and nothing saved
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Print the effective configuration
    ShowConfig,

    /// Serve the generated site and the daily records locally
    Serve {
        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        #[arg(short, long, default_value = "docs")]
        output: PathBuf,
    },
}

fn banner(title: &str) {
    println!("{}", "=".repeat(60));
    println!("   {}", title);
    println!("{}", "=".repeat(60));
}

async fn fetch_and_analyze(config: Config, days: Option<u32>, dry_run: bool) -> Result<()> {
    // Credentials are checked before anything touches the network.
    let backend = if dry_run {
        None
    } else {
        Some(LlmBackend::from_config(&config.llm).context("cannot build LLM backend")?)
    };

    let days = days.unwrap_or(config.fetch.days_back);
    let min_score = config.fetch.min_relevance_score;
    let client = ArxivClient::new(config.fetch.request_delay())
        .context("cannot build arXiv client")?;
    let pipeline = Pipeline::new(config, Arc::new(client));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nInterrupted, finishing current step...");
            ctrl_c.cancel();
        }
    });

    banner("Paper Tracker");
    println!("\nDomains: {}", pipeline.config().domains.len());
    println!("Lookback: {} day(s)", days);
    println!("Min score: {}", min_score);
    println!(
        "LLM: {}",
        match &backend {
            Some(_) => format!(
                "{} ({})",
                pipeline.config().llm.provider.as_str(),
                pipeline.config().llm.model
            ),
            None => "disabled (--dry-run)".to_string(),
        }
    );
    println!();

    let aggregation = pipeline.fetch_by_domain(days, &cancel).await;
    for batch in &aggregation.batches {
        let note = match &batch.outcome {
            DomainOutcome::Complete => String::new(),
            DomainOutcome::RetriesExhausted => " (rate limited, partial)".to_string(),
            DomainOutcome::Failed(reason) => format!(" (failed: {})", reason),
            DomainOutcome::Cancelled => " (cancelled)".to_string(),
        };
        println!("  {:<30} {:>4} papers{}", batch.name, batch.papers.len(), note);
    }
    let total = aggregation.total();
    let papers = aggregation.into_recent();
    println!("\nFound {} papers, {} unique\n", total, papers.len());

    let Some(backend) = backend else {
        for paper in &papers {
            println!("  [{}] {}", paper.arxiv_id, paper.title);
        }
        return Ok(());
    };

    if papers.is_empty() || cancel.is_cancelled() {
        println!("Nothing to analyze");
        return Ok(());
    }

    let analyzer = Analyzer::new(backend, pipeline.catalogue(), min_score);
    let today = Local::now().date_naive();
    let summary = pipeline
        .analyze_and_save(&analyzer, papers, today, &cancel, |p| {
            println!("[{}/{}] {}", p.index, p.total, p.title);
        })
        .await
        .context("cannot save daily record")?;

    println!();
    banner("Summary");
    println!("Date: {}", summary.date);
    println!("Fetched: {}", summary.fetched);
    println!("Kept (score >= {}): {}", min_score, summary.kept);
    println!("Below threshold: {}", summary.below_threshold);
    println!("Failed: {}", summary.failures.len());
    for failure in &summary.failures {
        println!("   {}: {}", failure.arxiv_id, failure.error);
    }
    println!("New in record: {}", summary.added);
    if summary.cancelled {
        println!("Run was interrupted, partial results saved");
    }
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    banner("Configuration");
    println!("{}", serde_json::to_string_pretty(config)?);
    println!();
    match config.llm.key_env() {
        Some(env) if config.llm.api_key_is_set() => println!("Credential {}: set", env),
        Some(env) => println!("Credential {}: NOT SET", env),
        None => println!("Credential: not required"),
    }
    println!("Output categories: {}", config.output_categories().join(", "));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paper_tracker=info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(Some(&args.config))
        .with_context(|| format!("cannot load config {}", args.config.display()))?;

    match args.command {
        Command::FetchAndAnalyze { days, dry_run } => fetch_and_analyze(config, days, dry_run).await,
        Command::ShowConfig => show_config(&config),
        Command::Serve { port, output } => {
            let store = DailyStore::new(&config.data_dir);
            web::start_server(port, output, store).await
        }
    }
}
