//! Command-line entry point.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use digestflow::cancellation::CancellationToken;
use digestflow::consolidate::{GeminiClient, API_KEY_ENV};
use digestflow::fetch::HttpFetcher;
use digestflow::io::{ObjectStore, StorageRouter};
use digestflow::observability::{init_tracing, LogFormat};
use digestflow::pipeline::{PipelineBuilder, RunOptions};

/// Fetch a list of sources and consolidate them into one document.
#[derive(Debug, Parser)]
#[command(name = "digestflow", version, about)]
struct Cli {
    /// Source list: a local path or gs://bucket/object.
    #[arg(short = 'f', long = "url-file")]
    url_file: String,

    /// Output location: a local path or gs://bucket/object. Empty prints a preview.
    #[arg(short, long, default_value = "./output/output_reduce_final.md")]
    output: String,

    /// Parallel fetches.
    #[arg(short, long, default_value_t = 5, value_parser = clap::value_parser!(u16).range(1..))]
    parallel: u16,

    /// Parallel Map calls.
    #[arg(long = "map-parallel", default_value_t = 2)]
    map_parallel: usize,

    /// Generation API key.
    #[arg(short = 'k', long = "api-key", env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Per-call generation timeout in seconds.
    #[arg(short = 't', long = "llm-timeout", default_value_t = 300)]
    llm_timeout: u64,

    /// Per-request fetch timeout in seconds.
    #[arg(short = 's', long = "scraper-timeout", default_value_t = 15)]
    scraper_timeout: u64,

    /// Deadline for the whole run in seconds.
    #[arg(long = "run-timeout", default_value_t = 1800)]
    run_timeout: u64,

    /// Model for per-segment summaries.
    #[arg(long = "map-model", default_value = "gemini-2.5-flash")]
    map_model: String,

    /// Model for the final consolidation.
    #[arg(long = "reduce-model", default_value = "gemini-2.5-pro")]
    reduce_model: String,

    /// Largest segment sent to the Map phase, in characters.
    #[arg(long = "max-segment-chars", default_value_t = 400_000)]
    max_segment_chars: usize,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        let mut options = RunOptions::new(self.url_file.clone())
            .with_output(self.output.clone())
            .with_max_fetch_concurrency(usize::from(self.parallel))
            .with_max_map_concurrency(self.map_parallel)
            .with_generation_timeout(Duration::from_secs(self.llm_timeout))
            .with_fetch_timeout(Duration::from_secs(self.scraper_timeout))
            .with_run_timeout(Duration::from_secs(self.run_timeout))
            .with_map_model(self.map_model.clone())
            .with_reduce_model(self.reduce_model.clone())
            .with_max_segment_chars(self.max_segment_chars);
        if let Some(key) = &self.api_key {
            options = options.with_api_key(key.clone());
        }
        options
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);

    let options = cli.run_options();
    let token = CancellationToken::new();
    token.cancel_after(options.run_timeout());
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; cancelling run");
                token.cancel("interrupted");
            }
        });
    }

    let http = reqwest::Client::builder()
        .timeout(options.fetch_timeout())
        .build()
        .context("failed to build storage HTTP client")?;
    let storage = StorageRouter::local().with_object_store(ObjectStore::from_env(http));
    let fetcher =
        HttpFetcher::new(options.http_fetcher_config())?.with_cancellation(token.clone());
    let generator = GeminiClient::new(options.gemini_config()?)?.with_cancellation(token.clone());

    let pipeline = PipelineBuilder::new(options)
        .storage(Arc::new(storage))
        .fetcher(Arc::new(fetcher))
        .generator(Arc::new(generator))
        .build()?;

    match pipeline.execute(&token).await {
        Ok(report) => {
            info!(
                run_id = %report.run_id,
                successful = report.successful_sources(),
                total = report.total_sources,
                output = %report.output,
                "Done"
            );
            Ok(())
        }
        Err(e) => {
            if e.is_cancellation() {
                error!(error = %e, "Run cancelled");
            } else {
                error!(error = %e, "Run failed");
            }
            Err(e.into())
        }
    }
}
