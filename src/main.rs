//! # Blog Enhancer
//!
//! Takes the original articles of a company blog, finds competing articles
//! on the same topic through web search, has a generative model rewrite each
//! original using those references, and publishes the result as an
//! "enhanced" article with a citation list.
//!
//! ## Usage
//!
//! ```sh
//! blog_enhancer scrape --page 15 --count 5   # ingest originals
//! blog_enhancer enhance --report-dir ./reports
//! blog_enhancer enhance-latest
//! ```
//!
//! ## Architecture
//!
//! Each enhancement job runs a fixed sequence:
//! 1. **Searching**: query the engine chain with the article title, falling
//!    back to a curated link table when every engine comes back empty
//! 2. **Scraping**: fetch and extract each reference page
//! 3. **Rewriting**: build a grounded (or knowledge-only) prompt and call the
//!    model, backing off on rate limits
//! 4. **Publishing**: append the references block and create the new record
//!
//! Jobs run one at a time with a pause between them; a failed job is recorded
//! and the batch moves on.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod ingest;
mod models;
mod outputs;
mod pipeline;
mod publish;
mod rewrite;
mod scrapers;
mod search;
mod utils;

use api::{GeminiClient, RetryingBackend};
use cli::{Cli, Command};
use config::Settings;
use error::PipelineError;
use ingest::Ingestor;
use models::JobOutcome;
use outputs::json::write_run_report;
use pipeline::{Pipeline, PipelineOptions};
use publish::HttpArticleStore;
use rewrite::Rewriter;
use scrapers::extract::{ExtractProfile, Extractor};
use scrapers::listing::ListParser;
use scrapers::{ContentExtractor, HttpFetcher};
use search::WebSearch;
use search::render::{AnyBrowser, BrowserlessBrowser, HttpBrowser};

type EnhancePipeline =
    Pipeline<HttpArticleStore, WebSearch<AnyBrowser>, HttpFetcher, RetryingBackend<GeminiClient>>;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("blog_enhancer starting up");

    let args = Cli::parse();
    debug!(command = ?args.command, api_url = %args.api_url, "Parsed CLI arguments");

    let code = match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Run aborted");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    code
}

#[instrument(level = "info", skip_all)]
async fn run(args: &Cli) -> Result<ExitCode, Box<dyn Error>> {
    let settings = Settings::load(args.config.as_deref())?;
    let store = HttpArticleStore::new(&args.api_url, settings.network.fetch_timeout())?;
    let fetcher = HttpFetcher::new(settings.network.fetch_timeout())?;

    match args.command.clone() {
        Command::Scrape { page, count } => {
            let ingestor = Ingestor::new(
                &store,
                &fetcher,
                ListParser::new(&settings.listing)?,
                Extractor::new(&settings.extractor, ExtractProfile::Source)?,
                settings.ingest.clone(),
            );
            let summary = ingestor.run(page, count).await?;
            println!("{summary}");
            Ok(ExitCode::SUCCESS)
        }

        Command::Enhance {
            results,
            pace_secs,
            report_dir,
        } => {
            let pipeline = build_pipeline(args, &settings, store, fetcher, results, pace_secs)?;
            let started = Local::now();
            let summary = pipeline.run_batch().await?;
            println!("{summary}");

            if let Some(dir) = report_dir {
                match write_run_report(&summary, Path::new(&dir), started).await {
                    Ok(path) => info!(path = %path.display(), "Run report written"),
                    Err(e) => error!(error = %e, "Failed to write run report"),
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::EnhanceLatest { results } => {
            let pipeline = build_pipeline(args, &settings, store, fetcher, results, None)?;
            let record = pipeline.run_single().await?;
            if let JobOutcome::Succeeded { new_article_id } = record.outcome {
                println!(
                    "Enhanced \"{}\" published as article {new_article_id}",
                    record.title
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_pipeline(
    args: &Cli,
    settings: &Settings,
    store: HttpArticleStore,
    fetcher: HttpFetcher,
    results: Option<usize>,
    pace_secs: Option<u64>,
) -> Result<EnhancePipeline, Box<dyn Error>> {
    let gemini = GeminiClient::new(
        args.gemini_api_key.clone(),
        &args.model,
        settings.rewrite.request_timeout(),
    )
    .map_err(PipelineError::from)?;
    info!(model = %args.model, "Generative backend ready");
    let rewriter = Rewriter::new(
        RetryingBackend::new(
            gemini,
            settings.rewrite.max_attempts,
            settings.rewrite.base_backoff(),
        ),
        settings.rewrite.reference_char_cap,
    );

    let navigation_timeout = settings.network.navigation_timeout();
    let browser = match args.browserless_url.as_deref() {
        Some(url) => {
            info!(url, "Rendering search pages through Browserless");
            AnyBrowser::Browserless(BrowserlessBrowser::new(
                url,
                args.browserless_token.as_deref(),
                navigation_timeout,
            )?)
        }
        None => AnyBrowser::Http(HttpBrowser::new(
            settings.network.user_agents.clone(),
            navigation_timeout,
        )),
    };
    let search = WebSearch::new(browser, &settings.search)?;

    let scraper = ContentExtractor::new(
        fetcher,
        Extractor::new(&settings.extractor, ExtractProfile::Reference)?,
    );

    let options = PipelineOptions {
        results: results.unwrap_or(settings.pipeline.results),
        pace: Duration::from_secs(pace_secs.unwrap_or(settings.pipeline.pace_secs)),
        min_reference_chars: settings.rewrite.min_reference_chars,
    };
    Ok(Pipeline::new(store, search, scraper, rewriter, options))
}
