//! Command-line interface definitions for the blog enhancer.
//!
//! Connection settings can be provided via flags or environment variables
//! (a `.env` file in the working directory is loaded first). Everything
//! selector- or threshold-shaped lives in the YAML settings file instead.

use clap::{Parser, Subcommand};

/// Command-line arguments for the blog enhancer.
///
/// # Examples
///
/// ```sh
/// # Enhance every original that has no enhanced version yet
/// blog_enhancer enhance --report-dir ./reports
///
/// # Enhance only the newest original
/// blog_enhancer enhance-latest
///
/// # Ingest five originals from index page 15
/// blog_enhancer scrape --page 15 --count 5
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a settings YAML file
    #[arg(short, long, global = true, env = "BLOG_ENHANCER_CONFIG")]
    pub config: Option<String>,

    /// Base URL of the article persistence API
    #[arg(
        long,
        global = true,
        env = "ARTICLES_API_URL",
        default_value = "http://localhost:8000/api"
    )]
    pub api_url: String,

    /// Gemini API key
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini model name
    #[arg(long, global = true, env = "GEMINI_MODEL", default_value = "gemini-2.5-flash")]
    pub model: String,

    /// Browserless base URL; search pages are rendered through it when set
    #[arg(long, global = true, env = "BROWSERLESS_URL")]
    pub browserless_url: Option<String>,

    /// Browserless API token
    #[arg(long, global = true, env = "BROWSERLESS_TOKEN", hide_env_values = true)]
    pub browserless_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Enhance every eligible original article, one after another
    Enhance {
        /// Search results to scrape per article (overrides settings)
        #[arg(long)]
        results: Option<usize>,

        /// Seconds to pause between articles (overrides settings)
        #[arg(long)]
        pace_secs: Option<u64>,

        /// Directory for the JSON run report
        #[arg(long)]
        report_dir: Option<String>,
    },

    /// Enhance the most recently published original article
    EnhanceLatest {
        /// Search results to scrape (overrides settings)
        #[arg(long)]
        results: Option<usize>,
    },

    /// Ingest original articles from one page of the blog index
    Scrape {
        /// Index page number
        #[arg(long, default_value_t = 15)]
        page: u32,

        /// Maximum number of articles to ingest
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}
