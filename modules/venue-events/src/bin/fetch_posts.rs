//! Dump recent Instagram posts for a few profiles to `{out}.posts.json`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{ArgGroup, Parser};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use venue_events::fetcher::{ApifyFetcher, FetchRequest, SourceFetcher};
use venue_events::Config;

#[derive(Parser)]
#[command(name = "fetch-posts", about = "Fetch recent Instagram posts through Apify")]
#[command(group(ArgGroup::new("profile").required(true).args(["username", "url", "search"])))]
struct Cli {
    /// Instagram username(s)
    #[arg(long, num_args = 1..)]
    username: Vec<String>,

    /// Profile URL(s)
    #[arg(long, num_args = 1..)]
    url: Vec<String>,

    /// Keyword to look accounts up by, instead of naming them
    #[arg(long)]
    search: Option<String>,

    /// Posts per profile
    #[arg(long, default_value_t = 10)]
    limit: u32,

    /// Oldest post date (YYYY-MM-DD); defaults to 7 days ago
    #[arg(long)]
    since: Option<NaiveDate>,

    /// Output file prefix
    #[arg(long, default_value = "out_instagram")]
    out: String,

    #[arg(long)]
    include_comments: bool,
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env();
    let fetcher = ApifyFetcher::from_config(&config)?;

    let since = cli
        .since
        .unwrap_or_else(|| Utc::now().date_naive() - Duration::days(7));
    let (profile, request) = match cli.search {
        Some(query) => (vec![query.clone()], FetchRequest::search(query, cli.limit)),
        None if !cli.url.is_empty() => (cli.url.clone(), FetchRequest::urls(cli.url, cli.limit)),
        None => (cli.username.clone(), FetchRequest::handles(cli.username, cli.limit)),
    };
    let request = request.since(since).include_comments(cli.include_comments);

    info!(profiles = ?profile, limit = cli.limit, %since, "Fetching posts");
    let items = fetcher.fetch_raw(&request).await?;
    for item in &items {
        debug!(
            id = item.get("id").and_then(|v| v.as_str()).unwrap_or_default(),
            kind = item.get("type").and_then(|v| v.as_str()).unwrap_or_default(),
            timestamp = item.get("timestamp").and_then(|v| v.as_str()).unwrap_or_default(),
            "Post"
        );
    }

    let path = format!("{}.posts.json", cli.out);
    std::fs::write(&path, serde_json::to_string_pretty(&items)?)
        .with_context(|| format!("Failed to write {path}"))?;

    let summary = serde_json::json!({
        "profile": profile,
        "count_raw_posts": items.len(),
        "outputs": { "raw_posts_json": path },
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
