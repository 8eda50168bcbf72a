use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use venue_events::extractor::CaptionExtractor;
use venue_events::fetcher::FetchRequest;
use venue_events::store::{self, RecordStore};
use venue_events::types::StoredRow;
use venue_events::{Config, Pipeline};

#[derive(Parser)]
#[command(name = "venue-events", about = "Extract venue events from Instagram posts")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch posts, extract events, append new rows, then enrich
    Aggregate {
        /// Instagram handle (repeatable)
        #[arg(long = "handle", required = true, num_args = 1..)]
        handles: Vec<String>,

        /// Most-recent posts per handle
        #[arg(long, default_value_t = 5)]
        limit: u32,

        /// Stop after appending to the raw store
        #[arg(long)]
        skip_enrich: bool,
    },
    /// Fill empty event lists from captions and rewrite the enriched file
    Enrich {
        /// Raw store (defaults to EVENTS_CSV)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Enriched output (defaults to EVENTS_ENRICHED_CSV)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("venue_events=info,info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_enrich(config: &Config, input: PathBuf, output: PathBuf) -> Result<()> {
    let text = CaptionExtractor::openai(config.require_openai_key()?, &config.text_model);
    let stats = store::enrich(&RecordStore::new(input), &output, &text).await?;
    info!(
        rows = stats.rows,
        attempted = stats.attempted,
        filled = stats.filled,
        output = %output.display(),
        "Enriched store written"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = Config::from_env();
    config.log_redacted();

    match cli.command {
        Command::Aggregate {
            handles,
            limit,
            skip_enrich,
        } => {
            let pipeline = Pipeline::from_config(&config)?;
            let request = FetchRequest::handles(handles.clone(), limit);
            let results = pipeline.aggregate(&request).await?;

            let rows = results
                .iter()
                .map(StoredRow::from_aggregated)
                .collect::<venue_events::Result<Vec<_>>>()?;
            let stats = RecordStore::new(&config.events_csv).append(&rows)?;
            info!(written = stats.written, skipped = stats.skipped, "Raw store updated");

            let summary = serde_json::json!({
                "handles": handles,
                "count": results.len(),
                "results": results,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);

            if !skip_enrich {
                run_enrich(
                    &config,
                    config.events_csv.clone(),
                    config.events_enriched_csv.clone(),
                )
                .await?;
            }
        }
        Command::Enrich { input, output } => {
            let input = input.unwrap_or_else(|| config.events_csv.clone());
            let output = output.unwrap_or_else(|| config.events_enriched_csv.clone());
            run_enrich(&config, input, output).await?;
        }
    }

    Ok(())
}
