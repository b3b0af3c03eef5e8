//! quotecache - inspect and maintain the tiered quote cache
//!
//! Opens the cache under the configured directory, runs one command and
//! exits. The memory tier starts empty on every run.

use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use quotecache::cache::TieredCache;
use quotecache::cli::{parse_json_arg, Cli, Command, StartupConfig};
use quotecache::clock::{Clock, SystemClock};
use quotecache::data::parse_quote_output;
use quotecache::fetch::{BatchSource, FetchStateTracker, QuoteService};
use quotecache::logging::init_logging;

async fn run(command: Command, startup: &StartupConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = TieredCache::open(&startup.cache, startup.cache_dir.clone(), clock.clone())?;

    match command {
        Command::Stats => {
            let stats = cache.statistics().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Get { key } => match cache.retrieve::<serde_json::Value>(&key).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => {
                eprintln!("Not cached: {}", key);
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Put { key, value, tier } => {
            let value = parse_json_arg(&value)?;
            let stored_in = cache.store(&key, &value, tier).await?;
            println!("Stored {} in {}", key, stored_in);
        }
        Command::Remove { key } => {
            cache.remove(&key).await?;
            println!("Removed {}", key);
        }
        Command::Clear => {
            cache.clear_all().await;
            println!("Cleared all tiers");
        }
        Command::Cleanup => {
            let report = cache.run_cleanup().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ParseQuotes => {
            let mut output = String::new();
            std::io::stdin().read_to_string(&mut output)?;

            let mut lines = Vec::new();
            for parsed in parse_quote_output(&output, clock.now()) {
                match parsed {
                    Ok(line) => lines.push(line),
                    Err(e) => warn!(error = %e, "Skipping quote line"),
                }
            }

            let source = BatchSource::from_lines(lines);
            let symbols = source.symbols().to_vec();
            let tracker = Arc::new(FetchStateTracker::new(startup.cache.tracker.policy()));
            let service = QuoteService::new(source, cache, tracker, clock);

            for (symbol, outcome) in service.refresh_all(&symbols).await {
                let price = outcome
                    .quote()
                    .map(|q| format!("{:.2}", q.price))
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{}\t{}", symbol, service.status(&symbol), price);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let startup = match StartupConfig::from_cli(&cli) {
        Ok(startup) => startup,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_logging(&startup.logging) {
        eprintln!("Error: failed to initialize logging: {}", e);
        return ExitCode::from(2);
    }
    info!(cache_dir = %startup.cache_dir.display(), "Opening cache");

    match run(cli.command, &startup).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
