//! Grant Harvester CLI
//!
//! Local execution entry point for both crawl phases.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use grant_harvester::{
    error::{AppError, Result},
    models::{Config, RunOutcome},
    pipeline::{self, HarvestPaths, LinksOptions},
    services::HttpFetcher,
};

/// Grant Harvester - Two-phase grant opportunity crawler
#[derive(Parser, Debug)]
#[command(
    name = "grant-harvester",
    version,
    about = "Harvest grant opportunities from paginated listings"
)]
struct Cli {
    /// Path to storage directory holding config.toml and the CSV output
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Phase 1: walk listing pages into the listing CSV
    Links {
        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Phase 2: visit every detail link from the listing CSV
    Details,

    /// Run both phases: Links → Details
    Pipeline {
        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Validate the configuration file
    Validate,
}

#[derive(clap::Args, Debug)]
struct WalkArgs {
    /// Stop after this many listing pages (overrides crawler.max_pages)
    #[arg(long)]
    max_pages: Option<usize>,

    /// Listing page index to start from
    #[arg(long, default_value_t = 0)]
    start_page: usize,

    /// Continue from the saved cursor and append to the listing CSV
    #[arg(long)]
    resume: bool,
}

impl WalkArgs {
    fn apply(&self, config: &mut Config) -> LinksOptions {
        if let Some(max_pages) = self.max_pages {
            config.crawler.max_pages = max_pages;
        }
        LinksOptions {
            start_page: self.start_page,
            resume: self.resume,
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Print the end-of-run summary for each phase.
fn report(outcomes: &[RunOutcome]) {
    for outcome in outcomes {
        println!("{}", outcome);
    }
}

/// Turn an aborted listing phase into a non-zero exit.
fn exit_status(outcomes: &[RunOutcome]) -> Result<()> {
    match outcomes.iter().find(|o| !o.is_success()) {
        Some(aborted) => Err(AppError::aborted(
            aborted.phase.to_string(),
            aborted.terminal_reason,
        )),
        None => Ok(()),
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let mut config = Config::load_or_default(&config_path);
    log::info!("Loaded configuration from {}", config_path.display());

    if let Command::Validate = cli.command {
        log::info!("Validating configuration...");
        if let Err(e) = config.validate() {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
        log::info!("✓ Config OK");
        return Ok(());
    }

    let options = match &cli.command {
        Command::Links { walk } | Command::Pipeline { walk } => walk.apply(&mut config),
        _ => LinksOptions::default(),
    };
    config.validate()?;

    let paths = HarvestPaths::new(&config, &cli.storage_dir);
    let fetcher = HttpFetcher::new(&config)?;

    let outcomes = match cli.command {
        Command::Links { .. } => {
            vec![pipeline::links_to_file(&config, &fetcher, &paths, &options).await?]
        }
        Command::Details => {
            vec![pipeline::details_from_file(&config, &fetcher, &paths).await?]
        }
        Command::Pipeline { .. } => {
            pipeline::run_pipeline(&config, &fetcher, &paths, &options).await?
        }
        Command::Validate => Vec::new(),
    };

    report(&outcomes);
    exit_status(&outcomes)
}
