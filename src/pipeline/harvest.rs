// src/pipeline/harvest.rs

//! File-backed phase runners used by the CLI.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::{Config, Phase, RunOutcome};
use crate::pipeline::details::run_details;
use crate::pipeline::links::{LinksOptions, run_links};
use crate::services::PageFetcher;
use crate::storage::{CursorCheckpoint, DetailCsvWriter, ListingCsvWriter, read_listings};

/// Output locations under the storage directory.
#[derive(Debug, Clone)]
pub struct HarvestPaths {
    pub listing: PathBuf,
    pub detail: PathBuf,
    pub cursor: PathBuf,
}

impl HarvestPaths {
    pub fn new(config: &Config, storage_dir: &Path) -> Self {
        Self {
            listing: storage_dir.join(&config.output.listing_file),
            detail: storage_dir.join(&config.output.detail_file),
            cursor: storage_dir.join(&config.output.cursor_file),
        }
    }
}

/// Phase 1 into the listing CSV.
///
/// A resumed run appends to the existing file; otherwise it starts over.
pub async fn links_to_file<F>(
    config: &Config,
    fetcher: &F,
    paths: &HarvestPaths,
    options: &LinksOptions,
) -> Result<RunOutcome>
where
    F: PageFetcher + ?Sized,
{
    let checkpoint = CursorCheckpoint::new(&paths.cursor);
    let mut sink = match open_listing_sink(&checkpoint, &paths.listing, options.resume).await {
        Ok(sink) => sink,
        Err(e) => return Ok(io_abort(Phase::Links, &paths.listing, e)),
    };

    let outcome = run_links(config, fetcher, &mut sink, Some(&checkpoint), options).await?;
    log::info!("Listing saved to {}", paths.listing.display());
    Ok(outcome)
}

/// Phase 2 from the listing CSV into the detail CSV.
pub async fn details_from_file<F>(
    config: &Config,
    fetcher: &F,
    paths: &HarvestPaths,
) -> Result<RunOutcome>
where
    F: PageFetcher + ?Sized,
{
    let listings = match read_listings(&paths.listing) {
        Ok(listings) => listings,
        Err(e) => return Ok(io_abort(Phase::Details, &paths.listing, e)),
    };
    let mut sink = match DetailCsvWriter::create(&paths.detail, &config.output.detail_columns) {
        Ok(sink) => sink,
        Err(e) => return Ok(io_abort(Phase::Details, &paths.detail, e)),
    };

    let outcome = run_details(config, fetcher, listings, &mut sink).await?;
    log::info!("Details saved to {}", paths.detail.display());
    Ok(outcome)
}

/// Open the listing CSV, appending only when a checkpoint is resumed.
async fn open_listing_sink(
    checkpoint: &CursorCheckpoint,
    path: &Path,
    resume: bool,
) -> Result<ListingCsvWriter> {
    let resuming = resume && checkpoint.load().await?.is_some();
    if resume && !resuming {
        log::info!("No checkpoint at {}, starting fresh", checkpoint.path().display());
    }

    if resuming {
        ListingCsvWriter::append(path)
    } else {
        checkpoint.clear().await?;
        ListingCsvWriter::create(path)
    }
}

/// Outcome for a phase that could not open its files.
fn io_abort(phase: Phase, path: &Path, err: AppError) -> RunOutcome {
    log::error!("{} could not use {}: {}", phase, path.display(), err);
    let mut outcome = RunOutcome::new(phase);
    outcome.abort_on_io(path.display().to_string(), err);
    outcome
}

/// Both phases back to back. Phase 2 is skipped if Phase 1 aborted.
pub async fn run_pipeline<F>(
    config: &Config,
    fetcher: &F,
    paths: &HarvestPaths,
    options: &LinksOptions,
) -> Result<Vec<RunOutcome>>
where
    F: PageFetcher + ?Sized,
{
    let links = links_to_file(config, fetcher, paths, options).await?;
    if !links.is_success() {
        log::warn!("Listing phase aborted, skipping details");
        return Ok(vec![links]);
    }

    let details = details_from_file(config, fetcher, paths).await?;
    Ok(vec![links, details])
}
