// src/pipeline/links.rs

//! Phase 1: enumerate listing pages into listing records.

use std::pin::pin;

use futures::StreamExt;

use crate::error::{ErrorKind, Result};
use crate::models::{Config, ListingRecord, Phase, RunOutcome, TerminalReason};
use crate::pipeline::paginate::{ListingEvent, PaginationDriver};
use crate::services::{ListingExtractor, PageFetcher, ResiliencePolicy};
use crate::storage::{CursorCheckpoint, RecordSink};

/// Options for a listing run.
#[derive(Debug, Clone, Default)]
pub struct LinksOptions {
    pub start_page: usize,
    /// Continue from the checkpoint instead of `start_page`, if one exists
    pub resume: bool,
}

/// Run Phase 1, writing each record to `sink` as soon as it is found.
pub async fn run_links<F>(
    config: &Config,
    fetcher: &F,
    sink: &mut dyn RecordSink<ListingRecord>,
    checkpoint: Option<&CursorCheckpoint>,
    options: &LinksOptions,
) -> Result<RunOutcome>
where
    F: PageFetcher + ?Sized,
{
    let policy = ResiliencePolicy::from_config(config);
    let extractor = ListingExtractor::new(&config.selectors, &config.crawler.base_url)?;
    let mut driver = PaginationDriver::new(fetcher, &policy, &extractor, &config.crawler);

    let mut saved = None;
    if let Some(checkpoint) = checkpoint {
        driver = driver.with_checkpoint(checkpoint);
        if options.resume {
            match checkpoint.load().await {
                Ok(cursor) => saved = cursor,
                Err(e) => {
                    log::error!("Could not read {}: {}", checkpoint.path().display(), e);
                    let mut outcome = RunOutcome::new(Phase::Links);
                    outcome.abort_on_io(checkpoint.path().display().to_string(), e);
                    return Ok(outcome);
                }
            }
        }
    }

    let events = match saved {
        Some(cursor) => {
            log::info!(
                "Resuming listing at page {} ({} ids already seen)",
                cursor.current_page_index,
                cursor.seen_ids.len()
            );
            driver.resume(cursor).left_stream()
        }
        None => driver.run(options.start_page).right_stream(),
    };
    let mut events = pin!(events);

    let mut outcome = RunOutcome::new(Phase::Links);
    while let Some(event) = events.next().await {
        match event {
            ListingEvent::Record(record) => {
                if let Err(e) = sink.write(&record) {
                    log::error!("Could not write {}: {}", record.opportunity_id, e);
                    outcome.abort_on_io(record.opportunity_id, e);
                    break;
                }
                outcome.records_succeeded += 1;
            }
            ListingEvent::Rejected {
                opportunity_id,
                reason,
            } => {
                outcome.record_failure(opportunity_id, ErrorKind::Validation, reason);
            }
            ListingEvent::Finished(end) => {
                outcome.terminal_reason = end.reason;
                outcome.truncated = end.truncated;
                outcome.pages_visited = end.pages_visited;
                if let Some(err) = end.error {
                    outcome.record_failure(err.url().to_string(), err.kind(), &err);
                }
            }
        }
    }
    if outcome.terminal_reason != TerminalReason::IoFailure {
        if let Err(e) = sink.finish() {
            log::error!("Could not finalize listing output: {}", e);
            outcome.abort_on_io("listing output", e);
        }
    }

    log::info!(
        "Listing finished: {} records over {} pages ({})",
        outcome.records_succeeded,
        outcome.pages_visited,
        outcome.terminal_reason
    );
    Ok(outcome)
}
