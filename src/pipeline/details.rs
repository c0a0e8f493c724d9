// src/pipeline/details.rs

//! Phase 2: visit each detail link and extract a full record.

use std::collections::HashSet;

use crate::error::{ErrorKind, Result};
use crate::models::{Config, DetailRecord, ListingRecord, Phase, RunOutcome};
use crate::services::validate::validate_opportunity_id;
use crate::services::{DetailExtractor, PageFetcher, ResiliencePolicy};
use crate::storage::RecordSink;

/// Run Phase 2 over `listings`, writing each record as soon as it is built.
///
/// A failed fetch skips that opportunity only; the run always consumes the
/// whole input.
pub async fn run_details<F, I>(
    config: &Config,
    fetcher: &F,
    listings: I,
    sink: &mut dyn RecordSink<DetailRecord>,
) -> Result<RunOutcome>
where
    F: PageFetcher + ?Sized,
    I: IntoIterator<Item = Result<ListingRecord>>,
{
    let policy = ResiliencePolicy::from_config(config);
    let extractor = DetailExtractor::new(&config.selectors)?;
    let mut outcome = RunOutcome::new(Phase::Details);
    let mut seen = HashSet::new();

    for (index, listing) in listings.into_iter().enumerate() {
        let listing = match listing {
            Ok(listing) => listing,
            Err(e) => {
                log::warn!("Skipping input row {}: {}", index + 1, e);
                outcome.records_skipped += 1;
                continue;
            }
        };

        let id = listing.opportunity_id;
        if listing.detail_url.is_empty() {
            log::warn!("Skipping {}: empty detail URL", id);
            outcome.records_skipped += 1;
            continue;
        }
        if let Err(reason) = validate_opportunity_id(&id) {
            log::warn!("Rejected input row {}: {}", index + 1, reason);
            outcome.record_failure(id, ErrorKind::Validation, reason);
            continue;
        }
        if !seen.insert(id.clone()) {
            log::debug!("Skipping duplicate {}", id);
            outcome.records_skipped += 1;
            continue;
        }

        log::info!("[{}] {} ({})", index + 1, id, listing.detail_url);
        let page = match policy.fetch_page(fetcher, &listing.detail_url).await {
            Ok(page) => page,
            Err(err) => {
                log::error!("{} failed: {}", id, err);
                outcome.record_failure(id, err.kind(), &err);
                continue;
            }
        };
        outcome.pages_visited += 1;

        let extraction = extractor.extract_detail(&id, &page.html);
        for warning in &extraction.warnings {
            log::warn!("{}: {}", id, warning);
        }
        let mut record = extraction.record;
        record.detail_url = listing.detail_url;
        if let Err(e) = sink.write(&record) {
            log::error!("Could not write {}: {}", id, e);
            outcome.abort_on_io(id, e);
            break;
        }
        outcome.records_succeeded += 1;
    }
    if outcome.is_success() {
        if let Err(e) = sink.finish() {
            log::error!("Could not finalize detail output: {}", e);
            outcome.abort_on_io("detail output", e);
        }
    }

    log::info!(
        "Details finished: {} written, {} failed, {} skipped",
        outcome.records_succeeded,
        outcome.records_failed.len(),
        outcome.records_skipped
    );
    Ok(outcome)
}
