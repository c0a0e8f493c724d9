// src/pipeline/paginate.rs

//! Listing pagination driver.
//!
//! Walks listing pages one at a time and yields events as a lazy stream.
//! The walk owns a [`CrawlCursor`]; nothing else touches it.

use std::collections::VecDeque;

use futures::stream::{self, Stream};

use crate::error::FetchError;
use crate::models::{CrawlCursor, CrawlerConfig, ListingRecord, TerminalReason};
use crate::services::validate::validate_opportunity_id;
use crate::services::{ListingExtractor, PageFetcher, ResiliencePolicy};
use crate::storage::CursorCheckpoint;

/// Something the driver observed while walking the listing.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingEvent {
    /// A new, valid opportunity
    Record(ListingRecord),
    /// A row whose id failed validation
    Rejected {
        opportunity_id: String,
        reason: String,
    },
    /// Always the last event of a walk
    Finished(WalkEnd),
}

/// How a walk ended.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkEnd {
    pub reason: TerminalReason,
    pub truncated: bool,
    pub pages_visited: usize,
    /// The unrecoverable fetch error behind a `fetch_failure`
    pub error: Option<FetchError>,
}

/// What to do with the checkpoint once the last event is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnClose {
    Keep,
    Save,
    Clear,
}

struct Walk {
    cursor: CrawlCursor,
    pending: VecDeque<ListingEvent>,
    pages_visited: usize,
    /// Consecutive pages that produced no new ids
    stale_pages: usize,
    on_close: Option<OnClose>,
}

/// Drives the listing walk through the resilience policy.
pub struct PaginationDriver<'a, F: ?Sized> {
    fetcher: &'a F,
    policy: &'a ResiliencePolicy,
    extractor: &'a ListingExtractor,
    crawler: &'a CrawlerConfig,
    checkpoint: Option<&'a CursorCheckpoint>,
}

impl<'a, F> PaginationDriver<'a, F>
where
    F: PageFetcher + ?Sized,
{
    pub fn new(
        fetcher: &'a F,
        policy: &'a ResiliencePolicy,
        extractor: &'a ListingExtractor,
        crawler: &'a CrawlerConfig,
    ) -> Self {
        Self {
            fetcher,
            policy,
            extractor,
            crawler,
            checkpoint: None,
        }
    }

    /// Persist the cursor between pages so the walk can be resumed.
    pub fn with_checkpoint(mut self, checkpoint: &'a CursorCheckpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Walk from `start_page` with a fresh cursor.
    pub fn run(&self, start_page: usize) -> impl Stream<Item = ListingEvent> + '_ {
        self.resume(CrawlCursor::new(start_page))
    }

    /// Walk from a previously saved cursor.
    pub fn resume(&self, cursor: CrawlCursor) -> impl Stream<Item = ListingEvent> + '_ {
        let walk = Walk {
            cursor,
            pending: VecDeque::new(),
            pages_visited: 0,
            stale_pages: 0,
            on_close: None,
        };

        stream::unfold(walk, move |mut walk| async move {
            loop {
                if let Some(event) = walk.pending.pop_front() {
                    return Some((event, walk));
                }
                if let Some(action) = walk.on_close.take() {
                    self.close_checkpoint(action, &walk.cursor).await;
                    return None;
                }
                self.step(&mut walk).await;
            }
        })
    }

    /// Fetch and process one listing page.
    async fn step(&self, walk: &mut Walk) {
        if walk.cursor.exhausted {
            self.finish(walk, TerminalReason::Exhausted, false, None);
            return;
        }

        self.close_checkpoint(OnClose::Save, &walk.cursor).await;

        let url = walk
            .cursor
            .next_url
            .clone()
            .unwrap_or_else(|| self.crawler.listing_page_url(walk.cursor.current_page_index));
        log::info!(
            "Listing page {} ({})",
            walk.cursor.current_page_index,
            url
        );

        let page = match self.policy.fetch_page(self.fetcher, &url).await {
            Ok(page) => page,
            Err(err) => {
                log::error!(
                    "Listing page {} unrecoverable: {}",
                    walk.cursor.current_page_index,
                    err
                );
                self.finish(walk, TerminalReason::FetchFailure, false, Some(err));
                return;
            }
        };
        walk.pages_visited += 1;

        let listing = self.extractor.extract_listing(&page.html);
        for warning in &listing.warnings {
            log::warn!("{}: {}", url, warning);
        }

        let mut emitted = 0;
        for entry in listing.entries {
            if let Err(reason) = validate_opportunity_id(&entry.id) {
                log::warn!("Rejected listing row: {}", reason);
                walk.pending.push_back(ListingEvent::Rejected {
                    opportunity_id: entry.id,
                    reason,
                });
                continue;
            }
            if !walk.cursor.observe(&entry.id) {
                log::debug!("Duplicate opportunity {} dropped", entry.id);
                continue;
            }
            emitted += 1;
            walk.pending
                .push_back(ListingEvent::Record(ListingRecord::new(entry.id, entry.url)));
        }
        log::info!("  {} new opportunities", emitted);
        if emitted == 0 {
            walk.stale_pages += 1;
        } else {
            walk.stale_pages = 0;
        }

        if !listing.has_next {
            log::info!("No next page, listing exhausted");
            self.finish(walk, TerminalReason::Exhausted, false, None);
            return;
        }

        if walk.stale_pages >= self.crawler.max_stale_pages {
            log::warn!(
                "{} page(s) in a row without new ids, stopping",
                walk.stale_pages
            );
            self.finish(walk, TerminalReason::Exhausted, false, None);
            return;
        }

        if let Some(limit) = self.crawler.page_limit() {
            if walk.pages_visited >= limit {
                log::info!("Page limit of {} reached", limit);
                walk.cursor.advance(listing.next_href);
                self.finish(walk, TerminalReason::Exhausted, true, None);
                return;
            }
        }

        let next_url = listing.next_href.clone().unwrap_or_else(|| {
            self.crawler
                .listing_page_url(walk.cursor.current_page_index + 1)
        });
        if next_url == url {
            log::warn!("Next page points back at {}, stopping", url);
            self.finish(walk, TerminalReason::Exhausted, false, None);
            return;
        }

        walk.cursor.advance(listing.next_href);
    }

    fn finish(
        &self,
        walk: &mut Walk,
        reason: TerminalReason,
        truncated: bool,
        error: Option<FetchError>,
    ) {
        let on_close = match reason {
            TerminalReason::FetchFailure | TerminalReason::IoFailure => OnClose::Keep,
            TerminalReason::Exhausted if truncated => OnClose::Save,
            TerminalReason::Exhausted => {
                walk.cursor.finish();
                OnClose::Clear
            }
        };

        walk.pending.push_back(ListingEvent::Finished(WalkEnd {
            reason,
            truncated,
            pages_visited: walk.pages_visited,
            error,
        }));
        walk.on_close = Some(on_close);
    }

    async fn close_checkpoint(&self, action: OnClose, cursor: &CrawlCursor) {
        let Some(checkpoint) = self.checkpoint else {
            return;
        };
        let result = match action {
            OnClose::Keep => Ok(()),
            OnClose::Save => checkpoint.save(cursor).await,
            OnClose::Clear => checkpoint.clear().await,
        };
        if let Err(e) = result {
            log::warn!("Checkpoint update failed: {}", e);
        }
    }
}
