//! Service layer for the harvester.
//!
//! This module contains the building blocks both crawl phases share:
//! - Page fetching (`PageFetcher`, `HttpFetcher`)
//! - Bot-challenge detection (`ChallengeDetector`)
//! - Retry, backoff and pacing (`ResiliencePolicy`)
//! - Listing and detail extraction (`ListingExtractor`, `DetailExtractor`)
//! - Field validation and normalization (`validate`)

mod antibot;
mod extract;
mod fetcher;
mod resilience;
pub mod validate;

pub use antibot::ChallengeDetector;
pub use extract::{
    DUE_DATE_RAW_KEY, DetailExtraction, DetailExtractor, ExtractionWarning, FieldProblem,
    ListingEntry, ListingExtractor, ListingPage, SYNOPSIS_KEY,
};
pub use fetcher::{HttpFetcher, PageFetcher, ReadinessWait, RenderedPage};
pub use resilience::{ResiliencePolicy, RetryState};
