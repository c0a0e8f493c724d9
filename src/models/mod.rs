// src/models/mod.rs

//! Domain models for the harvester.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod cursor;
mod outcome;
mod record;

// Re-export all public types
pub use config::{
    AntiBotConfig, Config, CrawlerConfig, FieldAliases, OutputConfig, RenderConfig,
    ResilienceConfig, SelectorConfig,
};
pub use cursor::CrawlCursor;
pub use outcome::{FailedRecord, Phase, RunOutcome, TerminalReason};
pub use record::{DetailRecord, ListingRecord};
