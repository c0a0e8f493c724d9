// src/lib.rs

//! Grant Harvester Library
//!
//! Two-phase crawler for grant opportunities: walk the paginated listing
//! into `(opportunity id, detail URL)` pairs, then visit each detail page
//! and extract a full record. Every request goes through a retry, backoff
//! and pacing policy that also recognizes bot challenges.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
