//! Pipeline entry points for the two crawl phases.
//!
//! - `run_links`: Walk listing pages into listing records (Phase 1)
//! - `run_details`: Visit each detail link into a full record (Phase 2)
//! - `run_pipeline`: Both phases against files in the storage directory

pub mod details;
pub mod harvest;
pub mod links;
pub mod paginate;

#[cfg(test)]
pub(crate) mod testing;

pub use details::run_details;
pub use harvest::{HarvestPaths, details_from_file, links_to_file, run_pipeline};
pub use links::{LinksOptions, run_links};
pub use paginate::{ListingEvent, PaginationDriver, WalkEnd};
