//! Persistence for crawl output.
//!
//! Records are written as soon as they are produced, so an interrupted run
//! keeps everything it collected so far.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml           # Harvester configuration
//! ├── grant_ids.csv         # Phase 1 output / Phase 2 input
//! ├── grant_details.csv     # Phase 2 output
//! └── cursor.json           # Listing checkpoint, removed once the walk is exhausted
//! ```

pub mod checkpoint;
pub mod tabular;

use crate::error::Result;

pub use checkpoint::CursorCheckpoint;
pub use tabular::{DetailCsvWriter, ListingCsvWriter, read_listings};

/// Destination for records produced by a phase.
pub trait RecordSink<R> {
    /// Persist one record. Must be durable once this returns.
    fn write(&mut self, record: &R) -> Result<()>;

    /// Called once after the last record.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory sink, handy for tests and dry runs.
impl<R: Clone> RecordSink<R> for Vec<R> {
    fn write(&mut self, record: &R) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}
