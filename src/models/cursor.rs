//! Pagination cursor.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Progress of one listing walk.
///
/// Owned by the pagination driver. `seen_ids` guarantees that an
/// opportunity is emitted at most once per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrawlCursor {
    /// Index of the page about to be fetched
    pub current_page_index: usize,

    /// Opportunity ids already emitted
    pub seen_ids: HashSet<String>,

    /// The walk has reached its end
    pub exhausted: bool,

    /// Next page link found on the previous page, if any
    #[serde(default)]
    pub next_url: Option<String>,
}

impl CrawlCursor {
    /// Fresh cursor positioned at `start_page`.
    pub fn new(start_page: usize) -> Self {
        Self {
            current_page_index: start_page,
            ..Self::default()
        }
    }

    /// Record an id; returns `false` if it was already emitted.
    pub fn observe(&mut self, opportunity_id: &str) -> bool {
        if self.seen_ids.contains(opportunity_id) {
            return false;
        }
        self.seen_ids.insert(opportunity_id.to_string());
        true
    }

    /// Move to the following page.
    pub fn advance(&mut self, next_url: Option<String>) {
        self.current_page_index += 1;
        self.next_url = next_url;
    }

    pub fn finish(&mut self) {
        self.exhausted = true;
        self.next_url = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_rejects_repeats() {
        let mut cursor = CrawlCursor::new(0);
        assert!(cursor.observe("G-1"));
        assert!(cursor.observe("G-2"));
        assert!(!cursor.observe("G-1"));
        assert_eq!(cursor.seen_ids.len(), 2);
    }

    #[test]
    fn test_advance_and_finish() {
        let mut cursor = CrawlCursor::new(4);
        cursor.advance(Some("https://example.com/p5".into()));
        assert_eq!(cursor.current_page_index, 5);
        assert_eq!(cursor.next_url.as_deref(), Some("https://example.com/p5"));

        cursor.finish();
        assert!(cursor.exhausted);
        assert!(cursor.next_url.is_none());
    }
}
