//! Per-phase run reporting.

use std::fmt;

use serde::Serialize;

use crate::error::ErrorKind;

/// Which crawl phase produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Listing pagination (opportunity ids and detail links)
    Links,
    /// Detail page harvesting
    Details,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Links => f.write_str("links"),
            Phase::Details => f.write_str("details"),
        }
    }
}

/// How a phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// All input consumed or the listing ran out of pages
    Exhausted,
    /// A listing page could not be fetched after all retries
    FetchFailure,
    /// Reading input or writing output failed; earlier records are kept
    IoFailure,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::Exhausted => "exhausted",
            TerminalReason::FetchFailure => "fetch_failure",
            TerminalReason::IoFailure => "io_failure",
        }
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecord {
    /// Opportunity id, or the page URL for listing failures
    pub identifier: String,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Summary of one phase run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub phase: Phase,
    pub records_succeeded: usize,
    pub records_failed: Vec<FailedRecord>,
    /// Input rows ignored because they could not be used at all
    pub records_skipped: usize,
    pub pages_visited: usize,
    pub terminal_reason: TerminalReason,
    /// The walk stopped at the configured page limit
    pub truncated: bool,
}

impl RunOutcome {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            records_succeeded: 0,
            records_failed: Vec::new(),
            records_skipped: 0,
            pages_visited: 0,
            terminal_reason: TerminalReason::Exhausted,
            truncated: false,
        }
    }

    pub fn record_failure(
        &mut self,
        identifier: impl Into<String>,
        kind: ErrorKind,
        reason: impl fmt::Display,
    ) {
        self.records_failed.push(FailedRecord {
            identifier: identifier.into(),
            kind,
            reason: reason.to_string(),
        });
    }

    /// Stop the phase because a file could not be read or written.
    pub fn abort_on_io(&mut self, identifier: impl Into<String>, err: impl fmt::Display) {
        self.terminal_reason = TerminalReason::IoFailure;
        self.record_failure(identifier, ErrorKind::Fatal, err);
    }

    /// The phase finished normally. Per-record failures do not count.
    pub fn is_success(&self) -> bool {
        self.terminal_reason == TerminalReason::Exhausted
    }

    /// Failures of a given kind, in the order they happened.
    pub fn failures_of(&self, kind: ErrorKind) -> impl Iterator<Item = &FailedRecord> {
        self.records_failed.iter().filter(move |f| f.kind == kind)
    }

    /// Key/value lines for the end-of-run summary.
    pub fn summary_items(&self) -> Vec<(&'static str, String)> {
        let mut items = vec![
            ("Terminal reason", self.terminal_reason.to_string()),
            ("Succeeded", self.records_succeeded.to_string()),
            ("Failed", self.records_failed.len().to_string()),
            ("Skipped", self.records_skipped.to_string()),
        ];
        if self.phase == Phase::Links {
            items.push(("Pages visited", self.pages_visited.to_string()));
            items.push(("Truncated", self.truncated.to_string()));
        }
        items
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[SUMMARY] {}", self.phase)?;
        for (key, value) in self.summary_items() {
            writeln!(f, "    {}: {}", key, value)?;
        }
        for failure in &self.records_failed {
            writeln!(
                f,
                "    - {} [{}] {}",
                failure.identifier, failure.kind, failure.reason
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_outcome_is_success() {
        let outcome = RunOutcome::new(Phase::Details);
        assert!(outcome.is_success());
        assert_eq!(outcome.terminal_reason.as_str(), "exhausted");
    }

    #[test]
    fn test_failures_do_not_change_success() {
        let mut outcome = RunOutcome::new(Phase::Details);
        outcome.record_failure("G-200", ErrorKind::Blocked, "captcha");
        outcome.record_failure("bad id", ErrorKind::Validation, "malformed");

        assert!(outcome.is_success());
        assert_eq!(outcome.failures_of(ErrorKind::Blocked).count(), 1);
        assert_eq!(outcome.records_failed[1].identifier, "bad id");
    }

    #[test]
    fn test_io_abort_is_not_success() {
        let mut outcome = RunOutcome::new(Phase::Details);
        outcome.records_succeeded = 1;
        outcome.abort_on_io("G-2", "I/O error: disk full");

        assert!(!outcome.is_success());
        assert_eq!(outcome.records_succeeded, 1);
        assert_eq!(outcome.failures_of(ErrorKind::Fatal).count(), 1);
        assert!(outcome.to_string().contains("Terminal reason: io_failure"));
    }

    #[test]
    fn test_display_lists_failures() {
        let mut outcome = RunOutcome::new(Phase::Links);
        outcome.terminal_reason = TerminalReason::FetchFailure;
        outcome.record_failure("https://example.com/p2", ErrorKind::Transient, "503");

        let text = outcome.to_string();
        assert!(text.contains("Terminal reason: fetch_failure"));
        assert!(text.contains("Truncated: false"));
        assert!(text.contains("https://example.com/p2 [transient] 503"));
    }
}
