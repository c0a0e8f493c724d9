//! Test doubles shared by the pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, FetchError, Result as AppResult};
use crate::models::{Config, ResilienceConfig};
use crate::services::{PageFetcher, RenderedPage};
use crate::storage::RecordSink;

type Scripted = Result<RenderedPage, FetchError>;

/// Fetcher that replays queued responses per URL.
///
/// The last queued response for a URL repeats forever.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(&self, url: &str, html: impl Into<String>) {
        self.push(url, Ok(RenderedPage::new(url, html)));
    }

    pub fn fail(&self, url: &str, err: FetchError) {
        self.push(url, Err(err));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, url: &str, response: Scripted) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<RenderedPage, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());

        let mut responses = self.responses.lock().unwrap();
        let Some(queue) = responses.get_mut(url) else {
            return Err(FetchError::fatal(url, "no scripted response"));
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

/// Sink that accepts `capacity` records, then fails every write.
pub struct FailingSink<R> {
    pub written: Vec<R>,
    capacity: usize,
    pub finished: bool,
}

impl<R> FailingSink<R> {
    pub fn after(capacity: usize) -> Self {
        Self {
            written: Vec::new(),
            capacity,
            finished: false,
        }
    }
}

impl<R: Clone> RecordSink<R> for FailingSink<R> {
    fn write(&mut self, record: &R) -> AppResult<()> {
        if self.written.len() >= self.capacity {
            return Err(AppError::Io(std::io::Error::other("disk full")));
        }
        self.written.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> AppResult<()> {
        self.finished = true;
        Ok(())
    }
}

/// Default configuration with delays shrunk for paused-time tests.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.resilience = ResilienceConfig {
        max_retries: 3,
        max_blocked_retries: 2,
        base_backoff_seconds: 0.1,
        max_backoff_seconds: 1.0,
        jitter_seconds: 0.05,
        pacing_min_seconds: 0.01,
        pacing_max_seconds: 0.02,
        blocked_cooldown_seconds: 2.0,
        ..ResilienceConfig::default()
    };
    config
}

/// A listing page in the site's results-table layout.
pub fn listing_html(ids: &[&str], has_next: bool) -> String {
    let rows: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<tr><td><a class="usa-link" href="/search-results-detail/{id}">{id}</a></td><td>Title</td></tr>"#
            )
        })
        .collect();

    let next_class = if has_next {
        "usa-pagination__link"
    } else {
        "usa-pagination__link disabled"
    };

    format!(
        r#"<html><body>
        <div class="usa-table-container--scrollable"><table class="usa-table">
        <thead><tr><th>Opportunity Number</th><th>Title</th></tr></thead>
        <tbody>{rows}</tbody></table></div>
        <nav><a class="{next_class}" href="javascript:void(0)">NEXT</a></nav>
        </body></html>"#
    )
}

/// A detail page with the given general-information rows.
pub fn detail_html(rows: &[(&str, &str)]) -> String {
    let rows: String = rows
        .iter()
        .map(|(label, value)| format!("<tr><td>{label}:</td><td>{value}</td></tr>"))
        .collect();
    format!("<html><body><h2>General Information</h2><table>{rows}</table></body></html>")
}
