// src/services/fetcher.rs

//! Page fetching capability.
//!
//! The crawl engine only needs "give me the rendered page at this URL".
//! [`PageFetcher`] is that seam; [`HttpFetcher`] implements it over plain
//! HTTP with an explicit readiness wait instead of a blind sleep.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tokio::time::Instant;

use crate::error::{AppError, FetchError, Result, TransientCause};
use crate::models::{Config, RenderConfig};
use crate::services::ChallengeDetector;
use crate::utils::http;

/// Rendered page content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Final URL after redirects
    pub url: String,
    /// DOM serialized as HTML
    pub html: String,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// Parse the content into a queryable document.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// Capability to render a URL and return its DOM.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<RenderedPage, FetchError>;
}

/// Bounded re-fetching until a page shows its readiness selector.
///
/// At most `max_polls` requests go out per fetch. The gap between them
/// starts at `poll_interval` and doubles each time, and no request is
/// started once `render_wait` would be exceeded.
#[derive(Debug)]
pub struct ReadinessWait {
    ready: Option<(String, Selector)>,
    render_wait: Duration,
    poll_interval: Duration,
    max_polls: u32,
}

impl ReadinessWait {
    pub fn new(render: &RenderConfig) -> Result<Self> {
        let ready = render
            .ready_selector
            .as_ref()
            .map(|s| {
                Selector::parse(s)
                    .map(|sel| (s.clone(), sel))
                    .map_err(|e| AppError::selector(s, format!("{e:?}")))
            })
            .transpose()?;

        Ok(Self {
            ready,
            render_wait: Duration::from_secs(render.render_wait_secs),
            poll_interval: Duration::from_millis(render.poll_interval_ms),
            max_polls: render.max_polls.max(1),
        })
    }

    /// Call `get` until it returns a ready page or the poll budget runs out.
    pub async fn poll<G, Fut>(
        &self,
        url: &str,
        mut get: G,
    ) -> std::result::Result<RenderedPage, FetchError>
    where
        G: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<RenderedPage, FetchError>>,
    {
        let deadline = Instant::now() + self.render_wait;
        let mut gap = self.poll_interval;
        let mut polls = 0;

        loop {
            polls += 1;
            let page = get().await?;
            if self.is_ready(&page) {
                return Ok(page);
            }

            if polls >= self.max_polls || Instant::now() + gap > deadline {
                log::debug!("{} not rendered after {} request(s)", url, polls);
                return Err(FetchError::transient(url, self.not_ready_cause(&page)));
            }

            log::debug!("{} not rendered yet, polling again in {:?}", url, gap);
            tokio::time::sleep(gap).await;
            gap = gap.saturating_mul(2);
        }
    }

    fn is_ready(&self, page: &RenderedPage) -> bool {
        if page.html.trim().is_empty() {
            return false;
        }
        match &self.ready {
            Some((_, selector)) => page.document().select(selector).next().is_some(),
            None => true,
        }
    }

    fn not_ready_cause(&self, page: &RenderedPage) -> TransientCause {
        match &self.ready {
            Some((raw, _)) if !page.html.trim().is_empty() => {
                TransientCause::PartialRender(raw.clone())
            }
            _ => TransientCause::EmptyRender,
        }
    }
}

/// HTTP fetcher that re-fetches until a readiness selector shows up.
pub struct HttpFetcher {
    client: Client,
    wait: ReadinessWait,
    guard: ChallengeDetector,
}

impl HttpFetcher {
    /// Build a fetcher from the crawler and render settings.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: http::create_async_client(&config.crawler)?,
            wait: ReadinessWait::new(&config.render)?,
            guard: ChallengeDetector::new(&config.antibot),
        })
    }

    /// Issue one GET and classify the response.
    async fn get_once(&self, url: &str) -> std::result::Result<RenderedPage, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::fatal(url, e))?;
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        classify_status(url, response.status())?;
        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        Ok(RenderedPage::new(final_url, html))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<RenderedPage, FetchError> {
        self.wait
            .poll(url, || async { self.guard.screen(self.get_once(url).await?) })
            .await
    }
}

/// Map an HTTP status onto the fetch error taxonomy.
fn classify_status(url: &str, status: StatusCode) -> std::result::Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }

    match status.as_u16() {
        403 | 429 => Err(FetchError::blocked(url, format!("HTTP {}", status.as_u16()))),
        408 | 425 => Err(FetchError::transient(
            url,
            TransientCause::Status(status.as_u16()),
        )),
        code if status.is_server_error() => {
            Err(FetchError::transient(url, TransientCause::Status(code)))
        }
        code => Err(FetchError::fatal(url, format!("HTTP {}", code))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::ErrorKind;

    #[test]
    fn test_classify_status() {
        let kind = |code: u16| {
            classify_status("u", StatusCode::from_u16(code).unwrap())
                .err()
                .map(|e| e.kind())
        };

        assert_eq!(kind(200), None);
        assert_eq!(kind(503), Some(ErrorKind::Transient));
        assert_eq!(kind(408), Some(ErrorKind::Transient));
        assert_eq!(kind(429), Some(ErrorKind::Blocked));
        assert_eq!(kind(403), Some(ErrorKind::Blocked));
        assert_eq!(kind(404), Some(ErrorKind::Fatal));
    }

    fn render(ready: Option<&str>) -> RenderConfig {
        RenderConfig {
            ready_selector: ready.map(String::from),
            render_wait_secs: 20,
            poll_interval_ms: 2000,
            max_polls: 3,
        }
    }

    #[test]
    fn test_readiness_selector() {
        let wait = ReadinessWait::new(&render(Some("table.usa-table"))).unwrap();

        let loading = RenderedPage::new("u", "<html><body><div>Loading…</div></body></html>");
        let rendered = RenderedPage::new(
            "u",
            "<html><body><table class=\"usa-table\"></table></body></html>",
        );

        assert!(!wait.is_ready(&loading));
        assert!(wait.is_ready(&rendered));
        assert_eq!(
            wait.not_ready_cause(&loading),
            TransientCause::PartialRender("table.usa-table".into())
        );
    }

    #[test]
    fn test_empty_body_is_not_ready() {
        let wait = ReadinessWait::new(&render(None)).unwrap();

        let empty = RenderedPage::new("u", "   ");
        assert!(!wait.is_ready(&empty));
        assert_eq!(wait.not_ready_cause(&empty), TransientCause::EmptyRender);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_budget_caps_requests_per_fetch() {
        let wait = ReadinessWait::new(&render(Some("table.usa-table"))).unwrap();
        let calls = AtomicUsize::new(0);
        let started = Instant::now();

        let err = wait
            .poll("u", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(RenderedPage::new("u", "<div>Loading…</div>"))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            err,
            FetchError::transient("u", TransientCause::PartialRender("table.usa-table".into()))
        );
        // 2s then 4s between the three requests
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(started.elapsed() < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_stops_at_render_wait() {
        let wait = ReadinessWait::new(&RenderConfig {
            render_wait_secs: 5,
            max_polls: 10,
            ..render(Some("table.usa-table"))
        })
        .unwrap();
        let calls = AtomicUsize::new(0);

        let result = wait
            .poll("u", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(RenderedPage::new("u", "<div>Loading…</div>"))
            })
            .await;

        assert!(result.is_err());
        // the 4s gap after the second request would pass the 5s wait
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_first_ready_page() {
        let wait = ReadinessWait::new(&render(Some("table"))).unwrap();
        let calls = AtomicUsize::new(0);

        let page = wait
            .poll("u", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let html = if n == 0 { "<div>Loading…</div>" } else { "<table></table>" };
                Ok(RenderedPage::new("u", html))
            })
            .await
            .unwrap();

        assert_eq!(page.html, "<table></table>");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalid_ready_selector_is_config_error() {
        let mut config = Config::default();
        config.render.ready_selector = Some("[[invalid".into());
        assert!(matches!(
            HttpFetcher::new(&config),
            Err(AppError::Selector { .. })
        ));
    }
}
