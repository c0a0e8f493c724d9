//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::duration_from_secs;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Retry, backoff and pacing policy
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Readiness wait for dynamically rendered pages
    #[serde(default)]
    pub render: RenderConfig,

    /// CSS selectors and labels used by extraction
    #[serde(default)]
    pub selectors: SelectorConfig,

    /// Bot-challenge detection rules
    #[serde(default)]
    pub antibot: AntiBotConfig,

    /// Output file layout
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if url::Url::parse(&self.crawler.listing_page_url(0)).is_err() {
            return Err(AppError::validation(
                "crawler.listing_url must be an absolute URL",
            ));
        }
        if !self.crawler.listing_url.contains("{page}") {
            log::warn!(
                "crawler.listing_url has no {{page}} placeholder; only next links are followed"
            );
        }
        if self.crawler.max_stale_pages == 0 {
            return Err(AppError::validation("crawler.max_stale_pages must be >= 1"));
        }
        url::Url::parse(&self.crawler.base_url)?;
        self.resilience.validate()?;
        if self.render.poll_interval_ms == 0 {
            return Err(AppError::validation("render.poll_interval_ms must be > 0"));
        }
        if self.render.max_polls == 0 {
            return Err(AppError::validation("render.max_polls must be >= 1"));
        }
        if self.selectors.listing_row.trim().is_empty()
            || self.selectors.listing_link.trim().is_empty()
        {
            return Err(AppError::validation("listing selectors must not be empty"));
        }
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Site root used to resolve relative detail links
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Absolute listing page URL; `{page}` is replaced by the page index
    #[serde(default = "defaults::listing_url")]
    pub listing_url: String,

    /// Upper bound on listing pages visited in one run (0 = unbounded)
    #[serde(default)]
    pub max_pages: usize,

    /// Stop after this many consecutive listing pages with no new ids
    #[serde(default = "defaults::max_stale_pages")]
    pub max_stale_pages: usize,
}

impl CrawlerConfig {
    /// Listing URL for a page index.
    pub fn listing_page_url(&self, page: usize) -> String {
        self.listing_url.replace("{page}", &page.to_string())
    }

    /// Page limit, if one is configured.
    pub fn page_limit(&self) -> Option<usize> {
        (self.max_pages > 0).then_some(self.max_pages)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            base_url: defaults::base_url(),
            listing_url: defaults::listing_url(),
            max_pages: 0,
            max_stale_pages: defaults::max_stale_pages(),
        }
    }
}

/// Retry, backoff and pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Total attempts allowed for a transient failure
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Total attempts allowed when the site keeps challenging us
    #[serde(default = "defaults::max_blocked_retries")]
    pub max_blocked_retries: u32,

    #[serde(default = "defaults::base_backoff")]
    pub base_backoff_seconds: f64,

    #[serde(default = "defaults::max_backoff")]
    pub max_backoff_seconds: f64,

    /// Upper bound of the random jitter added to every backoff
    #[serde(default = "defaults::jitter")]
    pub jitter_seconds: f64,

    #[serde(default = "defaults::pacing_min")]
    pub pacing_min_seconds: f64,

    #[serde(default = "defaults::pacing_max")]
    pub pacing_max_seconds: f64,

    /// Extra wait added on top of the backoff curve after a challenge
    #[serde(default = "defaults::blocked_cooldown")]
    pub blocked_cooldown_seconds: f64,

    /// Hard bound on a single attempt
    #[serde(default = "defaults::operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Slow the pacing down after each challenge
    #[serde(default)]
    pub adaptive_slowdown: bool,

    #[serde(default = "defaults::slowdown_factor")]
    pub slowdown_factor: f64,

    #[serde(default = "defaults::max_slowdown")]
    pub max_slowdown: f64,
}

impl ResilienceConfig {
    pub fn max_backoff(&self) -> Duration {
        duration_from_secs(self.max_backoff_seconds)
    }

    pub fn jitter_window(&self) -> Duration {
        duration_from_secs(self.jitter_seconds)
    }

    pub fn blocked_cooldown(&self) -> Duration {
        duration_from_secs(self.blocked_cooldown_seconds)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Attempt budget for blocked responses, never above `max_retries`.
    pub fn blocked_budget(&self) -> u32 {
        self.max_blocked_retries.clamp(1, self.max_retries.max(1))
    }

    fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(AppError::validation("resilience.max_retries must be >= 1"));
        }
        let non_negative = [
            ("base_backoff_seconds", self.base_backoff_seconds),
            ("max_backoff_seconds", self.max_backoff_seconds),
            ("jitter_seconds", self.jitter_seconds),
            ("pacing_min_seconds", self.pacing_min_seconds),
            ("pacing_max_seconds", self.pacing_max_seconds),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::validation(format!(
                    "resilience.{name} must be a non-negative number"
                )));
            }
        }
        if self.max_backoff_seconds < self.base_backoff_seconds {
            return Err(AppError::validation(
                "resilience.max_backoff_seconds must be >= base_backoff_seconds",
            ));
        }
        if self.pacing_max_seconds < self.pacing_min_seconds {
            return Err(AppError::validation(
                "resilience.pacing_max_seconds must be >= pacing_min_seconds",
            ));
        }
        if !self.blocked_cooldown_seconds.is_finite() || self.blocked_cooldown_seconds <= 0.0 {
            return Err(AppError::validation(
                "resilience.blocked_cooldown_seconds must be > 0",
            ));
        }
        if self.operation_timeout_secs == 0 {
            return Err(AppError::validation(
                "resilience.operation_timeout_secs must be > 0",
            ));
        }
        if self.slowdown_factor < 1.0 || self.max_slowdown < 1.0 {
            return Err(AppError::validation(
                "resilience.slowdown_factor and max_slowdown must be >= 1.0",
            ));
        }
        Ok(())
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            max_blocked_retries: defaults::max_blocked_retries(),
            base_backoff_seconds: defaults::base_backoff(),
            max_backoff_seconds: defaults::max_backoff(),
            jitter_seconds: defaults::jitter(),
            pacing_min_seconds: defaults::pacing_min(),
            pacing_max_seconds: defaults::pacing_max(),
            blocked_cooldown_seconds: defaults::blocked_cooldown(),
            operation_timeout_secs: defaults::operation_timeout(),
            adaptive_slowdown: false,
            slowdown_factor: defaults::slowdown_factor(),
            max_slowdown: defaults::max_slowdown(),
        }
    }
}

/// Readiness wait for dynamically rendered pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Selector that must be present before a page counts as rendered
    #[serde(default)]
    pub ready_selector: Option<String>,

    /// How long to keep polling for the readiness selector
    #[serde(default = "defaults::render_wait")]
    pub render_wait_secs: u64,

    /// First gap between polls; doubles after each one
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_ms: u64,

    /// Requests allowed per fetch, the first one included
    #[serde(default = "defaults::max_polls")]
    pub max_polls: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ready_selector: Some(defaults::ready_selector()),
            render_wait_secs: defaults::render_wait(),
            poll_interval_ms: defaults::poll_interval(),
            max_polls: defaults::max_polls(),
        }
    }
}

/// CSS selectors and labels used by the extraction layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Result rows on a listing page
    #[serde(default = "defaults::listing_row")]
    pub listing_row: String,

    /// Opportunity link inside a result row
    #[serde(default = "defaults::listing_link")]
    pub listing_link: String,

    /// Pagination links
    #[serde(default = "defaults::pagination_link")]
    pub pagination_link: String,

    /// Text that marks the "next page" pagination link
    #[serde(default = "defaults::next_label")]
    pub next_label: String,

    /// Class that marks a pagination link as disabled
    #[serde(default = "defaults::disabled_class")]
    pub disabled_class: String,

    /// Detail page section headers whose tables are extracted
    #[serde(default = "defaults::detail_sections")]
    pub detail_sections: Vec<String>,

    /// Detail page header introducing the synopsis text
    #[serde(default = "defaults::synopsis_header")]
    pub synopsis_header: String,

    /// Labels that may carry each typed detail field
    #[serde(default)]
    pub fields: FieldAliases,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            listing_row: defaults::listing_row(),
            listing_link: defaults::listing_link(),
            pagination_link: defaults::pagination_link(),
            next_label: defaults::next_label(),
            disabled_class: defaults::disabled_class(),
            detail_sections: defaults::detail_sections(),
            synopsis_header: defaults::synopsis_header(),
            fields: FieldAliases::default(),
        }
    }
}

/// Label aliases for the typed detail fields, tried in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldAliases {
    #[serde(default = "defaults::title_labels")]
    pub title: Vec<String>,
    #[serde(default = "defaults::agency_labels")]
    pub agency: Vec<String>,
    #[serde(default = "defaults::amount_labels")]
    pub amount: Vec<String>,
    #[serde(default = "defaults::due_date_labels")]
    pub due_date: Vec<String>,
}

impl Default for FieldAliases {
    fn default() -> Self {
        Self {
            title: defaults::title_labels(),
            agency: defaults::agency_labels(),
            amount: defaults::amount_labels(),
            due_date: defaults::due_date_labels(),
        }
    }
}

/// Bot-challenge detection rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiBotConfig {
    /// Case-insensitive substrings that mark page content as a challenge
    #[serde(default = "defaults::content_signatures")]
    pub content_signatures: Vec<String>,

    /// Substrings of the final URL that mean we were bounced
    #[serde(default = "defaults::url_signatures")]
    pub url_signatures: Vec<String>,
}

impl Default for AntiBotConfig {
    fn default() -> Self {
        Self {
            content_signatures: defaults::content_signatures(),
            url_signatures: defaults::url_signatures(),
        }
    }
}

/// Output file layout, relative to the storage directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "defaults::listing_file")]
    pub listing_file: String,

    #[serde(default = "defaults::detail_file")]
    pub detail_file: String,

    #[serde(default = "defaults::cursor_file")]
    pub cursor_file: String,

    /// Extra detail columns always present, before any discovered ones
    #[serde(default)]
    pub detail_columns: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            listing_file: defaults::listing_file(),
            detail_file: defaults::detail_file(),
            cursor_file: defaults::cursor_file(),
            detail_columns: Vec::new(),
        }
    }
}

mod defaults {
    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn base_url() -> String {
        "https://grants.gov".into()
    }
    pub fn listing_url() -> String {
        "https://grants.gov/search-grants?page={page}".into()
    }
    pub fn max_stale_pages() -> usize {
        3
    }

    // Resilience defaults
    pub fn max_retries() -> u32 {
        3
    }
    pub fn max_blocked_retries() -> u32 {
        2
    }
    pub fn base_backoff() -> f64 {
        2.0
    }
    pub fn max_backoff() -> f64 {
        60.0
    }
    pub fn jitter() -> f64 {
        1.0
    }
    pub fn pacing_min() -> f64 {
        1.5
    }
    pub fn pacing_max() -> f64 {
        4.0
    }
    pub fn blocked_cooldown() -> f64 {
        90.0
    }
    pub fn operation_timeout() -> u64 {
        45
    }
    pub fn slowdown_factor() -> f64 {
        1.5
    }
    pub fn max_slowdown() -> f64 {
        4.0
    }

    // Render defaults
    pub fn ready_selector() -> String {
        "body".into()
    }
    pub fn render_wait() -> u64 {
        20
    }
    pub fn poll_interval() -> u64 {
        2000
    }
    pub fn max_polls() -> u32 {
        3
    }

    // Selector defaults
    pub fn listing_row() -> String {
        ".usa-table-container--scrollable table tbody tr".into()
    }
    pub fn listing_link() -> String {
        "td a.usa-link".into()
    }
    pub fn pagination_link() -> String {
        "a.usa-pagination__link".into()
    }
    pub fn next_label() -> String {
        "NEXT".into()
    }
    pub fn disabled_class() -> String {
        "disabled".into()
    }
    pub fn detail_sections() -> Vec<String> {
        vec![
            "General Information".into(),
            "Eligibility".into(),
            "Additional Information".into(),
        ]
    }
    pub fn synopsis_header() -> String {
        "Opportunity Synopsis".into()
    }
    pub fn title_labels() -> Vec<String> {
        vec![
            "Opportunity Title".into(),
            "Funding Opportunity Title".into(),
            "Title".into(),
        ]
    }
    pub fn agency_labels() -> Vec<String> {
        vec!["Agency Name".into(), "Agency".into()]
    }
    pub fn amount_labels() -> Vec<String> {
        vec![
            "Award Ceiling".into(),
            "Estimated Total Program Funding".into(),
            "Amount".into(),
        ]
    }
    pub fn due_date_labels() -> Vec<String> {
        vec![
            "Current Closing Date for Applications".into(),
            "Closing Date".into(),
            "Due Date".into(),
        ]
    }

    // Anti-bot defaults
    pub fn content_signatures() -> Vec<String> {
        vec![
            "captcha".into(),
            "access denied".into(),
            "unusual traffic".into(),
            "are you a robot".into(),
            "request blocked".into(),
        ]
    }
    pub fn url_signatures() -> Vec<String> {
        vec!["page-not-found".into()]
    }

    // Output defaults
    pub fn listing_file() -> String {
        "grant_ids.csv".into()
    }
    pub fn detail_file() -> String {
        "grant_details.csv".into()
    }
    pub fn cursor_file() -> String {
        "cursor.json".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [crawler]
            max_pages = 5

            [resilience]
            max_retries = 4
            pacing_min_seconds = 0.0
            pacing_max_seconds = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.crawler.page_limit(), Some(5));
        assert_eq!(config.resilience.max_retries, 4);
        assert_eq!(config.resilience.max_blocked_retries, 2);
        assert_eq!(config.output.listing_file, "grant_ids.csv");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sample_config_parses() {
        let config: Config = toml::from_str(include_str!("../../storage/config.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.selectors.fields.title.len(), 3);
        assert_eq!(config.resilience.blocked_budget(), 2);
    }

    #[test]
    fn test_listing_page_url() {
        let crawler = CrawlerConfig::default();
        assert_eq!(
            crawler.listing_page_url(3),
            "https://grants.gov/search-grants?page=3"
        );
        assert_eq!(crawler.page_limit(), None);
    }

    #[test]
    fn test_validate_rejects_inverted_pacing() {
        let mut config = Config::default();
        config.resilience.pacing_min_seconds = 5.0;
        config.resilience.pacing_max_seconds = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut config = Config::default();
        config.resilience.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_listing_url_must_be_absolute() {
        let mut config = Config::default();
        config.crawler.listing_url = "https://grants.gov/search-grants".into();
        assert!(config.validate().is_ok());

        config.crawler.listing_url = "/search-grants?page={page}".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_stale_pages_and_polls() {
        let mut config = Config::default();
        config.crawler.max_stale_pages = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.render.max_polls = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_durations_saturate() {
        let mut config = Config::default();
        config.resilience.max_backoff_seconds = 1e20;
        config.resilience.blocked_cooldown_seconds = 1e20;
        assert!(config.validate().is_ok());
        assert_eq!(config.resilience.max_backoff(), Duration::MAX);
        assert_eq!(config.resilience.blocked_cooldown(), Duration::MAX);
    }

    #[test]
    fn test_blocked_budget_never_exceeds_retries() {
        let mut resilience = ResilienceConfig::default();
        resilience.max_retries = 1;
        resilience.max_blocked_retries = 5;
        assert_eq!(resilience.blocked_budget(), 1);

        resilience.max_retries = 4;
        resilience.max_blocked_retries = 0;
        assert_eq!(resilience.blocked_budget(), 1);
    }
}
