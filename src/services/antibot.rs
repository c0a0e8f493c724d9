//! Bot-challenge detection.
//!
//! Recognizes pages that are really a challenge, a throttle notice or a
//! bounce to a not-found page, so they are retried with a cooldown instead
//! of being parsed as empty results.

use scraper::Html;

use crate::error::FetchError;
use crate::models::AntiBotConfig;
use crate::services::RenderedPage;

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Detects anti-automation responses in fetched pages.
#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    content_signatures: Vec<String>,
    url_signatures: Vec<String>,
}

impl ChallengeDetector {
    pub fn new(config: &AntiBotConfig) -> Self {
        Self {
            content_signatures: config
                .content_signatures
                .iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            url_signatures: config
                .url_signatures
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// Return the matched signature if the page is a challenge.
    pub fn detect(&self, page: &RenderedPage) -> Option<String> {
        if let Some(sig) = self.url_signatures.iter().find(|s| page.url.contains(s.as_str())) {
            return Some(format!("redirected to {}", sig));
        }

        if self.content_signatures.is_empty() {
            return None;
        }

        let text = visible_text(&page.html).to_lowercase();
        self.content_signatures
            .iter()
            .find(|sig| text.contains(sig.as_str()))
            .map(|sig| format!("content matched '{}'", sig))
    }

    /// Pass the page through, or turn it into a `Blocked` error.
    pub fn screen(&self, page: RenderedPage) -> Result<RenderedPage, FetchError> {
        match self.detect(&page) {
            Some(signature) => Err(FetchError::blocked(page.url, signature)),
            None => Ok(page),
        }
    }
}

/// Text a reader would see, skipping script and style bodies.
fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();

    for node in document.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .is_some_and(|name| HIDDEN_ELEMENTS.contains(&name.as_str()));
        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> ChallengeDetector {
        ChallengeDetector::new(&AntiBotConfig::default())
    }

    #[test]
    fn test_detects_captcha_text() {
        let page = RenderedPage::new(
            "https://grants.gov/search-grants",
            "<html><body><h1>Please complete the CAPTCHA</h1></body></html>",
        );
        let signature = detector().detect(&page).unwrap();
        assert!(signature.contains("captcha"));
    }

    #[test]
    fn test_ignores_script_bodies() {
        let page = RenderedPage::new(
            "https://grants.gov/search-grants",
            r#"<html><head><script>loadCaptcha();</script></head>
               <body><table class="usa-table"></table></body></html>"#,
        );
        assert!(detector().detect(&page).is_none());
    }

    #[test]
    fn test_detects_not_found_redirect() {
        let page = RenderedPage::new(
            "https://grants.gov/page-not-found",
            "<html><body>Sorry</body></html>",
        );
        let err = detector().screen(page).unwrap_err();
        assert!(matches!(err, FetchError::Blocked { .. }));
    }

    #[test]
    fn test_clean_page_passes() {
        let page = RenderedPage::new("https://grants.gov/x", "<p>Grant listing</p>");
        assert_eq!(detector().screen(page.clone()).unwrap(), page);
    }
}
