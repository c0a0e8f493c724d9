//! Utility functions and helpers.

pub mod http;

use std::time::Duration;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Seconds as a `Duration`, saturating instead of panicking.
///
/// Values too large to represent become `Duration::MAX`; negative or NaN
/// values become zero.
pub fn duration_from_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_secs_saturates() {
        assert_eq!(duration_from_secs(1.5), Duration::from_millis(1500));
        assert_eq!(duration_from_secs(1e20), Duration::MAX);
        assert_eq!(duration_from_secs(f64::INFINITY), Duration::MAX);
        assert_eq!(duration_from_secs(-3.0), Duration::ZERO);
        assert_eq!(duration_from_secs(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://grants.gov").unwrap();
        assert_eq!(
            resolve_url(&base, "/search-results-detail/350117"),
            "https://grants.gov/search-results-detail/350117"
        );
        assert_eq!(
            resolve_url(&base, "search-grants?page=2"),
            "https://grants.gov/search-grants?page=2"
        );
        assert_eq!(
            resolve_url(&base, "https://www.grants.gov/x"),
            "https://www.grants.gov/x"
        );
    }
}
