//! Field validation and normalization rules.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

/// Longest opportunity id accepted.
pub const MAX_ID_LEN: usize = 64;

static ID_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/\-]*$").expect("opportunity id pattern is valid")
});

/// Formats tried on a single whitespace-free token.
const TOKEN_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y"];

/// Formats tried on three consecutive tokens ("Mar 15, 2025").
const PHRASE_DATE_FORMATS: [&str; 3] = ["%B %d, %Y", "%B %d %Y", "%d %B %Y"];

/// Check that an opportunity id can be joined across phases.
pub fn validate_opportunity_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("opportunity id is empty".to_string());
    }
    if id.len() > MAX_ID_LEN {
        return Err(format!(
            "opportunity id is longer than {} characters",
            MAX_ID_LEN
        ));
    }
    if !ID_SHAPE.is_match(id) {
        return Err(format!("opportunity id '{}' has unexpected characters", id));
    }
    Ok(())
}

/// Normalize a monetary string such as `$1,250,000` to a number.
///
/// Only the first numeric run counts, so trailing notes like
/// "(2 awards)" do not leak into the value.
pub fn normalize_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .filter(|c| *c != ',')
        .collect();
    let cleaned = cleaned.trim_end_matches('.');

    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Find the first date in free text and return it as a calendar date.
pub fn normalize_due_date(raw: &str) -> Option<NaiveDate> {
    let tokens: Vec<&str> = raw
        .split_whitespace()
        .map(|t| t.trim_end_matches(['.', ';', ')']))
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        let bare = token.trim_end_matches(',');
        if let Some(date) = parse_with(bare, &TOKEN_DATE_FORMATS) {
            return Some(date);
        }

        if let Some(window) = tokens.get(i..i + 3) {
            let phrase = format!(
                "{} {} {}",
                window[0],
                window[1],
                window[2].trim_end_matches(',')
            );
            if let Some(date) = parse_with(&phrase, &PHRASE_DATE_FORMATS) {
                return Some(date);
            }
        }
    }
    None
}

fn parse_with(text: &str, formats: &[&str]) -> Option<NaiveDate> {
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(validate_opportunity_id("G-100").is_ok());
        assert!(validate_opportunity_id("HHS-2025-ACF-OCS-EE-0071").is_ok());
        assert!(validate_opportunity_id("NSF_24.512/A").is_ok());
    }

    #[test]
    fn test_invalid_ids() {
        assert!(validate_opportunity_id("").is_err());
        assert!(validate_opportunity_id("-G100").is_err());
        assert!(validate_opportunity_id("G 100").is_err());
        assert!(validate_opportunity_id("G<100>").is_err());
        assert!(validate_opportunity_id(&"A".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_normalize_amount() {
        assert_eq!(normalize_amount("$1,250,000"), Some(1_250_000.0));
        assert_eq!(normalize_amount("USD 99.50"), Some(99.5));
        assert_eq!(normalize_amount("$500,000."), Some(500_000.0));
        assert_eq!(
            normalize_amount("$1,250,000 (per year, 2 awards)"),
            Some(1_250_000.0)
        );
        assert_eq!(normalize_amount("N/A"), None);
        assert_eq!(normalize_amount("1.2.3"), None);
    }

    #[test]
    fn test_normalize_due_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 15);
        assert_eq!(normalize_due_date("2025-03-15"), expected);
        assert_eq!(normalize_due_date("03/15/2025"), expected);
        assert_eq!(normalize_due_date("Mar 15, 2025"), expected);
        assert_eq!(normalize_due_date("March 15, 2025"), expected);
    }

    #[test]
    fn test_normalize_due_date_in_sentence() {
        let raw = "Mar 15, 2025 Electronically submitted applications must be \
                   submitted no later than 11:59 p.m., ET, on the listed date.";
        assert_eq!(normalize_due_date(raw), NaiveDate::from_ymd_opt(2025, 3, 15));
    }

    #[test]
    fn test_normalize_due_date_unparsable() {
        assert_eq!(normalize_due_date("Continuous"), None);
        assert_eq!(normalize_due_date(""), None);
    }
}
