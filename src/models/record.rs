//! Records produced by the two crawl phases.

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An opportunity discovered on a listing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingRecord {
    /// Public opportunity number
    pub opportunity_id: String,

    /// Absolute URL of the detail page
    pub detail_url: String,
}

impl ListingRecord {
    pub fn new(opportunity_id: impl Into<String>, detail_url: impl Into<String>) -> Self {
        Self {
            opportunity_id: opportunity_id.into(),
            detail_url: detail_url.into(),
        }
    }
}

/// Full record extracted from a detail page.
///
/// Typed fields are nullable: a page that lacks one still yields a record.
/// Anything without a typed slot is kept in `extra_fields` in page order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetailRecord {
    pub opportunity_id: String,
    /// Detail page the record was read from, joining it back to the listing
    pub detail_url: String,
    pub title: Option<String>,
    pub agency: Option<String>,
    pub amount: Option<f64>,
    pub due_date: Option<NaiveDate>,
    pub extra_fields: IndexMap<String, String>,
}

impl DetailRecord {
    /// Empty record for an opportunity, all fields null.
    pub fn empty(opportunity_id: impl Into<String>) -> Self {
        Self {
            opportunity_id: opportunity_id.into(),
            ..Self::default()
        }
    }

    /// Amount rendered for tabular output.
    pub fn amount_text(&self) -> String {
        self.amount.map(format_amount).unwrap_or_default()
    }

    /// Due date rendered as an ISO date.
    pub fn due_date_text(&self) -> String {
        self.due_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }
}

/// Whole amounts print without decimals, anything else with cents.
fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 && amount.abs() < 1e15 {
        format!("{:.0}", amount)
    } else {
        format!("{:.2}", amount)
    }
}
