// src/services/extract.rs

//! Listing and detail page extraction.
//!
//! Extraction never fails on page content: missing or malformed structure
//! turns into skipped rows, `has_next = false` or null fields plus warnings.
//! Only invalid configured selectors are reported as errors, at construction.

use std::fmt;

use indexmap::IndexMap;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{DetailRecord, FieldAliases, SelectorConfig};
use crate::services::validate::{normalize_amount, normalize_due_date};
use crate::utils::resolve_url;

/// Key under which the raw due-date text is kept.
pub const DUE_DATE_RAW_KEY: &str = "Due Date (raw)";

/// Key under which the synopsis text is kept.
pub const SYNOPSIS_KEY: &str = "Synopsis";

/// One opportunity link found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub id: String,
    pub url: String,
}

/// Everything extracted from a single listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub entries: Vec<ListingEntry>,
    pub has_next: bool,
    /// Absolute URL of the next page, when the link carries a usable href
    pub next_href: Option<String>,
    pub warnings: Vec<String>,
}

/// What went wrong with a detail field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    Unparsable(String),
}

/// Non-fatal extraction problem on a detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionWarning {
    pub field: &'static str,
    pub problem: FieldProblem,
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            FieldProblem::Missing => write!(f, "{} not found", self.field),
            FieldProblem::Unparsable(raw) => write!(f, "{} unparsable: '{}'", self.field, raw),
        }
    }
}

/// Detail record plus the warnings raised while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailExtraction {
    pub record: DetailRecord,
    pub warnings: Vec<ExtractionWarning>,
}

/// Extracts opportunity rows and the next-page affordance.
#[derive(Debug)]
pub struct ListingExtractor {
    row: Selector,
    link: Selector,
    pagination: Option<Selector>,
    next_label: String,
    disabled_class: String,
    base: Url,
}

impl ListingExtractor {
    pub fn new(selectors: &SelectorConfig, base_url: &str) -> Result<Self> {
        let pagination = match parse_selector(&selectors.pagination_link) {
            Ok(sel) => Some(sel),
            Err(e) => {
                log::warn!("{}; pagination disabled", e);
                None
            }
        };

        Ok(Self {
            row: parse_selector(&selectors.listing_row)?,
            link: parse_selector(&selectors.listing_link)?,
            pagination,
            next_label: selectors.next_label.to_lowercase(),
            disabled_class: selectors.disabled_class.clone(),
            base: Url::parse(base_url)?,
        })
    }

    pub fn extract_listing(&self, html: &str) -> ListingPage {
        let document = Html::parse_document(html);
        let mut page = ListingPage::default();

        for (index, row) in document.select(&self.row).enumerate() {
            let Some(link) = row.select(&self.link).next() else {
                page.warnings
                    .push(format!("row {}: no opportunity link, skipped", index + 1));
                continue;
            };

            let id = normalized_text(link);
            let href = link.value().attr("href").map(str::trim).unwrap_or("");
            if href.is_empty() {
                page.warnings
                    .push(format!("row {} ({}): empty href, skipped", index + 1, id));
                continue;
            }

            page.entries.push(ListingEntry {
                id,
                url: resolve_url(&self.base, href),
            });
        }

        if let Some(next) = self.find_next(&document) {
            page.has_next = true;
            page.next_href = next
                .value()
                .attr("href")
                .map(str::trim)
                .filter(|h| is_navigable(h))
                .map(|h| resolve_url(&self.base, h));
        }

        page
    }

    fn find_next<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        let selector = self.pagination.as_ref()?;
        document.select(selector).find(|link| {
            normalized_text(*link).to_lowercase().contains(&self.next_label)
                && !self.is_disabled(link)
        })
    }

    fn is_disabled(&self, link: &ElementRef) -> bool {
        let element = link.value();
        element.classes().any(|c| c == self.disabled_class)
            || element.attr("aria-disabled") == Some("true")
            || element.attr("disabled").is_some()
    }
}

/// Extracts a [`DetailRecord`] from a detail page.
#[derive(Debug)]
pub struct DetailExtractor {
    headers_and_tables: Selector,
    headers_and_divs: Selector,
    rows: Selector,
    cells: Selector,
    links: Selector,
    sections: Vec<String>,
    synopsis_header: String,
    aliases: FieldAliases,
}

impl DetailExtractor {
    pub fn new(selectors: &SelectorConfig) -> Result<Self> {
        Ok(Self {
            headers_and_tables: parse_selector("h2, table")?,
            headers_and_divs: parse_selector("h2, div")?,
            rows: parse_selector("tr")?,
            cells: parse_selector("th, td")?,
            links: parse_selector("a[href]")?,
            sections: selectors
                .detail_sections
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            synopsis_header: selectors.synopsis_header.to_lowercase(),
            aliases: selectors.fields.clone(),
        })
    }

    pub fn extract_detail(&self, opportunity_id: &str, html: &str) -> DetailExtraction {
        let document = Html::parse_document(html);
        let mut fields = self.section_fields(&document);
        if let Some(synopsis) = self.synopsis(&document) {
            fields.entry(SYNOPSIS_KEY.to_string()).or_insert(synopsis);
        }

        let mut warnings = Vec::new();
        let mut record = DetailRecord::empty(opportunity_id);

        record.title = take_field(&mut fields, &self.aliases.title, "title", &mut warnings)
            .map(|(_, value)| value);
        record.agency = take_field(&mut fields, &self.aliases.agency, "agency", &mut warnings)
            .map(|(_, value)| value);

        if let Some((label, raw)) =
            take_field(&mut fields, &self.aliases.amount, "amount", &mut warnings)
        {
            record.amount = normalize_amount(&raw);
            if record.amount.is_none() {
                warnings.push(ExtractionWarning {
                    field: "amount",
                    problem: FieldProblem::Unparsable(raw.clone()),
                });
                fields.insert(label, raw);
            }
        }

        if let Some((_, raw)) =
            take_field(&mut fields, &self.aliases.due_date, "due_date", &mut warnings)
        {
            record.due_date = normalize_due_date(&raw);
            if record.due_date.is_none() {
                warnings.push(ExtractionWarning {
                    field: "due_date",
                    problem: FieldProblem::Unparsable(raw.clone()),
                });
            }
            fields.insert(DUE_DATE_RAW_KEY.to_string(), raw);
        }

        record.extra_fields = fields;
        DetailExtraction { record, warnings }
    }

    /// Label/value pairs from the tables under the configured section headers.
    fn section_fields(&self, document: &Html) -> IndexMap<String, String> {
        let mut fields = IndexMap::new();
        let mut in_section = self.sections.is_empty();

        for element in document.select(&self.headers_and_tables) {
            if element.value().name() == "h2" {
                let header = normalized_text(element).to_lowercase();
                in_section = self.sections.is_empty()
                    || self.sections.iter().any(|s| header.contains(s.as_str()));
                continue;
            }
            if !in_section {
                continue;
            }

            for row in element.select(&self.rows) {
                let cells: Vec<ElementRef> = row.select(&self.cells).collect();
                let [label, value] = cells.as_slice() else {
                    continue;
                };
                let key = normalized_text(*label).trim_end_matches(':').trim().to_string();
                if key.is_empty() {
                    continue;
                }
                let value = self.cell_value(*value);
                fields.entry(key).or_insert(value);
            }
        }
        fields
    }

    /// Cell text, line by line, followed by any link targets not already shown.
    fn cell_value(&self, cell: ElementRef) -> String {
        let mut lines = text_lines(cell);
        for link in cell.select(&self.links) {
            if let Some(href) = link.value().attr("href").map(str::trim) {
                if is_navigable(href) && !lines.iter().any(|l| l.contains(href)) {
                    lines.push(href.to_string());
                }
            }
        }
        lines.join("\n")
    }

    fn synopsis(&self, document: &Html) -> Option<String> {
        let mut after_header = false;
        for element in document.select(&self.headers_and_divs) {
            if element.value().name() == "h2" {
                after_header = normalized_text(element)
                    .to_lowercase()
                    .contains(&self.synopsis_header);
                continue;
            }
            if after_header {
                let text = text_lines(element).join("\n");
                return (!text.is_empty()).then_some(text);
            }
        }
        None
    }
}

/// Remove the first alias present from `fields`, returning its label and value.
fn take_field(
    fields: &mut IndexMap<String, String>,
    aliases: &[String],
    name: &'static str,
    warnings: &mut Vec<ExtractionWarning>,
) -> Option<(String, String)> {
    let found = aliases.iter().find_map(|alias| {
        fields
            .keys()
            .position(|key| key.eq_ignore_ascii_case(alias))
    });

    let taken = found
        .and_then(|index| fields.shift_remove_index(index))
        .filter(|(_, value)| !value.trim().is_empty());

    if taken.is_none() {
        warnings.push(ExtractionWarning {
            field: name,
            problem: FieldProblem::Missing,
        });
    }
    taken
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Element text with runs of whitespace collapsed.
fn normalized_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Non-empty trimmed text lines of an element.
fn text_lines(element: ElementRef) -> Vec<String> {
    element
        .text()
        .flat_map(str::lines)
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

fn is_navigable(href: &str) -> bool {
    !href.is_empty() && href != "#" && !href.to_ascii_lowercase().starts_with("javascript:")
}
