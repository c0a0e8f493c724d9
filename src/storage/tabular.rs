// src/storage/tabular.rs

//! CSV files for both phases.
//!
//! The listing file is Phase 1's output and Phase 2's input. The detail
//! file has a fixed leading block of columns followed by every
//! `extra_fields` key seen during the run, in first-seen order.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use indexmap::IndexSet;

use crate::error::{AppError, Result};
use crate::models::{DetailRecord, ListingRecord};
use crate::storage::RecordSink;

pub const LISTING_HEADER: [&str; 2] = ["Opportunity Number", "Detail Page URL"];

pub const DETAIL_HEADER: [&str; 6] = [
    "Opportunity Number",
    "Detail Page URL",
    "Title",
    "Agency",
    "Amount",
    "Due Date",
];

/// Appends listing records, flushing after each one.
pub struct ListingCsvWriter {
    writer: csv::Writer<File>,
}

impl ListingCsvWriter {
    /// Start a fresh listing file, replacing any previous one.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_parent(path)?;
        let mut writer = csv::Writer::from_writer(File::create(path)?);
        writer.write_record(LISTING_HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    /// Continue an existing listing file, writing the header only if it is new.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_parent(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;

        let mut writer = csv::Writer::from_writer(file);
        if is_empty {
            writer.write_record(LISTING_HEADER)?;
            writer.flush()?;
        }
        Ok(Self { writer })
    }
}

impl RecordSink<ListingRecord> for ListingCsvWriter {
    fn write(&mut self, record: &ListingRecord) -> Result<()> {
        self.writer
            .write_record([record.opportunity_id.as_str(), record.detail_url.as_str()])?;
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Row-by-row reader over a listing file.
pub struct ListingReader {
    records: csv::StringRecordsIntoIter<File>,
}

/// Open a listing file for Phase 2.
///
/// Rows with fewer than two columns come back as validation errors so the
/// caller can skip them and keep going.
pub fn read_listings(path: impl AsRef<Path>) -> Result<ListingReader> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    Ok(ListingReader {
        records: reader.into_records(),
    })
}

impl Iterator for ListingReader {
    type Item = Result<ListingRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.records.next()? {
            Ok(row) => row,
            Err(e) => return Some(Err(e.into())),
        };

        let line = row.position().map(|p| p.line()).unwrap_or_default();
        match (row.get(0), row.get(1)) {
            (Some(id), Some(url)) => Some(Ok(ListingRecord::new(id, url))),
            _ => Some(Err(AppError::validation(format!(
                "line {}: expected 2 columns, found {}",
                line,
                row.len()
            )))),
        }
    }
}

/// Streams detail records with a column set that grows as keys appear.
pub struct DetailCsvWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    columns: IndexSet<String>,
    /// Extra columns present in the header on disk
    written_columns: usize,
}

impl DetailCsvWriter {
    /// Start a fresh detail file with the fixed and static columns.
    pub fn create(path: impl Into<PathBuf>, static_columns: &[String]) -> Result<Self> {
        let path = path.into();
        ensure_parent(&path)?;

        let columns: IndexSet<String> = static_columns
            .iter()
            .filter(|c| !DETAIL_HEADER.contains(&c.as_str()))
            .cloned()
            .collect();

        let mut writer = detail_writer(File::create(&path)?);
        writer.write_record(header_row(&columns))?;
        writer.flush()?;

        Ok(Self {
            path,
            written_columns: columns.len(),
            writer,
            columns,
        })
    }

    /// Current extra columns, in output order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Rewrite the file so the header covers every column seen so far.
    fn rewrite_with_union_header(&mut self) -> Result<()> {
        self.writer.flush()?;
        let width = DETAIL_HEADER.len() + self.columns.len();
        log::info!(
            "Detail schema grew to {} columns, rewriting {}",
            width,
            self.path.display()
        );

        let tmp = self.path.with_extension("tmp");
        {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .from_path(&self.path)?;
            let mut out = detail_writer(File::create(&tmp)?);
            out.write_record(header_row(&self.columns))?;

            for row in reader.records() {
                let row = row?;
                let mut fields: Vec<&str> = row.iter().collect();
                fields.resize(width, "");
                out.write_record(&fields)?;
            }
            out.flush()?;
        }

        fs::rename(&tmp, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = detail_writer(file);
        self.written_columns = self.columns.len();
        Ok(())
    }
}

impl RecordSink<DetailRecord> for DetailCsvWriter {
    fn write(&mut self, record: &DetailRecord) -> Result<()> {
        for key in record.extra_fields.keys() {
            if !self.columns.contains(key) {
                log::debug!("New detail column: {}", key);
                self.columns.insert(key.clone());
            }
        }

        let mut row = vec![
            record.opportunity_id.clone(),
            record.detail_url.clone(),
            record.title.clone().unwrap_or_default(),
            record.agency.clone().unwrap_or_default(),
            record.amount_text(),
            record.due_date_text(),
        ];
        row.extend(self.columns.iter().map(|column| {
            record
                .extra_fields
                .get(column)
                .cloned()
                .unwrap_or_default()
        }));

        self.writer.write_record(&row)?;
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        if self.columns.len() > self.written_columns {
            self.rewrite_with_union_header()?;
        }
        Ok(())
    }
}

fn detail_writer(file: File) -> csv::Writer<File> {
    csv::WriterBuilder::new().flexible(true).from_writer(file)
}

fn header_row(columns: &IndexSet<String>) -> Vec<&str> {
    DETAIL_HEADER
        .iter()
        .copied()
        .chain(columns.iter().map(String::as_str))
        .collect()
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn detail(id: &str, extras: &[(&str, &str)]) -> DetailRecord {
        let mut record = DetailRecord::empty(id);
        for (k, v) in extras {
            record.extra_fields.insert(k.to_string(), v.to_string());
        }
        record
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect()
    }

    #[test]
    fn test_listing_file_feeds_phase_two() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grant_ids.csv");

        let mut writer = ListingCsvWriter::create(&path).unwrap();
        writer
            .write(&ListingRecord::new("G-100", "https://grants.gov/d/100"))
            .unwrap();
        writer
            .write(&ListingRecord::new("G-101", "https://grants.gov/d/101"))
            .unwrap();
        writer.finish().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.lines().next(),
            Some("Opportunity Number,Detail Page URL")
        );

        let records: Vec<_> = read_listings(&path).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].opportunity_id, "G-101");
        assert_eq!(records[1].detail_url, "https://grants.gov/d/101");
    }

    #[test]
    fn test_append_keeps_single_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("grant_ids.csv");

        let mut first = ListingCsvWriter::append(&path).unwrap();
        first.write(&ListingRecord::new("G-1", "u1")).unwrap();
        drop(first);

        let mut second = ListingCsvWriter::append(&path).unwrap();
        second.write(&ListingRecord::new("G-2", "u2")).unwrap();
        drop(second);

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "Opportunity Number");
        assert_eq!(rows[2], vec!["G-2", "u2"]);
    }

    #[test]
    fn test_short_rows_are_reported_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grant_ids.csv");
        fs::write(
            &path,
            "Opportunity Number,Detail Page URL\nG-1,u1\nG-2\nG-3,\nG-4,u4\n",
        )
        .unwrap();

        let results: Vec<_> = read_listings(&path).unwrap().collect();
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(AppError::Validation(_))));
        assert_eq!(results[2].as_ref().unwrap().detail_url, "");
        assert_eq!(results[3].as_ref().unwrap().opportunity_id, "G-4");
    }

    #[test]
    fn test_detail_writer_typed_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grant_details.csv");

        let mut record = detail("G-100", &[("Category", "Water")]);
        record.detail_url = "https://grants.gov/d/100".into();
        record.title = Some("Rural Water".into());
        record.amount = Some(1_250_000.0);
        record.due_date = NaiveDate::from_ymd_opt(2025, 3, 15);

        let mut writer = DetailCsvWriter::create(&path, &["Category".to_string()]).unwrap();
        writer.write(&record).unwrap();
        writer.finish().unwrap();

        let rows = read_rows(&path);
        assert_eq!(
            rows[0],
            vec![
                "Opportunity Number",
                "Detail Page URL",
                "Title",
                "Agency",
                "Amount",
                "Due Date",
                "Category"
            ]
        );
        assert_eq!(
            rows[1],
            vec![
                "G-100",
                "https://grants.gov/d/100",
                "Rural Water",
                "",
                "1250000",
                "2025-03-15",
                "Water"
            ]
        );
    }

    #[test]
    fn test_detail_header_is_union_of_observed_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grant_details.csv");

        let mut writer = DetailCsvWriter::create(&path, &[]).unwrap();
        writer.write(&detail("G-1", &[("Category", "Water")])).unwrap();
        writer
            .write(&detail("G-2", &[("Eligibility", "States"), ("Category", "Roads")]))
            .unwrap();
        writer.write(&detail("G-3", &[])).unwrap();
        writer.finish().unwrap();

        assert_eq!(writer.columns().collect::<Vec<_>>(), vec!["Category", "Eligibility"]);

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[0][6..], ["Category", "Eligibility"]);
        assert_eq!(&rows[1][6..], ["Water", ""]);
        assert_eq!(&rows[2][6..], ["Roads", "States"]);
        assert_eq!(&rows[3][6..], ["", ""]);
        assert!(rows.iter().all(|r| r.len() == 8));
    }

    #[test]
    fn test_detail_writes_continue_after_rewrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grant_details.csv");

        let mut writer = DetailCsvWriter::create(&path, &[]).unwrap();
        writer.write(&detail("G-1", &[("Category", "Water")])).unwrap();
        writer.finish().unwrap();
        writer.write(&detail("G-2", &[("Category", "Roads")])).unwrap();
        writer.finish().unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2][0], "G-2");
        assert_eq!(rows[2][6], "Roads");
    }
}
