#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Tabular persistence for harvested listings.
//!
//! A [`TabularSink`] stores named tables and always overwrites a location
//! wholesale; there is no append-in-place. [`CsvSink`] keeps one CSV file
//! per location inside an output directory. The [`merge`] module combines
//! several of those files into one consolidated dataset.

pub mod merge;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stayscout_listing_models::{ContactColumns, EnrichedRecord};
use strum_macros::{AsRefStr, Display, EnumString};

/// File name of the cumulative dataset.
pub const TOTAL_FILE: &str = "total_accommodations.csv";

/// Suffix of every per-locality dataset.
const LOCALITY_FILE_SUFFIX: &str = "_accommodations.csv";

/// Errors reading or writing tabular data.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// File-system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV reader or writer failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The file parsed but is not a usable table.
    #[error("malformed table at {location}: {message}")]
    Malformed {
        /// The offending location.
        location: String,
        /// What is wrong with it.
        message: String,
    },
}

/// A header row plus data rows, all cells as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Column names in order.
    pub headers: Vec<String>,
    /// Data rows. Rows read from disk may be shorter or longer than
    /// `headers`.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds the primary output table for a set of enriched records.
    #[must_use]
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a EnrichedRecord>,
        columns: ContactColumns,
    ) -> Self {
        Self {
            headers: columns.headers().iter().map(|h| (*h).to_owned()).collect(),
            rows: records
                .into_iter()
                .map(|record| record.to_row(columns))
                .collect(),
        }
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Named-location table storage.
pub trait TabularSink: Send + Sync {
    /// Replaces whatever is stored at `location` with `table`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the table cannot be stored.
    fn write(&self, location: &str, table: &Table) -> Result<(), SinkError>;

    /// Reads back the table stored at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the location is missing or unreadable.
    fn read_all(&self, location: &str) -> Result<Table, SinkError>;
}

/// Which dataset files a harvest keeps up to date.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SinkLayout {
    /// One file per locality, rewritten after every listing.
    PerLocality,
    /// A single cumulative file, rewritten after every listing.
    Cumulative,
    /// Per-locality files after every listing, plus the cumulative file
    /// after every locality.
    #[default]
    Both,
}

impl SinkLayout {
    /// Whether per-locality files are written.
    #[must_use]
    pub const fn writes_locality_files(self) -> bool {
        matches!(self, Self::PerLocality | Self::Both)
    }

    /// Whether the cumulative file is written.
    #[must_use]
    pub const fn writes_cumulative(self) -> bool {
        matches!(self, Self::Cumulative | Self::Both)
    }

    /// Whether the cumulative file is rewritten after every listing rather
    /// than once per locality.
    #[must_use]
    pub const fn cumulative_per_listing(self) -> bool {
        matches!(self, Self::Cumulative)
    }
}

/// File name of a locality's dataset, with path separators and other
/// characters that are unsafe in file names replaced by `_`.
#[must_use]
pub fn locality_file(locality: &str) -> String {
    let safe: String = locality
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{safe}{LOCALITY_FILE_SUFFIX}")
}

/// [`TabularSink`] storing each location as a CSV file in one directory.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    /// Creates a sink writing under `dir`. The directory is created on the
    /// first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `location`.
    #[must_use]
    pub fn path_for(&self, location: &str) -> PathBuf {
        self.dir.join(location)
    }
}

impl TabularSink for CsvSink {
    fn write(&self, location: &str, table: &Table) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(location);
        write_csv(&path, table)?;
        log::debug!("Wrote {} rows to {}", table.len(), path.display());
        Ok(())
    }

    fn read_all(&self, location: &str) -> Result<Table, SinkError> {
        read_csv(&self.path_for(location))
    }
}

/// Writes `table` to `path` as CSV, replacing any existing file.
///
/// # Errors
///
/// Returns [`SinkError`] if the file cannot be written or a row length
/// differs from the header length.
pub fn write_csv(path: &Path, table: &Table) -> Result<(), SinkError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a CSV file with a header row.
///
/// Ragged rows are accepted as-is; cells are trimmed.
///
/// # Errors
///
/// Returns [`SinkError::Malformed`] for a file without a header row and
/// [`SinkError::Csv`] for unparsable content.
pub fn read_csv(path: &Path) -> Result<Table, SinkError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(SinkError::Malformed {
            location: path.display().to_string(),
            message: "no header row".to_owned(),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|cell| cell.trim().to_owned()).collect());
    }

    Ok(Table { headers, rows })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use stayscout_listing_models::{ContactQuery, DetailFields, ListingStub};

    use super::*;

    fn record(name: &str) -> EnrichedRecord {
        EnrichedRecord::new(
            ListingStub::new(
                Some(name.to_string()),
                "Venice",
                Some(format!("https://www.booking.com/hotel/it/{name}.html")),
            ),
            DetailFields {
                address: "Via Roma 1, 30100 Venezia, Italy".to_string(),
                property_type: "Hotel".to_string(),
            },
            ContactQuery {
                emails: BTreeSet::from(["info@hotel.it".to_string()]),
                phones: BTreeSet::new(),
            },
        )
    }

    #[test]
    fn write_overwrites_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out"));
        let location = locality_file("Venice");

        let two = [record("a"), record("b")];
        sink.write(&location, &Table::from_records(&two, ContactColumns::First))
            .unwrap();
        let one = [record("c")];
        sink.write(&location, &Table::from_records(&one, ContactColumns::First))
            .unwrap();

        let table = sink.read_all(&location).unwrap();
        assert_eq!(
            table.headers,
            ["Name", "City", "Link", "Address", "Property Type", "Email", "Phone Number"]
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0][0], "c");
        assert_eq!(table.rows[0][3], "Via Roma 1, 30100 Venezia, Italy");
        assert_eq!(table.rows[0][6], "unknown");
    }

    #[test]
    fn empty_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "").unwrap();
        assert!(matches!(read_csv(&path), Err(SinkError::Malformed { .. })));
    }

    #[test]
    fn missing_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        assert!(sink.read_all("nope.csv").is_err());
    }

    #[test]
    fn locality_file_names_are_sanitized() {
        assert_eq!(locality_file("Venice"), "Venice_accommodations.csv");
        assert_eq!(
            locality_file("Reggio di Calabria/Nord"),
            "Reggio di Calabria_Nord_accommodations.csv"
        );
        assert_eq!(locality_file(r"..\x"), ".._x_accommodations.csv");
    }

    #[test]
    fn layout_flags() {
        assert!(SinkLayout::Both.writes_locality_files());
        assert!(SinkLayout::Both.writes_cumulative());
        assert!(!SinkLayout::Both.cumulative_per_listing());
        assert!(!SinkLayout::PerLocality.writes_cumulative());
        assert!(SinkLayout::Cumulative.cumulative_per_listing());
        assert_eq!(
            "per_locality".parse::<SinkLayout>().unwrap(),
            SinkLayout::PerLocality
        );
    }
}
