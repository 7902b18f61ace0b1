//! Consolidation of partial outputs into one dataset.
//!
//! Every `*.csv` file in the input directory is read, oldest first by
//! modification time (file name breaks ties), and the rows are
//! concatenated under the union of all column sets. Blank and missing
//! cells become `"N/A"`. Rows are never deduplicated, so overlapping runs
//! keep their duplicates.
//!
//! A harvest with the `both` layout leaves a cumulative
//! [`TOTAL_FILE`](crate::TOTAL_FILE) next to the locality files it repeats.
//! That file is left out whenever other datasets are present, unless the
//! caller asks for it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use stayscout_listing_models::NOT_AVAILABLE;

use crate::{SinkError, TOTAL_FILE, Table, read_csv, write_csv};

/// Result of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The consolidated dataset was written.
    Merged {
        /// Input files that were read successfully.
        files: usize,
        /// Rows in the consolidated dataset.
        rows: usize,
    },
    /// No input file could be read; nothing was written.
    NothingToMerge,
}

/// Merges every CSV file in `input_dir` into `output`.
///
/// `output` itself is skipped if it lives in `input_dir`, so re-running a
/// merge over unchanged inputs produces the same content. Unreadable files
/// are skipped with a warning. The cumulative file is only read when it is
/// the sole dataset or `include_total` is set.
///
/// # Errors
///
/// Returns [`SinkError`] if `input_dir` cannot be listed or `output`
/// cannot be written.
pub fn merge_dir(
    input_dir: &Path,
    output: &Path,
    include_total: bool,
) -> Result<MergeOutcome, SinkError> {
    let mut inputs = list_inputs(input_dir, output)?;
    let is_total = |path: &PathBuf| path.file_name().is_some_and(|name| name == TOTAL_FILE);
    if !include_total && inputs.iter().any(|path| !is_total(path)) {
        inputs.retain(|path| {
            let keep = !is_total(path);
            if !keep {
                log::info!("Leaving out cumulative dataset {}", path.display());
            }
            keep
        });
    }
    log::info!(
        "Merging {} files from {} into {}",
        inputs.len(),
        input_dir.display(),
        output.display()
    );

    let mut tables = Vec::with_capacity(inputs.len());
    for path in &inputs {
        match read_csv(path) {
            Ok(table) => {
                log::debug!("{}: {} rows", path.display(), table.len());
                tables.push(table);
            }
            Err(e) => log::warn!("Skipping unreadable file {}: {e}", path.display()),
        }
    }

    if tables.is_empty() {
        log::warn!("Nothing to merge in {}", input_dir.display());
        return Ok(MergeOutcome::NothingToMerge);
    }

    let merged = merge_tables(&tables);
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    write_csv(output, &merged)?;

    log::info!(
        "Merged {} rows from {} files into {}",
        merged.len(),
        tables.len(),
        output.display()
    );
    Ok(MergeOutcome::Merged {
        files: tables.len(),
        rows: merged.len(),
    })
}

/// Concatenates `tables` in order under the union of their headers.
///
/// Headers keep their first-seen order. A cell that is blank or absent
/// from its source row becomes `"N/A"`.
#[must_use]
pub fn merge_tables(tables: &[Table]) -> Table {
    let mut headers: Vec<String> = Vec::new();
    for header in tables.iter().flat_map(|t| &t.headers) {
        if !header.is_empty() && !headers.contains(header) {
            headers.push(header.clone());
        }
    }

    let mut rows = Vec::new();
    for table in tables {
        let columns: Vec<Option<usize>> = headers
            .iter()
            .map(|h| table.headers.iter().position(|own| own == h))
            .collect();
        rows.extend(table.rows.iter().map(|row| {
            columns
                .iter()
                .map(|column| {
                    column
                        .and_then(|i| row.get(i))
                        .map(|cell| cell.trim())
                        .filter(|cell| !cell.is_empty())
                        .unwrap_or(NOT_AVAILABLE)
                        .to_owned()
                })
                .collect()
        }));
    }

    Table { headers, rows }
}

/// CSV files in `dir` other than `output`, oldest first.
fn list_inputs(dir: &Path, output: &Path) -> Result<Vec<PathBuf>, SinkError> {
    let output = output.canonicalize().ok();
    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv || !path.is_file() {
            continue;
        }
        if output.is_some() && path.canonicalize().ok() == output {
            continue;
        }

        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .unwrap_or_else(|e| {
                log::warn!("No modification time for {}: {e}", path.display());
                SystemTime::UNIX_EPOCH
            });
        files.push((modified, path));
    }

    files.sort_by(|(a_time, a_path), (b_time, b_path)| {
        a_time
            .cmp(b_time)
            .then_with(|| a_path.file_name().cmp(&b_path.file_name()))
    });
    Ok(files.into_iter().map(|(_, path)| path).collect())
}
