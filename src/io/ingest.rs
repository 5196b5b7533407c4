//! CSV ingest for the observed spectrum.
//!
//! Turns a measurement CSV into a clean [`DataSeries`]:
//! - columns picked by header name (case-insensitive) or 0-based index
//! - a fixed number of leading/trailing data rows can be discarded
//!   (band edges are often unreliable)
//! - with a weight column, rows with weight <= 0 (flagged channels) are dropped
//! - unparseable rows are skipped and reported, never silently coerced

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;

use csv::StringRecord;

use crate::domain::{DataSeries, DatasetStats};
use crate::error::AppError;

/// A column selected by header name or position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl FromStr for ColumnRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("column reference is empty".to_string());
        }
        Ok(match s.parse::<usize>() {
            Ok(i) => ColumnRef::Index(i),
            Err(_) => ColumnRef::Name(s.to_string()),
        })
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRef::Index(i) => write!(f, "#{i}"),
            ColumnRef::Name(n) => write!(f, "'{n}'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub path: PathBuf,
    pub x_column: ColumnRef,
    pub y_column: ColumnRef,
    pub weight_column: Option<ColumnRef>,
    pub skip_head: usize,
    pub skip_tail: usize,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct IngestedData {
    pub series: DataSeries,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
    /// Rows dropped for a non-positive weight.
    pub rows_flagged: usize,
}

/// Load the spectrum named by `opts.path`.
pub fn load_series(opts: &IngestOptions) -> Result<IngestedData, AppError> {
    let file = File::open(&opts.path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to open CSV '{}': {e}", opts.path.display()),
        )
    })?;
    read_series(file, opts)
}

/// Same as [`load_series`] but from any reader (`opts.path` is ignored).
pub fn read_series<R: Read>(reader: R, opts: &IngestOptions) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let x_idx = resolve_column(&opts.x_column, &header_map, headers.len())?;
    let y_idx = resolve_column(&opts.y_column, &header_map, headers.len())?;
    let w_idx = opts
        .weight_column
        .as_ref()
        .map(|c| resolve_column(c, &header_map, headers.len()))
        .transpose()?;

    // +2: records() starts after the header, and lines are 1-based.
    let records: Vec<(usize, Result<StringRecord, csv::Error>)> = reader
        .records()
        .enumerate()
        .map(|(idx, r)| (idx + 2, r))
        .collect();
    let rows_read = records.len();

    if opts.skip_head + opts.skip_tail >= rows_read {
        return Err(AppError::new(
            3,
            format!(
                "Skipping {} leading and {} trailing rows leaves nothing of {rows_read} rows.",
                opts.skip_head, opts.skip_tail
            ),
        ));
    }

    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_flagged = 0usize;

    for (line, result) in &records[opts.skip_head..rows_read - opts.skip_tail] {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line: *line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let parsed = parse_field(record, x_idx, "x").and_then(|xv| {
            let yv = parse_field(record, y_idx, "y")?;
            let wv = w_idx.map(|i| parse_field(record, i, "weight")).transpose()?;
            Ok((xv, yv, wv))
        });
        match parsed {
            Ok((_, _, Some(w))) if w <= 0.0 => rows_flagged += 1,
            Ok((xv, yv, _)) => {
                x.push(xv);
                y.push(yv);
            }
            Err(message) => row_errors.push(RowError {
                line: *line,
                message,
            }),
        }
    }

    let rows_used = x.len();
    if rows_used == 0 {
        return Err(AppError::new(
            3,
            "No valid rows remain after skipping and weight filtering.",
        ));
    }
    if !row_errors.is_empty() {
        log::warn!("{} rows could not be parsed and were skipped", row_errors.len());
    }
    log::debug!("ingest: {rows_read} rows read, {rows_used} used, {rows_flagged} flagged");

    let series = DataSeries::new(x, y).map_err(AppError::from)?;
    let stats = series.stats();

    Ok(IngestedData {
        series,
        stats,
        row_errors,
        rows_read,
        rows_used,
        rows_flagged,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn resolve_column(
    col: &ColumnRef,
    header_map: &HashMap<String, usize>,
    width: usize,
) -> Result<usize, AppError> {
    match col {
        ColumnRef::Index(i) if *i < width => Ok(*i),
        ColumnRef::Index(i) => Err(AppError::new(
            2,
            format!("Column index {i} is out of range (CSV has {width} columns)."),
        )),
        ColumnRef::Name(name) => header_map
            .get(&normalize_header_name(name))
            .copied()
            .ok_or_else(|| AppError::new(2, format!("Column {col} not found in CSV header."))),
    }
}

fn parse_field(record: &StringRecord, idx: usize, what: &str) -> Result<f64, String> {
    let raw = record
        .get(idx)
        .ok_or_else(|| format!("missing {what} field (column {idx})"))?;
    let v: f64 = raw
        .parse()
        .map_err(|_| format!("{what} value '{raw}' is not a number"))?;
    if !v.is_finite() {
        return Err(format!("{what} value '{raw}' is not finite"));
    }
    Ok(v)
}
