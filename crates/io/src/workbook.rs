//! Workbook ingestion: any spreadsheet calamine reads, plus CSV/TSV.
//!
//! Each worksheet becomes a [`RawSheet`] whose first row is the header.
//! A worksheet calamine cannot decode is returned as `Err` in its slot so the
//! engine can report it and carry on; a file that cannot be opened at all is
//! an [`IoError`].

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use log::{debug, warn};
use ordercheck_recon::{CellAddress, CellValue, RawSheet, ReconError};

use crate::error::IoError;

/// Worksheets of one input file, in workbook order.
pub type SheetResults = Vec<Result<RawSheet, ReconError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookFormat {
    /// xlsx, xlsm, xlsb, xls or ods; decoded by calamine.
    Spreadsheet,
    Csv,
}

impl WorkbookFormat {
    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Self::Spreadsheet),
            "csv" | "tsv" | "txt" => Ok(Self::Csv),
            "" => Err(IoError::UnsupportedFormat(format!(
                "{} (no extension)",
                path.display()
            ))),
            other => Err(IoError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Read every worksheet of the file at `path`.
pub fn read_workbook(path: &Path) -> Result<SheetResults, IoError> {
    match WorkbookFormat::from_path(path)? {
        WorkbookFormat::Spreadsheet => {
            let workbook =
                open_workbook_auto(path).map_err(|e| IoError::Workbook(format!("{}: {e}", path.display())))?;
            Ok(read_sheets(workbook))
        }
        WorkbookFormat::Csv => {
            let sheet = read_csv_file(path)?;
            Ok(vec![Ok(sheet)])
        }
    }
}

/// Read every worksheet of an in-memory spreadsheet (format sniffed by calamine).
pub fn read_workbook_bytes(bytes: &[u8]) -> Result<SheetResults, IoError> {
    let workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| IoError::Workbook(e.to_string()))?;
    Ok(read_sheets(workbook))
}

fn read_sheets<RS>(mut workbook: Sheets<RS>) -> SheetResults
where
    RS: std::io::Read + std::io::Seek,
{
    let names = workbook.sheet_names();
    let mut out = Vec::with_capacity(names.len());

    for name in names {
        match workbook.worksheet_range(&name) {
            Ok(range) => {
                let sheet = range_to_sheet(&name, &range);
                debug!(
                    "read sheet '{}': {} rows from {}",
                    sheet.name,
                    sheet.rows.len(),
                    sheet.origin
                );
                out.push(Ok(sheet));
            }
            Err(e) => {
                warn!("cannot read sheet '{name}': {e}");
                out.push(Err(ReconError::Parse {
                    sheet: name,
                    message: e.to_string(),
                }));
            }
        }
    }

    out
}

fn range_to_sheet(name: &str, range: &Range<Data>) -> RawSheet {
    // Range start offset (data may not begin at A1)
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let rows = range
        .rows()
        .map(|row| row.iter().map(data_to_cell).collect())
        .collect();

    RawSheet {
        name: name.to_string(),
        origin: CellAddress::new(start_row, start_col),
        rows,
    }
}

fn data_to_cell(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::from(s.as_str()),
        // Serial date; no column the checks read is date-typed
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Read a delimited text file as a single worksheet named after the file stem.
pub fn read_csv_file(path: &Path) -> Result<RawSheet, IoError> {
    let content = read_file_as_utf8(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Sheet1");
    parse_csv(name, &content)
}

/// Parse delimited text. The delimiter is sniffed from the first lines.
pub fn parse_csv(name: &str, content: &str) -> Result<RawSheet, IoError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let delimiter = sniff_delimiter(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| IoError::Csv(format!("{name}: {e}")))?;
        rows.push(record.iter().map(CellValue::from).collect());
    }

    debug!(
        "read '{name}' as CSV (delimiter {:?}): {} rows",
        delimiter as char,
        rows.len()
    );

    Ok(RawSheet {
        name: name.to_string(),
        origin: CellAddress::new(0, 0),
        rows,
    })
}

/// Pick the delimiter that splits the sample lines most consistently.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample: Vec<&str> = content.lines().take(10).collect();
    if sample.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // The header line must split
        let target = counts.first().copied().unwrap_or(0);
        if target <= 1 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// UTF-8 first, Windows-1252 otherwise (Excel CSV exports).
fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let bytes = std::fs::read(path).map_err(|e| IoError::at(path, e))?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}
