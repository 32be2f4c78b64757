use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};

use crate::error::ReconError;
use crate::model::{CanonicalRow, CellValue, DataQualityWarning, RawSheet, SheetLayout};

/// Rows of one worksheet after normalization.
#[derive(Debug, Clone)]
pub struct NormalizedSheet {
    pub layout: Arc<SheetLayout>,
    pub rows: Vec<CanonicalRow>,
}

impl NormalizedSheet {
    pub fn name(&self) -> &str {
        &self.layout.sheet
    }
}

/// Make header names unique.
///
/// Blank cells become `Column N` (1-based physical position); repeats get a
/// `.1`, `.2`, ... suffix, skipping any suffix already taken.
pub fn unique_headers(header: &[CellValue]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(header.len());

    for (i, cell) in header.iter().enumerate() {
        let text = cell.to_text();
        let base = if text.trim().is_empty() {
            format!("Column {}", i + 1)
        } else {
            text
        };

        let mut name = base.clone();
        let mut n = 1;
        while taken.contains(&name) {
            name = format!("{base}.{n}");
            n += 1;
        }
        taken.insert(name.clone());
        out.push(name);
    }

    out
}

/// Turn a raw worksheet into canonical rows. Rows whose cells are all blank
/// are dropped without shifting the index of later rows.
pub fn normalize_sheet(sheet: &RawSheet) -> NormalizedSheet {
    let header = sheet.rows.first().map(Vec::as_slice).unwrap_or(&[]);
    let columns = unique_headers(header);
    let width = columns.len();
    let layout = Arc::new(SheetLayout::new(
        &sheet.name,
        columns,
        sheet.origin.row,
        sheet.origin.col,
    ));

    let mut rows = Vec::new();
    for (i, raw) in sheet.rows.iter().skip(1).enumerate() {
        if raw.iter().all(CellValue::is_blank) {
            continue;
        }
        let mut values: Vec<CellValue> = raw.iter().take(width).cloned().collect();
        values.resize(width, CellValue::Empty);
        rows.push(CanonicalRow::new(Arc::clone(&layout), values, i as u32));
    }

    debug!(
        "normalized sheet '{}': {} columns, {} rows",
        sheet.name,
        layout.columns.len(),
        rows.len()
    );

    NormalizedSheet { layout, rows }
}

/// Normalize every worksheet that ingestion managed to parse. Failed
/// worksheets produce a warning and no rows.
pub fn normalize_workbook(
    sheets: &[Result<RawSheet, ReconError>],
    warnings: &mut Vec<DataQualityWarning>,
) -> Vec<NormalizedSheet> {
    let mut out = Vec::new();
    for sheet in sheets {
        match sheet {
            Ok(raw) => out.push(normalize_sheet(raw)),
            Err(e) => {
                warn!("{e}");
                let (sheet, reason) = match e {
                    ReconError::Parse { sheet, message } => (sheet.clone(), message.clone()),
                    other => (String::new(), other.to_string()),
                };
                warnings.push(DataQualityWarning::SheetSkipped { sheet, reason });
            }
        }
    }
    out
}
