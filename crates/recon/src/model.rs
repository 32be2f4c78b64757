use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ColumnNotFound;

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

/// A raw cell value as handed over by workbook ingestion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl CellValue {
    /// True for empty cells and text that is only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render the value the way a spreadsheet export shows it as text.
    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Shortest decimal rendering: integral values print without a fraction.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Absolute 0-based cell position within a worksheet. Displays as `A1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse an `A1`-style reference (absolute markers `$` are ignored).
    pub fn parse(reference: &str) -> Option<Self> {
        let mut col: u32 = 0;
        let mut row: u32 = 0;
        let mut seen_letter = false;
        let mut seen_digit = false;

        for ch in reference.chars() {
            match ch {
                '$' => {}
                'A'..='Z' | 'a'..='z' if !seen_digit => {
                    seen_letter = true;
                    col = col
                        .checked_mul(26)?
                        .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
                }
                '0'..='9' if seen_letter => {
                    seen_digit = true;
                    row = row.checked_mul(10)?.checked_add(ch as u32 - '0' as u32)?;
                }
                _ => return None,
            }
        }

        if !seen_letter || !seen_digit || row == 0 {
            return None;
        }
        Some(Self { row: row - 1, col: col - 1 })
    }

    pub fn column_letters(&self) -> String {
        let mut n = self.col + 1;
        let mut letters = Vec::new();
        while n > 0 {
            let rem = ((n - 1) % 26) as u8;
            letters.push((b'A' + rem) as char);
            n = (n - 1) / 26;
        }
        letters.iter().rev().collect()
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column_letters(), self.row + 1)
    }
}

impl Serialize for CellAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CellAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CellAddress::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid cell reference '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Ingestion contract
// ---------------------------------------------------------------------------

/// One worksheet as produced by workbook ingestion. `rows[0]` is the header.
#[derive(Debug, Clone, Default)]
pub struct RawSheet {
    pub name: String,
    /// Absolute position of `rows[0][0]` within the worksheet.
    pub origin: CellAddress,
    pub rows: Vec<Vec<CellValue>>,
}


// ---------------------------------------------------------------------------
// Canonical rows
// ---------------------------------------------------------------------------

/// Header layout shared by every row of one worksheet.
#[derive(Debug)]
pub struct SheetLayout {
    pub sheet: String,
    /// Unique column names in physical order.
    pub columns: Vec<String>,
    /// Absolute row of the header.
    pub header_row: u32,
    /// Absolute column of the first header cell.
    pub first_col: u32,
    by_name: HashMap<String, usize>,
    by_lower: HashMap<String, usize>,
}

impl SheetLayout {
    pub fn new(sheet: &str, columns: Vec<String>, header_row: u32, first_col: u32) -> Self {
        let mut by_name = HashMap::new();
        let mut by_lower = HashMap::new();
        for (i, c) in columns.iter().enumerate() {
            by_name.entry(c.clone()).or_insert(i);
            by_lower.entry(c.trim().to_lowercase()).or_insert(i);
        }
        Self {
            sheet: sheet.to_string(),
            columns,
            header_row,
            first_col,
            by_name,
            by_lower,
        }
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.by_name.get(column).copied()
    }

    /// First candidate present in the header, compared case-insensitively.
    /// Returns the header's own spelling.
    pub fn find_column(&self, candidates: &[String]) -> Option<&str> {
        candidates.iter().find_map(|cand| {
            self.by_lower
                .get(&cand.trim().to_lowercase())
                .map(|&i| self.columns[i].as_str())
        })
    }
}

/// One physical spreadsheet row. Immutable once built by the normalizer.
#[derive(Debug, Clone)]
pub struct CanonicalRow {
    layout: Arc<SheetLayout>,
    values: Vec<CellValue>,
    row_index: u32,
}

impl CanonicalRow {
    pub fn new(layout: Arc<SheetLayout>, values: Vec<CellValue>, row_index: u32) -> Self {
        Self { layout, values, row_index }
    }

    pub fn source_sheet(&self) -> &str {
        &self.layout.sheet
    }

    /// 0-based data row within the worksheet, header excluded.
    pub fn source_row_index(&self) -> u32 {
        self.row_index
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    pub fn columns(&self) -> &[String] {
        &self.layout.columns
    }

    pub fn get(&self, column: &str) -> Result<&CellValue, ColumnNotFound> {
        let idx = self.layout.index_of(column).ok_or_else(|| self.not_found(column))?;
        Ok(self.values.get(idx).unwrap_or(&EMPTY_CELL))
    }

    /// Value of the first candidate column present in this row's header.
    pub fn get_any(&self, candidates: &[String]) -> Option<&CellValue> {
        let column = self.layout.find_column(candidates)?;
        self.get(column).ok()
    }

    /// Text of `column`, or empty when the value is missing/blank.
    pub fn text(&self, column: &str) -> Result<String, ColumnNotFound> {
        self.get(column).map(CellValue::to_text)
    }

    /// Absolute address of this row's cell in `column`.
    pub fn cell_address(&self, column: &str) -> Result<CellAddress, ColumnNotFound> {
        let idx = self.layout.index_of(column).ok_or_else(|| self.not_found(column))?;
        Ok(CellAddress {
            row: self.layout.header_row + 1 + self.row_index,
            col: self.layout.first_col + idx as u32,
        })
    }

    fn not_found(&self, column: &str) -> ColumnNotFound {
        ColumnNotFound {
            sheet: self.layout.sheet.clone(),
            column: column.to_string(),
        }
    }
}

/// Reference to a source row, carried in results for traceability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRef {
    pub sheet: String,
    pub row_index: u32,
}

impl From<&CanonicalRow> for RowRef {
    fn from(row: &CanonicalRow) -> Self {
        Self {
            sheet: row.source_sheet().to_string(),
            row_index: row.source_row_index(),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOrder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<BillingAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub line_items: LineItems,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAddress {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Customer {
    pub fn display_name(&self) -> Option<String> {
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        if !full.is_empty() {
            return Some(full.to_string());
        }
        self.email.clone().filter(|e| !e.trim().is_empty())
    }
}

/// Line items either as a plain list or as a GraphQL connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineItems {
    List(Vec<RemoteLineItem>),
    Connection { edges: Vec<LineItemEdge> },
}

impl Default for LineItems {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl LineItems {
    pub fn iter(&self) -> Box<dyn Iterator<Item = &RemoteLineItem> + '_> {
        match self {
            Self::List(items) => Box::new(items.iter()),
            Self::Connection { edges } => Box::new(edges.iter().map(|e| &e.node)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemEdge {
    pub node: RemoteLineItem,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLineItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillable_quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_title: Option<String>,
}

impl RemoteLineItem {
    /// Current quantity when the source exposes it, else the ordered quantity.
    pub fn effective_quantity(&self) -> f64 {
        self.current_quantity.or(self.quantity).unwrap_or(0.0)
    }
}

/// Outcome of fetching one store's orders.
#[derive(Debug, Clone)]
pub enum StoreOrders {
    Loaded(Vec<RemoteOrder>),
    Failed(String),
}

/// Everything the remote order source produced for this run, by store key.
#[derive(Debug, Clone, Default)]
pub struct RemoteBook {
    pub stores: BTreeMap<String, StoreOrders>,
}

impl RemoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_loaded(&mut self, store: impl Into<String>, orders: Vec<RemoteOrder>) {
        self.stores.insert(store.into(), StoreOrders::Loaded(orders));
    }

    pub fn insert_failed(&mut self, store: impl Into<String>, reason: impl Into<String>) {
        self.stores.insert(store.into(), StoreOrders::Failed(reason.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalStatus {
    Ok,
    Mismatch,
}

impl fmt::Display for TotalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Mismatch => write!(f, "mismatch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStatus {
    Match,
    Mismatch,
    NotFound,
    SourceError,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "match"),
            Self::Mismatch => write!(f, "mismatch"),
            Self::NotFound => write!(f, "not-found"),
            Self::SourceError => write!(f, "source-error"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub order: String,
    pub country: Option<String>,
    pub store: Option<String>,
    pub base_total: f64,
    pub upsell_total: f64,
    pub expected_total: f64,
    pub reported_total: Option<f64>,
    pub difference: Option<f64>,
    pub status: TotalStatus,
    pub items_compared: usize,
    pub match_status: MatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_detail: Option<String>,
    pub ledger_signature: Vec<String>,
    pub remote_signature: Vec<String>,
    pub quoted_total: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pricing_notes: Vec<String>,
    pub rows: Vec<RowRef>,
}

/// A single proposed cell overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellCorrection {
    pub sheet: String,
    pub cell: CellAddress,
    pub old_value: CellValue,
    pub new_value: f64,
    pub order: String,
    pub column: String,
    /// Data row within the sheet, header excluded (same as [`RowRef::row_index`]).
    pub row_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// A country's quotation column is named after a different country.
    SharedQuotationColumn {
        country: String,
        column: String,
        column_country: String,
    },
    /// Two quotation headers resolved to the same country code.
    ConflictingQuotationHeader {
        country: String,
        kept: String,
        replaced: String,
    },
    SheetSkipped { sheet: String, reason: String },
    MissingColumn { sheet: String, column: String },
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedQuotationColumn { country, column, column_country } => write!(
                f,
                "country {country} reads quotation column '{column}', which belongs to {column_country}"
            ),
            Self::ConflictingQuotationHeader { country, kept, replaced } => write!(
                f,
                "quotation headers '{replaced}' and '{kept}' both map to {country}; using '{kept}'"
            ),
            Self::SheetSkipped { sheet, reason } => write!(f, "sheet '{sheet}' skipped: {reason}"),
            Self::MissingColumn { sheet, column } => {
                write!(f, "sheet '{sheet}' has no '{column}' column")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconSummary {
    pub orders: usize,
    pub total_mismatches: usize,
    pub item_matches: usize,
    pub item_mismatches: usize,
    pub not_found: usize,
    pub source_errors: usize,
    pub corrections: usize,
    pub rows_read: usize,
    pub duplicate_rows_dropped: usize,
    pub rows_without_order: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub engine_version: String,
    pub ledger_sheets: Vec<String>,
    pub quotation_sheets: Vec<String>,
    pub stores: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub results: Vec<ReconciliationResult>,
    pub corrections: Vec<CellCorrection>,
    pub warnings: Vec<DataQualityWarning>,
}
