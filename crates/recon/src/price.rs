use std::collections::BTreeMap;
use std::sync::OnceLock;

use log::{debug, warn};
use regex::Regex;

use crate::canon::{norm_text, normalize_sku_base, parse_price, parse_quantity};
use crate::config::{LedgerConfig, QuotationConfig};
use crate::model::{format_number, CanonicalRow, CellValue, DataQualityWarning};
use crate::normalize::NormalizedSheet;

/// Country codes whose quotation columns follow the `Total to CC` /
/// `Upsell to CC` convention.
const BASELINE_CODES: [&str; 45] = [
    "FR", "BE", "CH", "CA", "CZ", "SK", "RO", "ES", "IT", "GR", "GB", "GB-remote area", "US",
    "DE", "AU-1", "AU-2", "AU-3", "AU-4", "NZ", "MA", "ZA", "AE", "MT", "SE", "MX", "EG", "AT",
    "DK", "FI", "SI", "BR", "LT", "NL", "IL", "MY", "LV", "MX-tax included", "BG", "CO", "EE",
    "IN", "BH", "HR", "QA", "IE",
];

/// Baseline entries that read another country's columns. Kept as-is and
/// surfaced as data-quality warnings.
const BASELINE_SHARED: [(&str, &str, &str); 2] = [
    ("PL", "Total to GR", "Upsell to PL"),
    ("PT", "Total to GR", "Upsell to GR"),
];

fn total_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^Total\s+to\s+([A-Z]{2})\b").expect("valid total regex"))
}

fn upsell_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^Upsell\s+to\s+([A-Z]{2})\b").expect("valid upsell regex"))
}

fn column_target() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:Total|Upsell)\s+to\s+(.+)$").expect("valid target regex"))
}

// ---------------------------------------------------------------------------
// Country columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryColumns {
    pub total: String,
    pub upsell: String,
}

impl CountryColumns {
    pub fn conventional(code: &str) -> Self {
        Self {
            total: format!("Total to {code}"),
            upsell: format!("Upsell to {code}"),
        }
    }
}

/// Country code → quotation column names.
#[derive(Debug, Clone, Default)]
pub struct CountryColumnMap {
    entries: BTreeMap<String, CountryColumns>,
}

impl CountryColumnMap {
    /// Static table used before any quotation headers are seen.
    pub fn baseline() -> Self {
        let mut entries: BTreeMap<String, CountryColumns> = BASELINE_CODES
            .iter()
            .map(|cc| (cc.to_string(), CountryColumns::conventional(cc)))
            .collect();
        for (cc, total, upsell) in BASELINE_SHARED {
            entries.insert(
                cc.to_string(),
                CountryColumns {
                    total: total.to_string(),
                    upsell: upsell.to_string(),
                },
            );
        }
        Self { entries }
    }

    /// Baseline overridden by the entries discovered in `headers`.
    pub fn from_headers(headers: &[String], warnings: &mut Vec<DataQualityWarning>) -> Self {
        let mut map = Self::baseline();
        for (cc, cols) in derive_country_columns(headers, warnings) {
            map.entries.insert(cc, cols);
        }
        map.report_shared_columns(warnings);
        map
    }

    /// Entry for a ledger country value: exact key first, then uppercased.
    pub fn get(&self, country: &str) -> Option<&CountryColumns> {
        let trimmed = country.trim();
        self.entries
            .get(trimmed)
            .or_else(|| self.entries.get(&trimmed.to_uppercase()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn report_shared_columns(&self, warnings: &mut Vec<DataQualityWarning>) {
        for (cc, cols) in &self.entries {
            for column in [&cols.total, &cols.upsell] {
                let Some(target) = column_target()
                    .captures(&norm_text(column))
                    .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
                else {
                    continue;
                };
                if code_prefix(&target) != code_prefix(cc) {
                    warnings.push(DataQualityWarning::SharedQuotationColumn {
                        country: cc.clone(),
                        column: column.clone(),
                        column_country: target,
                    });
                }
            }
        }
    }
}

/// Two-letter code a column name or map key starts with.
fn code_prefix(s: &str) -> String {
    s.chars().take(2).collect::<String>().to_uppercase()
}

/// Discover `Total to CC` / `Upsell to CC` headers.
///
/// Matching runs on the whitespace-collapsed header; the stored column name
/// is the header's original text. A missing half gets the conventional name.
/// When two headers claim the same code the later one wins.
pub fn derive_country_columns(
    headers: &[String],
    warnings: &mut Vec<DataQualityWarning>,
) -> BTreeMap<String, CountryColumns> {
    let mut totals: BTreeMap<String, String> = BTreeMap::new();
    let mut upsells: BTreeMap<String, String> = BTreeMap::new();

    for header in headers {
        let collapsed = norm_text(header);
        let (slot, caps) = if let Some(caps) = total_header().captures(&collapsed) {
            (&mut totals, caps)
        } else if let Some(caps) = upsell_header().captures(&collapsed) {
            (&mut upsells, caps)
        } else {
            continue;
        };
        let Some(code) = caps.get(1).map(|m| m.as_str().to_uppercase()) else {
            continue;
        };
        if let Some(previous) = slot.insert(code.clone(), header.clone()) {
            if norm_text(&previous).eq_ignore_ascii_case(&collapsed) {
                continue;
            }
            warnings.push(DataQualityWarning::ConflictingQuotationHeader {
                country: code,
                kept: header.clone(),
                replaced: previous,
            });
        }
    }

    let mut codes: Vec<&String> = totals.keys().chain(upsells.keys()).collect();
    codes.sort();
    codes.dedup();

    codes
        .into_iter()
        .map(|cc| {
            let fallback = CountryColumns::conventional(cc);
            let cols = CountryColumns {
                total: totals.get(cc).cloned().unwrap_or(fallback.total),
                upsell: upsells.get(cc).cloned().unwrap_or(fallback.upsell),
            };
            (cc.clone(), cols)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Price index
// ---------------------------------------------------------------------------

/// Prices of one SKU at one quantity for one country.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountryPrice {
    pub total: Option<f64>,
    pub upsell: Option<f64>,
}

/// SKU base → quantity → quotation row.
#[derive(Debug, Clone, Default)]
pub struct PriceIndex {
    by_sku: BTreeMap<String, BTreeMap<String, CanonicalRow>>,
}

/// Index quotation rows by `(normalize_sku_base(SKU), QTY)`. A blank QTY
/// means 1; rows without a SKU, or whose QTY is not a whole number of at
/// least 1, are skipped.
pub fn build_price_index(rows: &[CanonicalRow], config: &QuotationConfig) -> PriceIndex {
    let mut index = PriceIndex::default();
    for row in rows {
        let Some(sku) = row.get_any(&config.sku_columns).filter(|v| !v.is_blank()) else {
            continue;
        };
        let qty = match row.get_any(&config.qty_columns) {
            None => 1.0,
            Some(v) if v.is_blank() => 1.0,
            Some(v) => parse_quantity(v),
        };
        if qty < 1.0 || qty.fract() != 0.0 {
            continue;
        }
        index
            .by_sku
            .entry(normalize_sku_base(&sku.to_text()))
            .or_default()
            .insert(format_number(qty), row.clone());
    }
    index
}

impl PriceIndex {
    pub fn contains_sku(&self, sku_base: &str) -> bool {
        self.by_sku.contains_key(sku_base)
    }

    pub fn row(&self, sku_base: &str, qty: f64) -> Option<&CanonicalRow> {
        self.by_sku.get(sku_base)?.get(&format_number(qty))
    }

    pub fn price(&self, sku_base: &str, qty: f64, cols: &CountryColumns) -> Option<CountryPrice> {
        let row = self.row(sku_base, qty)?;
        let cell = |name: &str| lookup_header(row, name).and_then(parse_price);
        Some(CountryPrice {
            total: cell(&cols.total),
            upsell: cell(&cols.upsell),
        })
    }

    pub fn len(&self) -> usize {
        self.by_sku.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sku.is_empty()
    }
}

/// Cell under `name`, falling back to a header that differs only in case or
/// whitespace (quotation sheets wrap headers onto several lines).
fn lookup_header<'r>(row: &'r CanonicalRow, name: &str) -> Option<&'r CellValue> {
    if let Ok(v) = row.get(name) {
        return Some(v);
    }
    let wanted = norm_text(name);
    let column = row
        .columns()
        .iter()
        .find(|c| norm_text(c).eq_ignore_ascii_case(&wanted))?;
    row.get(column).ok()
}

// ---------------------------------------------------------------------------
// SKU names
// ---------------------------------------------------------------------------

/// SKU base → quotation display name. First occurrence wins.
#[derive(Debug, Clone, Default)]
pub struct SkuNameTable {
    names: BTreeMap<String, String>,
}

impl SkuNameTable {
    pub fn build(rows: &[CanonicalRow], config: &QuotationConfig) -> Self {
        let mut names = BTreeMap::new();
        for row in rows {
            let Some(sku) = first_non_blank(row, &config.sku_columns) else {
                continue;
            };
            let Some(name) = first_non_blank(row, &config.name_columns) else {
                continue;
            };
            names
                .entry(normalize_sku_base(&sku))
                .or_insert_with(|| name.trim().to_string());
        }
        Self { names }
    }

    /// Add entries from `other` whose SKU is not already present.
    pub fn merge_missing(&mut self, other: SkuNameTable) {
        for (sku, name) in other.names {
            self.names.entry(sku).or_insert(name);
        }
    }

    pub fn name_for(&self, sku_base: &str) -> Option<&str> {
        self.names.get(sku_base).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// First candidate column, in candidate order, whose value is non-blank.
fn first_non_blank(row: &CanonicalRow, candidates: &[String]) -> Option<String> {
    candidates.iter().find_map(|cand| {
        let column = row.layout().find_column(std::slice::from_ref(cand))?;
        let value = row.get(column).ok()?;
        (!value.is_blank()).then(|| value.to_text())
    })
}

// ---------------------------------------------------------------------------
// Quotation workbook
// ---------------------------------------------------------------------------

/// Read-only pricing data built once per run.
#[derive(Debug, Clone, Default)]
pub struct Quotation {
    pub default_sheet: Option<String>,
    pub tier_sheet: Option<String>,
    pub default_prices: PriceIndex,
    pub tier_prices: PriceIndex,
    pub countries: CountryColumnMap,
    pub names: SkuNameTable,
    pub tier_max_qty: f64,
}

fn find_sheet<'a>(sheets: &'a [NormalizedSheet], wanted: &str) -> Option<&'a NormalizedSheet> {
    let wanted = wanted.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    sheets.iter().find(|s| s.name().trim().to_lowercase() == wanted)
}

impl Quotation {
    pub fn from_sheets(
        sheets: &[NormalizedSheet],
        config: &QuotationConfig,
        warnings: &mut Vec<DataQualityWarning>,
    ) -> Self {
        let default = find_sheet(sheets, &config.default_sheet).or_else(|| sheets.first());
        let tier = find_sheet(sheets, &config.tier_sheet)
            .filter(|t| default.map_or(true, |d| d.name() != t.name()));

        let default_rows = default.map(|s| s.rows.as_slice()).unwrap_or(&[]);
        let tier_rows = tier.map(|s| s.rows.as_slice()).unwrap_or(&[]);

        let mut headers: Vec<String> = Vec::new();
        for sheet in default.into_iter().chain(tier) {
            for col in &sheet.layout.columns {
                if !headers.contains(col) {
                    headers.push(col.clone());
                }
            }
        }

        let mut names = SkuNameTable::build(default_rows, config);
        names.merge_missing(SkuNameTable::build(tier_rows, config));

        let quotation = Self {
            default_sheet: default.map(|s| s.name().to_string()),
            tier_sheet: tier.map(|s| s.name().to_string()),
            default_prices: build_price_index(default_rows, config),
            tier_prices: build_price_index(tier_rows, config),
            countries: CountryColumnMap::from_headers(&headers, warnings),
            names,
            tier_max_qty: config.tier_max_qty,
        };

        if quotation.default_sheet.is_none() {
            warn!("quotation workbook has no usable sheet");
        }
        debug!(
            "quotation: {} default prices, {} tier prices, {} countries, {} sku names",
            quotation.default_prices.len(),
            quotation.tier_prices.len(),
            quotation.countries.len(),
            quotation.names.len()
        );
        quotation
    }

    /// Index used for a SKU at a summed quantity: the tier sheet when it
    /// prices that exact quantity, else the default sheet.
    fn index_for(&self, sku_base: &str, qty: f64) -> &PriceIndex {
        if qty <= self.tier_max_qty && self.tier_prices.row(sku_base, qty).is_some() {
            &self.tier_prices
        } else {
            &self.default_prices
        }
    }
}

// ---------------------------------------------------------------------------
// Quoted total
// ---------------------------------------------------------------------------

/// Quotation-derived order total. `total` is `None` whenever a line could
/// not be priced; `notes` says why.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Quote {
    pub total: Option<f64>,
    pub notes: Vec<String>,
}

#[derive(Default)]
struct SkuLine {
    qty: f64,
    cost: f64,
    upsell: f64,
}

/// Price an order's rows against the quotation for `country`.
pub fn quote_order(
    rows: &[&CanonicalRow],
    country: Option<&str>,
    quotation: &Quotation,
    ledger: &LedgerConfig,
) -> Quote {
    let mut lines: BTreeMap<String, SkuLine> = BTreeMap::new();
    for row in rows {
        let Some(sku) = row.get_any(&ledger.sku).filter(|v| !v.is_blank()) else {
            continue;
        };
        let line = lines.entry(normalize_sku_base(&sku.to_text())).or_default();
        line.qty += row.get_any(&ledger.qty).map(parse_quantity).unwrap_or(0.0);
        if let Some(c) = row.get_any(&ledger.cost).and_then(parse_price).filter(|c| *c > 0.0) {
            line.cost += c;
        }
        if let Some(u) = row.get_any(&ledger.upsell).and_then(parse_price).filter(|u| *u > 0.0) {
            line.upsell += u;
        }
    }

    let mut notes = Vec::new();
    if lines.is_empty() {
        return Quote { total: None, notes };
    }

    let Some(country) = country.filter(|c| !c.trim().is_empty()) else {
        notes.push("no country on order".to_string());
        return Quote { total: None, notes };
    };
    let Some(cols) = quotation.countries.get(country) else {
        notes.push(format!("no quotation column for country {country}"));
        return Quote { total: None, notes };
    };

    let mut total = 0.0;
    for (sku, line) in &lines {
        if line.qty <= 0.0 {
            continue;
        }
        let index = quotation.index_for(sku, line.qty);
        let Some(price) = index.price(sku, line.qty, cols) else {
            if index.contains_sku(sku) {
                notes.push(format!("no price tier for {sku} at QTY {}", format_number(line.qty)));
            } else {
                notes.push(format!("SKU {sku} not in quotation"));
            }
            continue;
        };

        let upsell_only = line.upsell > 0.0 && line.cost <= 0.0;
        if !upsell_only {
            match price.total {
                Some(p) => total += p,
                None => notes.push(format!("{sku}: blank '{}'", cols.total)),
            }
        }
        if line.upsell > 0.0 {
            match price.upsell {
                Some(p) => total += p,
                None => notes.push(format!("{sku}: blank '{}'", cols.upsell)),
            }
        }
    }

    Quote {
        total: notes.is_empty().then_some(total),
        notes,
    }
}
