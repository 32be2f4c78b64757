use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Run configuration. Every section is optional; an empty document yields
/// the stock layout of the tracking ledger and quotation workbook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub quotation: QuotationConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Column candidates are tried in order, case-insensitively.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub order: Vec<String>,
    pub country: Vec<String>,
    pub store: Vec<String>,
    pub sku: Vec<String>,
    pub qty: Vec<String>,
    /// Item identifier used for the item signature.
    pub item: Vec<String>,
    pub cost: Vec<String>,
    pub upsell: Vec<String>,
    pub total: Vec<String>,
    /// Columns whose whitespace-collapsed values form the duplicate-row key.
    pub dedupe_columns: Vec<String>,
    /// Absolute difference above which a total is a mismatch.
    pub tolerance: f64,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            order: names(&["Order#", "Order", "Order Number"]),
            country: names(&["Country", "Ship Country", "Shipping Country"]),
            store: names(&["Store"]),
            sku: names(&["SKU"]),
            qty: names(&["QTY", "Quantity"]),
            item: names(&["Item", "SKU.1", "SKU"]),
            cost: names(&["Cost"]),
            upsell: names(&["Upsell"]),
            total: names(&["Total"]),
            dedupe_columns: names(&[
                "Store", "Order#", "Country", "Tracking", "Carrier", "Item", "SKU.1", "SKU",
                "QTY", "Cost", "Upsell", "Total",
            ]),
            tolerance: 0.01,
        }
    }
}

// ---------------------------------------------------------------------------
// Quotation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotationConfig {
    /// Price sheet; falls back to the first worksheet when absent.
    pub default_sheet: String,
    /// Optional small-quantity price sheet.
    pub tier_sheet: String,
    /// Largest summed quantity priced from the tier sheet.
    pub tier_max_qty: f64,
    pub sku_columns: Vec<String>,
    pub qty_columns: Vec<String>,
    pub name_columns: Vec<String>,
}

impl Default for QuotationConfig {
    fn default() -> Self {
        Self {
            default_sheet: "Quotation".into(),
            tier_sheet: "QTY=1-5".into(),
            tier_max_qty: 5.0,
            sku_columns: names(&["SKU", "Sku", "sku"]),
            qty_columns: names(&["QTY"]),
            name_columns: names(&["Item name", "Item Name", "Item", "Name"]),
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Remote line items whose lowercased title contains any term are ignored.
    pub excluded_title_terms: Vec<String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            excluded_title_terms: names(&["e-book", "ebook"]),
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Store used when no rule matches.
    pub default_store: Option<String>,
    pub rules: Vec<RouteRule>,
}

/// Routes an order to `store` when its Store cell contains one of `contains`.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRule {
    pub contains: Vec<String>,
    pub store: String,
    /// Country code → store key, resolved from the Store cell or Country column.
    #[serde(default)]
    pub by_country: BTreeMap<String, String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let cellumove_countries = [
            ("UK", "cellumove"),
            ("DE", "cellumove_de"),
            ("CZ", "cellumove_cz"),
            ("ES", "cellumove_es"),
            ("FR", "cellumove_fr"),
            ("GR", "cellumove_gr"),
            ("MX", "cellumove_mx"),
            ("PL", "cellumove_pl"),
            ("PT", "cellumove_pt"),
            ("RO", "cellumove_ro"),
        ];
        Self {
            default_store: None,
            rules: vec![
                RouteRule {
                    contains: names(&["bloomommy"]),
                    store: "bloomommy".into(),
                    by_country: BTreeMap::new(),
                },
                RouteRule {
                    contains: names(&["yuma"]),
                    store: "yuma".into(),
                    by_country: BTreeMap::new(),
                },
                RouteRule {
                    contains: names(&["cellumove", "cellu"]),
                    store: "cellumove".into(),
                    by_country: cellumove_countries
                        .iter()
                        .map(|(cc, store)| (cc.to_string(), store.to_string()))
                        .collect(),
                },
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let tol = self.ledger.tolerance;
        if !tol.is_finite() || tol < 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "ledger.tolerance must be a finite non-negative number, got {tol}"
            )));
        }

        let candidate_lists = [
            ("ledger.order", &self.ledger.order),
            ("ledger.country", &self.ledger.country),
            ("ledger.store", &self.ledger.store),
            ("ledger.sku", &self.ledger.sku),
            ("ledger.qty", &self.ledger.qty),
            ("ledger.item", &self.ledger.item),
            ("ledger.cost", &self.ledger.cost),
            ("ledger.upsell", &self.ledger.upsell),
            ("ledger.total", &self.ledger.total),
            ("quotation.sku_columns", &self.quotation.sku_columns),
            ("quotation.qty_columns", &self.quotation.qty_columns),
        ];
        for (key, list) in candidate_lists {
            if list.iter().all(|c| c.trim().is_empty()) {
                return Err(ReconError::ConfigValidation(format!(
                    "{key} needs at least one column name"
                )));
            }
        }

        let tier = self.quotation.tier_max_qty;
        if !tier.is_finite() || tier < 1.0 {
            return Err(ReconError::ConfigValidation(format!(
                "quotation.tier_max_qty must be at least 1, got {tier}"
            )));
        }

        for (i, rule) in self.routing.rules.iter().enumerate() {
            if rule.store.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "routing.rules[{i}]: store must not be empty"
                )));
            }
            if rule.contains.is_empty() || rule.contains.iter().any(|t| t.trim().is_empty()) {
                return Err(ReconError::ConfigValidation(format!(
                    "routing.rules[{i}] ('{}'): contains needs non-empty terms",
                    rule.store
                )));
            }
            for (cc, store) in &rule.by_country {
                if cc.trim().is_empty() || store.trim().is_empty() {
                    return Err(ReconError::ConfigValidation(format!(
                        "routing.rules[{i}] ('{}'): by_country entries must be non-empty",
                        rule.store
                    )));
                }
            }
        }

        if let Some(ref store) = self.routing.default_store {
            if store.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "routing.default_store must not be empty when set".into(),
                ));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
