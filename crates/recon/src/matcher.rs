use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::canon::{canonical_product_name, norm_text, normalize_sku_base, order_key, parse_quantity};
use crate::config::{LedgerConfig, MatchingConfig};
use crate::model::{format_number, CanonicalRow, MatchStatus, RemoteBook, RemoteLineItem, RemoteOrder, StoreOrders};
use crate::price::SkuNameTable;

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

fn render(agg: BTreeMap<String, f64>) -> Vec<String> {
    let mut sig: Vec<String> = agg
        .into_iter()
        .map(|(name, qty)| format!("{name}||{}", format_number(qty)))
        .collect();
    sig.sort();
    sig
}

/// Whether a remote line item counts as purchased.
///
/// Excluded titles and non-positive quantities are dropped. When the item
/// carries fulfillment metadata it must be fulfilled or still fulfillable.
pub fn keep_line_item(item: &RemoteLineItem, excluded_terms: &[String]) -> bool {
    let title = norm_text(item.title.as_deref().unwrap_or(""));
    if title.is_empty() {
        return false;
    }
    let lower = title.to_lowercase();
    if excluded_terms
        .iter()
        .any(|term| !term.is_empty() && lower.contains(&term.to_lowercase()))
    {
        return false;
    }
    if item.effective_quantity() <= 0.0 {
        return false;
    }
    if item.fulfillable_quantity.is_some() || item.fulfillment_status.is_some() {
        let fulfilled = item
            .fulfillment_status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("FULFILLED"));
        return fulfilled || item.fulfillable_quantity.unwrap_or(0.0) > 0.0;
    }
    true
}

/// Ledger side: item identifier → SKU base → quotation name → canonical
/// name, quantities summed. Sorted `name||qty` strings.
pub fn ledger_signature(
    rows: &[&CanonicalRow],
    ledger: &LedgerConfig,
    names: &SkuNameTable,
) -> Vec<String> {
    let mut agg: BTreeMap<String, f64> = BTreeMap::new();
    for row in rows {
        let layout = row.layout();
        let (Some(qty_col), Some(item_col)) =
            (layout.find_column(&ledger.qty), layout.find_column(&ledger.item))
        else {
            continue;
        };
        let qty = row.get(qty_col).map(parse_quantity).unwrap_or(0.0);
        if qty <= 0.0 {
            continue;
        }
        let raw = row.text(item_col).unwrap_or_default();
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let base = normalize_sku_base(raw);
        let name = names.name_for(&base).unwrap_or(&base);
        *agg.entry(canonical_product_name(name)).or_insert(0.0) += qty;
    }
    render(agg)
}

/// Remote side: kept line items by canonical title, quantities summed.
pub fn remote_signature(order: &RemoteOrder, matching: &MatchingConfig) -> Vec<String> {
    let mut agg: BTreeMap<String, f64> = BTreeMap::new();
    for item in order.line_items.iter() {
        if !keep_line_item(item, &matching.excluded_title_terms) {
            continue;
        }
        let title = item.title.as_deref().unwrap_or("");
        *agg.entry(canonical_product_name(title)).or_insert(0.0) += item.effective_quantity();
    }
    render(agg)
}

// ---------------------------------------------------------------------------
// Remote index
// ---------------------------------------------------------------------------

enum StoreIndex<'a> {
    Loaded(HashMap<String, &'a RemoteOrder>),
    Failed(&'a str),
}

/// Remote orders keyed by store, then by order key. Built once per run.
pub struct RemoteIndex<'a> {
    stores: HashMap<&'a str, StoreIndex<'a>>,
}

/// Where an order's remote counterpart lookup ended.
pub enum Lookup<'a> {
    Found(&'a RemoteOrder),
    NotFound(String),
    SourceError(String),
}

impl<'a> RemoteIndex<'a> {
    pub fn build(book: &'a RemoteBook) -> Self {
        let mut stores = HashMap::new();
        for (store, orders) in &book.stores {
            let idx = match orders {
                StoreOrders::Loaded(list) => {
                    let mut by_key: HashMap<String, &RemoteOrder> = HashMap::new();
                    for order in list {
                        if let Some(key) = order_key(&order.name) {
                            by_key.entry(key).or_insert(order);
                        }
                    }
                    debug!("store '{store}': {} remote orders indexed", by_key.len());
                    StoreIndex::Loaded(by_key)
                }
                StoreOrders::Failed(reason) => StoreIndex::Failed(reason.as_str()),
            };
            stores.insert(store.as_str(), idx);
        }
        Self { stores }
    }

    pub fn lookup(&self, store: Option<&str>, order: &str) -> Lookup<'a> {
        let Some(store) = store else {
            return Lookup::NotFound("order is not routed to a store".into());
        };
        match self.stores.get(store) {
            Some(StoreIndex::Loaded(by_key)) => match by_key.get(order) {
                Some(found) => Lookup::Found(*found),
                None => Lookup::NotFound(format!("order {order} not in store '{store}'")),
            },
            Some(StoreIndex::Failed(reason)) => Lookup::SourceError(format!("store '{store}': {reason}")),
            None => Lookup::SourceError(format!("no orders loaded for store '{store}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ItemMatch {
    pub status: MatchStatus,
    pub items_compared: usize,
    pub ledger_signature: Vec<String>,
    pub remote_signature: Vec<String>,
    pub detail: Option<String>,
}

/// Compare an order's ledger items against its remote counterpart.
pub fn match_order(
    ledger_sig: Vec<String>,
    lookup: Lookup<'_>,
    matching: &MatchingConfig,
) -> ItemMatch {
    match lookup {
        Lookup::Found(order) => {
            let remote_sig = remote_signature(order, matching);
            let status = if ledger_sig == remote_sig {
                MatchStatus::Match
            } else {
                MatchStatus::Mismatch
            };
            ItemMatch {
                status,
                items_compared: ledger_sig.len(),
                ledger_signature: ledger_sig,
                remote_signature: remote_sig,
                detail: None,
            }
        }
        Lookup::NotFound(detail) => ItemMatch {
            status: MatchStatus::NotFound,
            items_compared: 0,
            ledger_signature: ledger_sig,
            remote_signature: Vec::new(),
            detail: Some(detail),
        },
        Lookup::SourceError(detail) => ItemMatch {
            status: MatchStatus::SourceError,
            items_compared: 0,
            ledger_signature: ledger_sig,
            remote_signature: Vec::new(),
            detail: Some(detail),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuotationConfig;
    use crate::model::{CellAddress, CellValue, LineItemEdge, LineItems, RawSheet};
    use crate::normalize::normalize_sheet;

    fn item(title: &str, qty: f64) -> RemoteLineItem {
        RemoteLineItem {
            title: Some(title.into()),
            quantity: Some(qty),
            ..Default::default()
        }
    }

    fn order(name: &str, items: Vec<RemoteLineItem>) -> RemoteOrder {
        RemoteOrder {
            name: name.into(),
            line_items: LineItems::List(items),
            ..Default::default()
        }
    }

    fn terms() -> Vec<String> {
        MatchingConfig::default().excluded_title_terms
    }

    #[test]
    fn keep_filter_drops_ebooks_and_removed_lines() {
        assert!(keep_line_item(&item("Legging", 1.0), &terms()));
        assert!(!keep_line_item(&item("Free E-Book", 1.0), &terms()));
        assert!(!keep_line_item(&item("bonus ebook", 1.0), &terms()));
        assert!(!keep_line_item(&item("   ", 1.0), &terms()));
        assert!(!keep_line_item(&item("Legging", 0.0), &terms()));

        let removed = RemoteLineItem {
            current_quantity: Some(0.0),
            ..item("Legging", 2.0)
        };
        assert!(!keep_line_item(&removed, &terms()));
    }

    #[test]
    fn keep_filter_uses_fulfillment_metadata() {
        let unfulfillable = RemoteLineItem {
            fulfillable_quantity: Some(0.0),
            fulfillment_status: Some("UNFULFILLED".into()),
            ..item("Legging", 1.0)
        };
        assert!(!keep_line_item(&unfulfillable, &terms()));

        let fulfilled = RemoteLineItem {
            fulfillable_quantity: Some(0.0),
            fulfillment_status: Some("fulfilled".into()),
            ..item("Legging", 1.0)
        };
        assert!(keep_line_item(&fulfilled, &terms()));

        let pending = RemoteLineItem {
            fulfillable_quantity: Some(1.0),
            ..item("Legging", 1.0)
        };
        assert!(keep_line_item(&pending, &terms()));
    }

    #[test]
    fn remote_signature_sums_and_sorts() {
        let o = order(
            "#1001",
            vec![
                item("Anti-Cellulite Leggings - Slim fast", 1.0),
                item("Compression Sleeve", 1.0),
                item("anti-cellulite legging", 1.0),
                item("E-book guide", 1.0),
            ],
        );
        assert_eq!(
            remote_signature(&o, &MatchingConfig::default()),
            vec!["anti-cellulite legging||2", "compression sleeve||1"]
        );
    }

    #[test]
    fn connection_shaped_line_items_are_read() {
        let o = RemoteOrder {
            name: "#1".into(),
            line_items: LineItems::Connection {
                edges: vec![LineItemEdge { node: item("Belt", 3.0) }],
            },
            ..Default::default()
        };
        assert_eq!(remote_signature(&o, &MatchingConfig::default()), vec!["belt||3"]);
    }

    #[test]
    fn ledger_signature_maps_sku_through_quotation_names() {
        let quote = normalize_sheet(&RawSheet {
            name: "Quotation".into(),
            origin: CellAddress::new(0, 0),
            rows: vec![
                vec![CellValue::from("SKU"), CellValue::from("Item name")],
                vec![CellValue::from("CM12"), CellValue::from("Anti-Cellulite Leggings")],
            ],
        });
        let names = SkuNameTable::build(&quote.rows, &QuotationConfig::default());

        let ledger = normalize_sheet(&RawSheet {
            name: "Orders".into(),
            origin: CellAddress::new(0, 0),
            rows: vec![
                vec![CellValue::from("Order#"), CellValue::from("SKU"), CellValue::from("QTY")],
                vec![CellValue::from("#1"), CellValue::from("CM12-black-M"), CellValue::Number(1.0)],
                vec![CellValue::from("#1"), CellValue::from("cm12-pink-L"), CellValue::Number(1.0)],
                vec![CellValue::from("#1"), CellValue::from("ZZ9"), CellValue::Number(2.0)],
                vec![CellValue::from("#1"), CellValue::from("BL3"), CellValue::Number(0.0)],
            ],
        });
        let refs: Vec<&CanonicalRow> = ledger.rows.iter().collect();
        assert_eq!(
            ledger_signature(&refs, &LedgerConfig::default(), &names),
            vec!["anti-cellulite legging||2", "zz9||2"]
        );
    }

    #[test]
    fn lookup_outcomes() {
        let mut book = RemoteBook::new();
        book.insert_loaded("main", vec![order("#1001", vec![]), order("1001-dup", vec![item("X", 1.0)])]);
        book.insert_failed("broken", "HTTP 500");
        let index = RemoteIndex::build(&book);

        match index.lookup(Some("main"), "1001") {
            Lookup::Found(o) => assert_eq!(o.name, "#1001"),
            _ => panic!("expected first order to win"),
        }
        assert!(matches!(index.lookup(Some("main"), "9"), Lookup::NotFound(_)));
        assert!(matches!(index.lookup(Some("broken"), "1001"), Lookup::SourceError(_)));
        assert!(matches!(index.lookup(Some("absent"), "1001"), Lookup::SourceError(_)));
        assert!(matches!(index.lookup(None, "1001"), Lookup::NotFound(_)));
    }

    #[test]
    fn match_and_mismatch() {
        let o = order("#1", vec![item("Legging", 2.0)]);
        let m = match_order(vec!["legging||2".into()], Lookup::Found(&o), &MatchingConfig::default());
        assert_eq!(m.status, MatchStatus::Match);
        assert_eq!(m.items_compared, 1);

        let m = match_order(vec!["legging||1".into()], Lookup::Found(&o), &MatchingConfig::default());
        assert_eq!(m.status, MatchStatus::Mismatch);
    }
}
