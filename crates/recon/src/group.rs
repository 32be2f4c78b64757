use std::collections::{HashMap, HashSet};

use log::debug;

use crate::canon::{norm_text, order_key};
use crate::config::LedgerConfig;
use crate::model::CanonicalRow;

/// Rows of one order, in ledger order, exact repeats removed.
#[derive(Debug, Clone)]
pub struct OrderGroup<'a> {
    pub key: String,
    pub rows: Vec<&'a CanonicalRow>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupedOrders<'a> {
    /// Groups in first-seen order.
    pub groups: Vec<OrderGroup<'a>>,
    pub duplicate_rows: usize,
    pub rows_without_order: usize,
}

/// Composite key of a row over `columns`, values whitespace-collapsed.
/// Columns missing from the row's sheet contribute an empty value.
pub fn dedupe_key(row: &CanonicalRow, columns: &[String]) -> String {
    columns
        .iter()
        .map(|col| {
            row.get_any(std::slice::from_ref(col))
                .map(|v| norm_text(&v.to_text()))
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join("||")
}

/// Group ledger rows by order key (first digit run of the order column).
///
/// Rows without an order key are discarded. Within an order, a row whose
/// dedupe key was already seen is dropped; the first occurrence wins.
pub fn group_by_order<'a, I>(rows: I, config: &LedgerConfig) -> GroupedOrders<'a>
where
    I: IntoIterator<Item = &'a CanonicalRow>,
{
    let mut out = GroupedOrders::default();
    let mut slot: HashMap<String, usize> = HashMap::new();
    let mut seen: Vec<HashSet<String>> = Vec::new();

    for row in rows {
        let Some(key) = row
            .get_any(&config.order)
            .and_then(|v| order_key(&v.to_text()))
        else {
            out.rows_without_order += 1;
            continue;
        };

        let idx = *slot.entry(key.clone()).or_insert_with(|| {
            out.groups.push(OrderGroup {
                key,
                rows: Vec::new(),
            });
            seen.push(HashSet::new());
            out.groups.len() - 1
        });

        if !seen[idx].insert(dedupe_key(row, &config.dedupe_columns)) {
            out.duplicate_rows += 1;
            continue;
        }
        out.groups[idx].rows.push(row);
    }

    debug!(
        "grouped {} orders ({} duplicate rows dropped, {} rows without order number)",
        out.groups.len(),
        out.duplicate_rows,
        out.rows_without_order
    );
    out
}
