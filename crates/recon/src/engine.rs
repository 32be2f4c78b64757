use log::{debug, info, warn};

use crate::canon::order_number;
use crate::config::{LedgerConfig, ReconConfig};
use crate::correct::propose_correction;
use crate::error::ReconError;
use crate::evidence::compute_summary;
use crate::group::group_by_order;
use crate::matcher::{ledger_signature, match_order, RemoteIndex};
use crate::model::{
    CanonicalRow, DataQualityWarning, RawSheet, ReconMeta, ReconReport, ReconciliationResult,
    RemoteBook, RowRef,
};
use crate::normalize::{normalize_workbook, NormalizedSheet};
use crate::price::{quote_order, Quotation};
use crate::routing::route_order;
use crate::totals::check_totals;

/// Everything one run reads. Worksheets that failed to parse are carried
/// as errors so they surface as warnings.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub ledger: Vec<Result<RawSheet, ReconError>>,
    pub quotation: Vec<Result<RawSheet, ReconError>>,
    pub remote: RemoteBook,
}

/// Run reconciliation. Always completes; problems with individual sheets,
/// columns or stores are reported in the result instead of aborting.
pub fn run(config: &ReconConfig, input: &ReconInput) -> ReconReport {
    let mut warnings = Vec::new();

    let ledger = normalize_workbook(&input.ledger, &mut warnings);
    let quotation_sheets = normalize_workbook(&input.quotation, &mut warnings);
    check_ledger_columns(&ledger, &config.ledger, &mut warnings);

    let quotation = Quotation::from_sheets(&quotation_sheets, &config.quotation, &mut warnings);
    let remote = RemoteIndex::build(&input.remote);

    let rows_read: usize = ledger.iter().map(|s| s.rows.len()).sum();
    let grouped = group_by_order(ledger.iter().flat_map(|s| s.rows.iter()), &config.ledger);

    let mut results = Vec::with_capacity(grouped.groups.len());
    let mut corrections = Vec::new();

    for group in &grouped.groups {
        let rows = group.rows.as_slice();
        let country = group_country(rows, &config.ledger);
        let totals = check_totals(rows, &config.ledger);
        let store = route_order(rows, &config.ledger, &config.routing);

        let lookup = remote.lookup(store.as_deref(), &group.key);
        let items = match_order(
            ledger_signature(rows, &config.ledger, &quotation.names),
            lookup,
            &config.matching,
        );
        let quote = quote_order(rows, country.as_deref(), &quotation, &config.ledger);

        if let Some(c) = propose_correction(&group.key, rows, &totals, &config.ledger) {
            corrections.push(c);
        }

        results.push(ReconciliationResult {
            order: group.key.clone(),
            country,
            store,
            base_total: totals.base_total,
            upsell_total: totals.upsell_total,
            expected_total: totals.expected_total,
            reported_total: totals.reported_total,
            difference: totals.difference,
            status: totals.status,
            items_compared: items.items_compared,
            match_status: items.status,
            match_detail: items.detail,
            ledger_signature: items.ledger_signature,
            remote_signature: items.remote_signature,
            quoted_total: quote.total,
            pricing_notes: quote.notes,
            rows: rows.iter().map(|r| RowRef::from(*r)).collect(),
        });
    }

    results.sort_by(|a, b| {
        order_number(&a.order)
            .cmp(&order_number(&b.order))
            .then_with(|| a.order.cmp(&b.order))
    });
    corrections.sort_by(|a, b| {
        order_number(&a.order)
            .cmp(&order_number(&b.order))
            .then_with(|| a.order.cmp(&b.order))
    });

    let mut summary = compute_summary(&results);
    summary.corrections = corrections.len();
    summary.rows_read = rows_read;
    summary.duplicate_rows_dropped = grouped.duplicate_rows;
    summary.rows_without_order = grouped.rows_without_order;

    info!(
        "reconciled {} orders: {} total mismatches, {} item mismatches, {} not found, {} source errors, {} corrections",
        summary.orders,
        summary.total_mismatches,
        summary.item_mismatches,
        summary.not_found,
        summary.source_errors,
        summary.corrections
    );

    ReconReport {
        meta: ReconMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            ledger_sheets: ledger.iter().map(|s| s.name().to_string()).collect(),
            quotation_sheets: quotation_sheets.iter().map(|s| s.name().to_string()).collect(),
            stores: input.remote.stores.keys().cloned().collect(),
        },
        summary,
        results,
        corrections,
        warnings,
    }
}

/// First non-blank country cell of the group, trimmed.
fn group_country(rows: &[&CanonicalRow], ledger: &LedgerConfig) -> Option<String> {
    rows.iter().find_map(|row| {
        row.get_any(&ledger.country)
            .filter(|v| !v.is_blank())
            .map(|v| v.to_text().trim().to_string())
    })
}

/// Warn about ledger sheets lacking a column the checks rely on.
fn check_ledger_columns(
    sheets: &[NormalizedSheet],
    ledger: &LedgerConfig,
    warnings: &mut Vec<DataQualityWarning>,
) {
    let required = [
        &ledger.order,
        &ledger.country,
        &ledger.qty,
        &ledger.item,
        &ledger.cost,
        &ledger.upsell,
        &ledger.total,
    ];
    for sheet in sheets {
        if sheet.rows.is_empty() {
            debug!("ledger sheet '{}' has no data rows", sheet.name());
            continue;
        }
        for candidates in required {
            if sheet.layout.find_column(candidates).is_none() {
                let column = candidates.first().cloned().unwrap_or_default();
                warn!("ledger sheet '{}' has no '{column}' column", sheet.name());
                warnings.push(DataQualityWarning::MissingColumn {
                    sheet: sheet.name().to_string(),
                    column,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellAddress, CellValue, LineItems, MatchStatus, RemoteLineItem, RemoteOrder, TotalStatus};

    fn t(s: &str) -> CellValue {
        CellValue::from(s)
    }

    fn n(v: f64) -> CellValue {
        CellValue::Number(v)
    }

    fn raw(name: &str, rows: Vec<Vec<CellValue>>) -> Result<RawSheet, ReconError> {
        Ok(RawSheet {
            name: name.into(),
            origin: CellAddress::new(0, 0),
            rows,
        })
    }

    fn header() -> Vec<CellValue> {
        ["Store", "Order#", "Country", "SKU", "QTY", "Cost", "Upsell", "Total"]
            .iter()
            .map(|h| t(h))
            .collect()
    }

    fn remote(name: &str, title: &str, qty: f64) -> RemoteOrder {
        RemoteOrder {
            name: name.into(),
            line_items: LineItems::List(vec![RemoteLineItem {
                title: Some(title.into()),
                quantity: Some(qty),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn results_sorted_and_corrections_emitted() {
        let mut book = RemoteBook::new();
        book.insert_loaded("bloomommy", vec![remote("#20", "Belt", 1.0)]);

        let input = ReconInput {
            ledger: vec![raw(
                "Orders",
                vec![
                    header(),
                    vec![t("Bloomommy"), t("#20"), t("FR"), t("BL3"), n(1.0), n(10.0), n(0.0), n(50.0)],
                    vec![t("Bloomommy"), t("#3"), t("FR"), t("BL3"), n(1.0), n(10.0), n(0.0), n(10.0)],
                ],
            )],
            quotation: vec![],
            remote: book,
        };
        let report = run(&ReconConfig::default(), &input);

        let orders: Vec<&str> = report.results.iter().map(|r| r.order.as_str()).collect();
        assert_eq!(orders, vec!["3", "20"]);
        assert_eq!(report.results[1].status, TotalStatus::Mismatch);
        assert_eq!(report.corrections.len(), 1);
        assert_eq!(report.corrections[0].cell.to_string(), "H2");
        assert_eq!(report.corrections[0].new_value, 10.0);
        assert_eq!(report.results[0].match_status, MatchStatus::NotFound);
        // BL3 has no quotation name, so the ledger side reads "bl3" against "belt".
        assert_eq!(report.results[1].match_status, MatchStatus::Mismatch);
    }

    #[test]
    fn unrouted_orders_are_not_found_and_failed_stores_are_source_errors() {
        let mut book = RemoteBook::new();
        book.insert_failed("yuma", "HTTP 503");
        let input = ReconInput {
            ledger: vec![raw(
                "Orders",
                vec![
                    header(),
                    vec![t("Yuma"), t("#1"), t("DE"), t("A1"), n(1.0), n(5.0), n(0.0), n(5.0)],
                    vec![t("Other"), t("#2"), t("DE"), t("A1"), n(1.0), n(5.0), n(0.0), n(5.0)],
                ],
            )],
            quotation: vec![],
            remote: book,
        };
        let report = run(&ReconConfig::default(), &input);
        assert_eq!(report.results[0].match_status, MatchStatus::SourceError);
        assert_eq!(report.results[0].store.as_deref(), Some("yuma"));
        assert_eq!(report.results[1].match_status, MatchStatus::NotFound);
        assert_eq!(report.results[1].store, None);
        assert_eq!(report.summary.source_errors, 1);
        assert_eq!(report.summary.not_found, 1);
    }

    #[test]
    fn missing_columns_and_broken_sheets_warn() {
        let input = ReconInput {
            ledger: vec![
                raw("Lean", vec![vec![t("Order#"), t("Total")], vec![t("#1"), n(5.0)]]),
                Err(ReconError::Parse {
                    sheet: "Broken".into(),
                    message: "truncated".into(),
                }),
            ],
            quotation: vec![],
            remote: RemoteBook::new(),
        };
        let report = run(&ReconConfig::default(), &input);
        assert!(report.warnings.contains(&DataQualityWarning::MissingColumn {
            sheet: "Lean".into(),
            column: "Cost".into(),
        }));
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, DataQualityWarning::SheetSkipped { sheet, .. } if sheet == "Broken")));
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.meta.ledger_sheets, vec!["Lean"]);
    }
}
