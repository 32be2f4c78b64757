use ordercheck_recon::engine::{run, ReconInput};
use ordercheck_recon::model::{
    CellAddress, CellValue, LineItemEdge, LineItems, MatchStatus, RawSheet, RemoteBook,
    RemoteLineItem, RemoteOrder, TotalStatus,
};
use ordercheck_recon::{ReconConfig, ReconError};
use proptest::prelude::*;

fn t(s: &str) -> CellValue {
    CellValue::from(s)
}

fn n(v: f64) -> CellValue {
    CellValue::Number(v)
}

fn sheet(name: &str, rows: Vec<Vec<CellValue>>) -> Result<RawSheet, ReconError> {
    Ok(RawSheet {
        name: name.into(),
        origin: CellAddress::new(0, 0),
        rows,
    })
}

fn ledger_header() -> Vec<CellValue> {
    [
        "Store", "Order#", "Country", "Tracking", "Carrier", "SKU", "QTY", "Cost", "Upsell",
        "Total",
    ]
    .iter()
    .map(|h| t(h))
    .collect()
}

#[allow(clippy::too_many_arguments)]
fn ledger_row(
    store: &str,
    order: &str,
    country: &str,
    sku: &str,
    qty: f64,
    cost: f64,
    upsell: f64,
    total: CellValue,
) -> Vec<CellValue> {
    vec![
        t(store),
        t(order),
        t(country),
        t("TRK1"),
        t("DHL"),
        t(sku),
        n(qty),
        n(cost),
        n(upsell),
        total,
    ]
}

fn quotation() -> Vec<Result<RawSheet, ReconError>> {
    vec![
        sheet(
            "Quotation",
            vec![
                vec![t("SKU"), t("Item name"), t("QTY"), t("Total to\nFR"), t("Upsell to FR")],
                vec![t("CM12"), t("Anti-Cellulite Leggings™"), n(1.0), n(10.0), n(5.0)],
                vec![t("CM12"), t("Anti-Cellulite Leggings™"), n(2.0), n(20.0), n(10.0)],
                vec![t("SL7"), t("Compression Sleeves"), n(1.0), n(12.0), n(6.0)],
            ],
        ),
        sheet(
            "QTY=1-5",
            vec![
                vec![t("SKU"), t("QTY"), t("Total to FR"), t("Upsell to FR")],
                vec![t("CM12"), n(2.0), n(18.0), n(9.0)],
            ],
        ),
    ]
}

fn remote_item(title: &str, qty: f64) -> LineItemEdge {
    LineItemEdge {
        node: RemoteLineItem {
            title: Some(title.into()),
            quantity: Some(qty),
            fulfillment_status: Some("FULFILLED".into()),
            ..Default::default()
        },
    }
}

fn remote_order(name: &str, items: Vec<LineItemEdge>) -> RemoteOrder {
    RemoteOrder {
        name: name.into(),
        line_items: LineItems::Connection { edges: items },
        ..Default::default()
    }
}

fn input() -> ReconInput {
    let mut book = RemoteBook::new();
    book.insert_loaded(
        "cellumove_fr",
        vec![
            remote_order(
                "#12345",
                vec![
                    remote_item("Anti-Cellulite Legging - Slim in 30 days", 2.0),
                    remote_item("Free E-book", 1.0),
                ],
            ),
            remote_order("#12346", vec![remote_item("Compression Sleeve", 1.0)]),
        ],
    );

    ReconInput {
        ledger: vec![
            sheet(
                "January",
                vec![
                    ledger_header(),
                    ledger_row("Cellumove (FR)", "#12345", "FR", "CM12-black", 1.0, 10.0, 0.0, n(35.0)),
                    ledger_row("Cellumove (FR)", "#12345", "FR", "CM12-pink", 1.0, 20.0, 5.0, n(35.0)),
                    ledger_row("Cellumove (FR)", "#12346", "FR", "SL7", 2.0, 12.0, 0.0, n(40.0)),
                    ledger_row("Cellumove (FR)", "#12347", "FR", "SL7", 1.0, 0.0, 0.0, n(25.0)),
                ],
            ),
            sheet(
                "February",
                vec![
                    ledger_header(),
                    ledger_row("Cellumove (FR)", "#12345", "FR", "CM12-black", 1.0, 10.0, 0.0, n(35.0)),
                    vec![CellValue::Empty; 10],
                    ledger_row("Yuma", "#900", "DE", "YU1", 1.0, 8.0, 0.0, CellValue::Empty),
                ],
            ),
        ],
        quotation: quotation(),
        remote: book,
    }
}

#[test]
fn full_pipeline() {
    let report = run(&ReconConfig::default(), &input());

    let orders: Vec<&str> = report.results.iter().map(|r| r.order.as_str()).collect();
    assert_eq!(orders, vec!["900", "12345", "12346", "12347"]);
    assert_eq!(report.summary.duplicate_rows_dropped, 1);
    assert_eq!(report.summary.rows_read, 6);

    let yuma = &report.results[0];
    assert_eq!(yuma.store.as_deref(), Some("yuma"));
    assert_eq!(yuma.reported_total, None);
    assert_eq!(yuma.status, TotalStatus::Ok);
    assert_eq!(yuma.match_status, MatchStatus::SourceError);

    let first = &report.results[1];
    assert_eq!(first.expected_total, 35.0);
    assert_eq!(first.reported_total, Some(35.0));
    assert_eq!(first.status, TotalStatus::Ok);
    assert_eq!(first.store.as_deref(), Some("cellumove_fr"));
    assert_eq!(first.ledger_signature, vec!["anti-cellulite legging||2"]);
    assert_eq!(first.match_status, MatchStatus::Match);
    assert_eq!(first.items_compared, 1);
    assert_eq!(first.rows.len(), 2);
    // Summed quantity 2 is priced from the tier sheet; one line carries an upsell.
    assert_eq!(first.quoted_total, Some(27.0));

    let second = &report.results[2];
    assert_eq!(second.status, TotalStatus::Mismatch);
    assert_eq!(second.difference, Some(28.0));
    assert_eq!(second.match_status, MatchStatus::Mismatch);
    assert_eq!(second.remote_signature, vec!["compression sleeve||1"]);
    assert_eq!(second.ledger_signature, vec!["compression sleeve||2"]);

    let free = &report.results[3];
    assert_eq!(free.expected_total, 0.0);
    assert_eq!(free.status, TotalStatus::Mismatch);
    assert_eq!(free.match_status, MatchStatus::NotFound);

    // Only order 12346 is corrected: 12347 has expected 0 with a reported total.
    assert_eq!(report.corrections.len(), 1);
    let c = &report.corrections[0];
    assert_eq!(c.order, "12346");
    assert_eq!(c.sheet, "January");
    assert_eq!(c.cell.to_string(), "J4");
    assert_eq!(c.old_value, CellValue::Number(40.0));
    assert_eq!(c.new_value, 12.0);
}

#[test]
fn quotation_warnings_surface() {
    let report = run(&ReconConfig::default(), &input());
    let text: Vec<String> = report.warnings.iter().map(|w| w.to_string()).collect();
    assert!(text.iter().any(|w| w.contains("PL") && w.contains("Total to GR")));
    assert!(text.iter().any(|w| w.contains("PT")));
}

#[test]
fn identical_inputs_serialize_identically() {
    let config = ReconConfig::default();
    let a = serde_json::to_string(&run(&config, &input())).unwrap();
    let b = serde_json::to_string(&run(&config, &input())).unwrap();
    assert_eq!(a, b);
}

#[test]
fn report_json_shape() {
    let report = run(&ReconConfig::default(), &input());
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["results"][0]["match_status"], "source-error");
    assert_eq!(json["results"][0]["reported_total"], serde_json::Value::Null);
    assert_eq!(json["results"][2]["status"], "mismatch");
    assert_eq!(json["corrections"][0]["cell"], "J4");
    assert_eq!(json["corrections"][0]["old_value"], 40.0);
}

#[test]
fn custom_tolerance_from_toml() {
    let config = ReconConfig::from_toml("[ledger]\ntolerance = 100.0\n").unwrap();
    let report = run(&config, &input());
    assert_eq!(report.summary.total_mismatches, 0);
    assert!(report.corrections.is_empty());
}

proptest! {
    #[test]
    fn runs_are_deterministic(
        costs in proptest::collection::vec(0u32..500, 1..6),
        total in 0u32..2000,
    ) {
        let mut rows = vec![ledger_header()];
        for (i, c) in costs.iter().enumerate() {
            rows.push(ledger_row(
                "Cellumove",
                &format!("#{}", 100 + i % 3),
                "FR",
                "CM12",
                1.0,
                *c as f64 / 10.0,
                0.0,
                n(total as f64 / 10.0),
            ));
        }
        let input = ReconInput {
            ledger: vec![sheet("Orders", rows)],
            quotation: quotation(),
            remote: RemoteBook::new(),
        };
        let config = ReconConfig::default();
        let a = serde_json::to_string(&run(&config, &input)).unwrap();
        let b = serde_json::to_string(&run(&config, &input)).unwrap();
        prop_assert_eq!(a, b);
    }
}
