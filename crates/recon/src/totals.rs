use crate::canon::parse_price;
use crate::config::LedgerConfig;
use crate::model::{CanonicalRow, TotalStatus};

/// Monetary check of one order group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TotalCheck {
    pub base_total: f64,
    pub upsell_total: f64,
    pub expected_total: f64,
    pub reported_total: Option<f64>,
    pub difference: Option<f64>,
    pub status: TotalStatus,
}

/// Pick the reported order total from a group's Total cells.
///
/// The Total column either repeats the order total on every row or holds a
/// per-line amount. Identical values (at 6 decimals) are taken as-is.
/// Otherwise the sum and the max are compared against `expected`; the
/// closer one wins, ties going to the sum.
pub fn resolve_reported_total(totals: &[f64], expected: f64) -> Option<f64> {
    let first = *totals.first()?;

    let at_six = |v: f64| (v * 1e6).round() / 1e6;
    if totals.iter().all(|v| at_six(*v) == at_six(first)) {
        return Some(at_six(first));
    }

    let sum: f64 = totals.iter().sum();
    if !expected.is_finite() {
        return Some(sum);
    }
    let max = totals.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if (sum - expected).abs() <= (max - expected).abs() {
        Some(sum)
    } else {
        Some(max)
    }
}

/// Expected vs reported totals for an order's rows.
pub fn check_totals(rows: &[&CanonicalRow], config: &LedgerConfig) -> TotalCheck {
    let mut base_total = 0.0;
    let mut upsell_total = 0.0;
    let mut totals = Vec::new();

    for row in rows {
        let price = |candidates: &[String]| row.get_any(candidates).and_then(parse_price);
        if let Some(cost) = price(config.cost.as_slice()).filter(|c| *c > 0.0) {
            base_total += cost;
        }
        if let Some(upsell) = price(config.upsell.as_slice()).filter(|u| *u > 0.0) {
            upsell_total += upsell;
        }
        if let Some(total) = price(config.total.as_slice()).filter(|v| *v != 0.0) {
            totals.push(total);
        }
    }

    let expected_total = base_total + upsell_total;
    let reported_total = resolve_reported_total(&totals, expected_total);
    let difference = reported_total.map(|r| r - expected_total);
    let status = match difference {
        Some(d) if !d.is_nan() && d.abs() > config.tolerance => TotalStatus::Mismatch,
        _ => TotalStatus::Ok,
    };

    TotalCheck {
        base_total,
        upsell_total,
        expected_total,
        reported_total,
        difference,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellAddress, CellValue, RawSheet};
    use crate::normalize::normalize_sheet;

    fn sheet(data: &[(&str, &str, &str)]) -> Vec<CanonicalRow> {
        let mut rows = vec![vec![
            CellValue::from("Cost"),
            CellValue::from("Upsell"),
            CellValue::from("Total"),
        ]];
        for (c, u, t) in data {
            rows.push(vec![CellValue::from(*c), CellValue::from(*u), CellValue::from(*t)]);
        }
        normalize_sheet(&RawSheet {
            name: "Orders".into(),
            origin: CellAddress::new(0, 0),
            rows,
        })
        .rows
    }

    fn check(data: &[(&str, &str, &str)]) -> TotalCheck {
        let rows = sheet(data);
        let refs: Vec<&CanonicalRow> = rows.iter().collect();
        check_totals(&refs, &LedgerConfig::default())
    }

    #[test]
    fn expected_sums_positive_costs_and_upsells() {
        let c = check(&[("10", "0", "35"), ("20", "5", "35")]);
        assert_eq!(c.base_total, 30.0);
        assert_eq!(c.upsell_total, 5.0);
        assert_eq!(c.expected_total, 35.0);
    }

    #[test]
    fn negative_amounts_are_ignored() {
        let c = check(&[("10", "-3", ""), ("-4", "2", "")]);
        assert_eq!(c.expected_total, 12.0);
    }

    #[test]
    fn repeated_total_is_taken_once() {
        let c = check(&[("10", "", "35"), ("20", "5", "35"), ("", "", "35")]);
        assert_eq!(c.reported_total, Some(35.0));
        assert_eq!(c.status, TotalStatus::Ok);
    }

    #[test]
    fn mixed_totals_pick_sum_or_max() {
        assert_eq!(resolve_reported_total(&[35.0, 70.0], 105.0), Some(105.0));
        assert_eq!(resolve_reported_total(&[30.0, 70.0], 75.0), Some(70.0));
        assert_eq!(resolve_reported_total(&[35.0, 70.0], 35.0), Some(70.0));
        assert_eq!(resolve_reported_total(&[10.0, 50.0, 70.0], 10.0), Some(70.0));
        assert_eq!(resolve_reported_total(&[10.0, 20.0], f64::NAN), Some(30.0));
        assert_eq!(resolve_reported_total(&[], 10.0), None);
    }

    #[test]
    fn equal_distance_goes_to_sum() {
        assert_eq!(resolve_reported_total(&[10.0, 20.0], 25.0), Some(30.0));
    }

    #[test]
    fn per_line_value_near_expected_does_not_hide_mismatch() {
        let c = check(&[("10", "", "10"), ("", "", "50"), ("", "", "70")]);
        assert_eq!(c.expected_total, 10.0);
        assert_eq!(c.reported_total, Some(70.0));
        assert_eq!(c.difference, Some(60.0));
        assert_eq!(c.status, TotalStatus::Mismatch);
    }

    #[test]
    fn max_wins_when_closest() {
        let c = check(&[("50", "25", "30"), ("", "", "70")]);
        assert_eq!(c.reported_total, Some(70.0));
        assert_eq!(c.status, TotalStatus::Mismatch);
    }

    #[test]
    fn no_reported_total_is_ok() {
        let c = check(&[("10", "", ""), ("5", "", "n/a")]);
        assert_eq!(c.reported_total, None);
        assert_eq!(c.difference, None);
        assert_eq!(c.status, TotalStatus::Ok);
    }

    #[test]
    fn tolerance_boundary() {
        let c = check(&[("10", "", "10.01")]);
        assert_eq!(c.status, TotalStatus::Ok);
        let c = check(&[("10", "", "10.02")]);
        assert_eq!(c.status, TotalStatus::Mismatch);
    }

    #[test]
    fn currency_text_is_parsed() {
        let c = check(&[("$10", "€5", "US$15")]);
        assert_eq!(c.expected_total, 15.0);
        assert_eq!(c.status, TotalStatus::Ok);
    }
}
