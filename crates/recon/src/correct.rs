use log::debug;

use crate::config::LedgerConfig;
use crate::model::{CanonicalRow, CellCorrection, TotalStatus};
use crate::totals::TotalCheck;

/// Round to cents.
pub fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Whether a total check is confident enough to overwrite the ledger.
///
/// Only mismatches with a finite expected total qualify, and never when the
/// expected total is zero while the ledger reports a non-zero amount.
pub fn should_correct(check: &TotalCheck) -> bool {
    if check.status != TotalStatus::Mismatch || !check.expected_total.is_finite() {
        return false;
    }
    let reported_nonzero = check.reported_total.is_some_and(|r| r.is_finite() && r != 0.0);
    !(check.expected_total == 0.0 && reported_nonzero)
}

/// Correction for one order: the first row with a non-blank Total cell gets
/// the expected total rounded to cents.
pub fn propose_correction(
    order: &str,
    rows: &[&CanonicalRow],
    check: &TotalCheck,
    ledger: &LedgerConfig,
) -> Option<CellCorrection> {
    if !should_correct(check) {
        return None;
    }

    let (row, column) = rows.iter().copied().find_map(|row| {
        let column = row.layout().find_column(&ledger.total)?;
        let value = row.get(column).ok()?;
        (!value.is_blank()).then_some((row, column))
    })?;

    let cell = row.cell_address(column).ok()?;
    let old_value = row.get(column).ok()?.clone();
    let new_value = round_cents(check.expected_total);
    debug!(
        "order {order}: propose {}!{cell} {} -> {new_value}",
        row.source_sheet(),
        old_value
    );

    Some(CellCorrection {
        sheet: row.source_sheet().to_string(),
        cell,
        old_value,
        new_value,
        order: order.to_string(),
        column: column.to_string(),
        row_index: row.source_row_index(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellAddress, CellValue, RawSheet, RowRef};
    use crate::normalize::normalize_sheet;

    fn check(expected: f64, reported: Option<f64>, status: TotalStatus) -> TotalCheck {
        TotalCheck {
            base_total: expected,
            upsell_total: 0.0,
            expected_total: expected,
            reported_total: reported,
            difference: reported.map(|r| r - expected),
            status,
        }
    }

    fn rows() -> Vec<CanonicalRow> {
        normalize_sheet(&RawSheet {
            name: "March".into(),
            origin: CellAddress::new(0, 0),
            rows: vec![
                vec![CellValue::from("Order#"), CellValue::from("Cost"), CellValue::from("Total")],
                vec![CellValue::from("#9"), CellValue::Number(10.0), CellValue::Empty],
                vec![CellValue::from("#9"), CellValue::Number(20.456), CellValue::Number(50.0)],
            ],
        })
        .rows
    }

    #[test]
    fn rounding_to_cents() {
        assert_eq!(round_cents(30.456), 30.46);
        assert_eq!(round_cents(0.125), 0.13);
        assert_eq!(round_cents(35.0), 35.0);
    }

    #[test]
    fn targets_first_non_blank_total_cell() {
        let rows = rows();
        let refs: Vec<&CanonicalRow> = rows.iter().collect();
        let c = propose_correction(
            "9",
            &refs,
            &check(30.456, Some(50.0), TotalStatus::Mismatch),
            &LedgerConfig::default(),
        )
        .unwrap();
        assert_eq!(c.sheet, "March");
        assert_eq!(c.cell.to_string(), "C3");
        assert_eq!(c.old_value, CellValue::Number(50.0));
        assert_eq!(c.new_value, 30.46);
        assert_eq!(c.column, "Total");
        assert_eq!(c.cell.row, 2);
        assert_eq!(c.row_index, 1);
        assert_eq!(c.row_index, RowRef::from(refs[1]).row_index);
    }

    #[test]
    fn no_correction_for_ok_or_zero_expected() {
        assert!(!should_correct(&check(35.0, Some(35.0), TotalStatus::Ok)));
        assert!(!should_correct(&check(0.0, Some(40.0), TotalStatus::Mismatch)));
        assert!(!should_correct(&check(f64::NAN, Some(40.0), TotalStatus::Mismatch)));
        assert!(should_correct(&check(35.0, Some(70.0), TotalStatus::Mismatch)));
    }

    #[test]
    fn no_target_cell_means_no_correction() {
        let sheet = normalize_sheet(&RawSheet {
            name: "S".into(),
            origin: CellAddress::new(0, 0),
            rows: vec![
                vec![CellValue::from("Order#"), CellValue::from("Cost")],
                vec![CellValue::from("#1"), CellValue::Number(5.0)],
            ],
        });
        let refs: Vec<&CanonicalRow> = sheet.rows.iter().collect();
        assert!(propose_correction(
            "1",
            &refs,
            &check(5.0, Some(9.0), TotalStatus::Mismatch),
            &LedgerConfig::default()
        )
        .is_none());
    }
}
