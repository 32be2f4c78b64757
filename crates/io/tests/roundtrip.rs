use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Path;

use ordercheck_io::{patch_xlsx_file, read_workbook};
use ordercheck_recon::{run, CellValue, ReconConfig, ReconInput, RemoteBook};
use rust_xlsxwriter::{Formula, Workbook};

fn write_ledger(path: &Path) {
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name("January").unwrap();
    for (col, h) in ["Store", "Order#", "Country", "SKU", "QTY", "Cost", "Upsell", "Total"]
        .iter()
        .enumerate()
    {
        sheet.write_string(0, col as u16, *h).unwrap();
    }

    let rows: [(&str, f64, f64, f64); 4] = [
        ("#1", 10.0, 0.0, 35.5),
        ("#1", 20.5, 5.0, 35.5),
        ("#2", 12.0, 0.0, 40.0),
        ("#3", 7.0, 0.0, 0.0),
    ];
    for (i, (order, cost, upsell, total)) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        sheet.write_string(r, 0, "Bloomommy").unwrap();
        sheet.write_string(r, 1, *order).unwrap();
        sheet.write_string(r, 2, "FR").unwrap();
        sheet.write_string(r, 3, "BL3").unwrap();
        sheet.write_number(r, 4, 1.0).unwrap();
        sheet.write_number(r, 5, *cost).unwrap();
        sheet.write_number(r, 6, *upsell).unwrap();
        if *order == "#3" {
            sheet
                .write_formula(r, 7, Formula::new("=5*2").set_result("10"))
                .unwrap();
        } else {
            sheet.write_number(r, 7, *total).unwrap();
        }
    }

    let notes = workbook.add_worksheet();
    notes.set_name("Notes").unwrap();
    notes.write_string(0, 0, "untouched").unwrap();

    workbook.save(path).unwrap();
}

fn entries(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let bytes = std::fs::read(path).unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        out.insert(file.name().to_string(), data);
    }
    out
}

fn reconcile(path: &Path) -> ordercheck_recon::ReconReport {
    let input = ReconInput {
        ledger: read_workbook(path).unwrap(),
        quotation: vec![],
        remote: RemoteBook::new(),
    };
    run(&ReconConfig::default(), &input)
}

#[test]
fn read_check_patch_reread() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("ledger.xlsx");
    let patched = dir.path().join("ledger.patched.xlsx");
    write_ledger(&ledger);

    let report = reconcile(&ledger);
    assert_eq!(report.meta.ledger_sheets, vec!["January", "Notes"]);
    assert_eq!(report.summary.total_mismatches, 2);

    let cells: Vec<String> = report.corrections.iter().map(|c| c.cell.to_string()).collect();
    assert_eq!(cells, vec!["H4", "H5"]);
    assert_eq!(report.corrections[0].new_value, 12.0);
    assert_eq!(report.corrections[1].new_value, 7.0);

    let patch = patch_xlsx_file(&ledger, &patched, &report.corrections).unwrap();
    assert_eq!(patch.applied.len(), 2);
    assert!(patch.skipped.is_empty());
    assert_eq!(patch.formulas_dropped, 1);

    // Only the corrected worksheet part differs.
    let before = entries(&ledger);
    let after = entries(&patched);
    assert_eq!(
        before.keys().collect::<Vec<_>>(),
        after.keys().collect::<Vec<_>>()
    );
    let changed: Vec<&String> = before
        .iter()
        .filter(|(name, data)| after.get(*name) != Some(*data))
        .map(|(name, _)| name)
        .collect();
    assert_eq!(changed, vec!["xl/worksheets/sheet1.xml"]);

    let sheets = read_workbook(&patched).unwrap();
    let january = sheets[0].as_ref().unwrap();
    assert_eq!(january.rows[1][7], CellValue::Number(35.5));
    assert_eq!(january.rows[3][7], CellValue::Number(12.0));
    assert_eq!(january.rows[4][7], CellValue::Number(7.0));
    assert_eq!(january.rows[3][1], CellValue::from("#2"));

    let again = reconcile(&patched);
    assert_eq!(again.summary.total_mismatches, 0);
    assert!(again.corrections.is_empty());
}

#[test]
fn patching_nothing_keeps_every_entry() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("ledger.xlsx");
    let out = dir.path().join("copy.xlsx");
    write_ledger(&ledger);

    let patch = patch_xlsx_file(&ledger, &out, &[]).unwrap();
    assert!(patch.applied.is_empty());
    assert!(!patch.calc_chain_removed);
    assert_eq!(entries(&ledger), entries(&out));
}

#[test]
fn csv_ledger_reconciles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.csv");
    std::fs::write(
        &path,
        "Order#;Country;SKU;QTY;Cost;Upsell;Total\n#5;FR;CM12;1;10;0;10\n#6;FR;CM12;1;9;0;12\n",
    )
    .unwrap();

    let report = reconcile(&path);
    assert_eq!(report.meta.ledger_sheets, vec!["export"]);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[1].order, "6");
    assert_eq!(report.results[1].difference, Some(3.0));
}
