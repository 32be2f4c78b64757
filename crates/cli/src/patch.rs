//! `ordercheck patch` — apply a corrections file to an xlsx ledger.

use std::path::PathBuf;

use clap::Args;
use ordercheck_io::patch_xlsx_file;
use ordercheck_recon::CellCorrection;

use crate::check::require_xlsx;
use crate::CliError;

#[derive(Args)]
pub struct PatchArgs {
    /// Ledger workbook to read (xlsx/xlsm)
    #[arg(long)]
    pub ledger: PathBuf,

    /// Corrections JSON written by `check --corrections`
    #[arg(long)]
    pub corrections: PathBuf,

    /// Output workbook (may be the ledger itself)
    #[arg(long)]
    pub out: PathBuf,

    /// Print the patch report as JSON to stdout
    #[arg(long)]
    pub json: bool,
}

pub fn load_corrections(path: &std::path::Path) -> Result<Vec<CellCorrection>, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::input(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text).map_err(|e| {
        CliError::input(format!("{}: not a corrections file: {e}", path.display()))
            .with_hint("generate one with `ordercheck check --corrections FILE`")
    })
}

pub fn cmd_patch(args: PatchArgs, quiet: bool) -> Result<(), CliError> {
    require_xlsx(&args.ledger)?;
    let corrections = load_corrections(&args.corrections)?;

    let report = patch_xlsx_file(&args.ledger, &args.out, &corrections).map_err(|e| {
        CliError::write(format!("cannot patch {}: {e}", args.ledger.display()))
    })?;

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::general(format!("cannot serialize report: {e}")))?;
        println!("{json}");
    } else if !quiet {
        eprintln!("applied: {}", report.applied.len());
        eprintln!("skipped: {}", report.skipped.len());
        for s in &report.skipped {
            eprintln!(
                "  {}!{} (order {}): {}",
                s.correction.sheet, s.correction.cell, s.correction.order, s.reason
            );
        }
        if report.formulas_dropped > 0 {
            eprintln!("formulas replaced by values: {}", report.formulas_dropped);
        }
        if report.calc_chain_removed {
            eprintln!("note: calculation chain removed; Excel rebuilds it on open");
        }
        eprintln!("wrote: {}", args.out.display());
    }

    Ok(())
}
