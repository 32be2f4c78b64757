//! `ordercheck check` — run reconciliation over a ledger workbook.

use std::path::{Path, PathBuf};

use clap::Args;
use ordercheck_io::{load_remote_book, patch_xlsx_file, read_workbook, WorkbookFormat};
use ordercheck_recon::model::{MatchStatus, TotalStatus};
use ordercheck_recon::{run, ReconConfig, ReconInput, ReconReport};
use serde::Serialize;

use crate::exit_codes::EXIT_CHECK_MISMATCH;
use crate::{load_config, CliError};

const DEFAULT_STORE: &str = "default";

#[derive(Args)]
pub struct CheckArgs {
    /// Ledger workbook (xlsx, xlsm, xls, xlsb, ods, csv)
    #[arg(long)]
    pub ledger: PathBuf,

    /// Quotation workbook with the price matrix
    #[arg(long)]
    pub quotation: Option<PathBuf>,

    /// Remote orders file as STORE=PATH (repeatable)
    #[arg(long, value_name = "[STORE=]PATH")]
    pub orders: Vec<String>,

    /// TOML config file (column names, routing, tolerance)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Store for orders no routing rule claims, and for bare --orders paths
    #[arg(long)]
    pub store: Option<String>,

    /// Print the JSON report to stdout instead of a summary
    #[arg(long)]
    pub json: bool,

    /// Write the JSON report to a file
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Write proposed cell corrections as JSON
    #[arg(long)]
    pub corrections: Option<PathBuf>,

    /// Write a corrected copy of the ledger (xlsx/xlsm only)
    #[arg(long)]
    pub patched: Option<PathBuf>,

    /// Exit 3 when any order has a total or item mismatch
    #[arg(long)]
    pub strict: bool,
}

/// Split `STORE=PATH`. A bare path, or one whose prefix looks like a path,
/// belongs to `default_store`.
pub fn parse_orders_arg(arg: &str, default_store: &str) -> Result<(String, PathBuf), CliError> {
    if let Some((store, path)) = arg.split_once('=') {
        let store = store.trim();
        if !store.is_empty() && !store.contains(['/', '\\', '.']) {
            if path.trim().is_empty() {
                return Err(CliError::usage(format!("--orders {arg:?}: missing path"))
                    .with_hint("use --orders STORE=PATH"));
            }
            return Ok((store.to_lowercase(), PathBuf::from(path)));
        }
    }
    Ok((default_store.to_string(), PathBuf::from(arg)))
}

pub fn cmd_check(args: CheckArgs, quiet: bool) -> Result<(), CliError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ReconConfig::default(),
    };

    let default_store = args
        .store
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| DEFAULT_STORE.to_string());

    let mut sources = Vec::with_capacity(args.orders.len());
    for arg in &args.orders {
        sources.push(parse_orders_arg(arg, &default_store)?);
    }
    let bare_paths = sources.iter().any(|(store, _)| *store == default_store);
    if config.routing.default_store.is_none() && (args.store.is_some() || bare_paths) {
        config.routing.default_store = Some(default_store.clone());
    }

    if args.patched.is_some() {
        require_xlsx(&args.ledger)?;
    }

    let ledger = read_workbook(&args.ledger)?;
    let quotation = match &args.quotation {
        Some(path) => read_workbook(path)?,
        None => Vec::new(),
    };
    let input = ReconInput {
        ledger,
        quotation,
        remote: load_remote_book(&sources),
    };

    let report = run(&config, &input);

    if let Some(path) = &args.output {
        write_json(path, &report)?;
    }
    if let Some(path) = &args.corrections {
        write_json(path, &report.corrections)?;
    }
    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::general(format!("cannot serialize report: {e}")))?;
        println!("{json}");
    } else if !quiet {
        print_summary(&args.ledger, &report);
    }

    if let Some(out) = &args.patched {
        let patch = patch_xlsx_file(&args.ledger, out, &report.corrections).map_err(|e| {
            CliError::write(format!("cannot write {}: {e}", out.display()))
        })?;
        if !quiet && !args.json {
            eprintln!(
                "patched: {} cells written to {} ({} skipped)",
                patch.applied.len(),
                out.display(),
                patch.skipped.len()
            );
            for s in &patch.skipped {
                eprintln!("  skipped {}!{}: {}", s.correction.sheet, s.correction.cell, s.reason);
            }
        }
    }

    let s = &report.summary;
    if args.strict && (s.total_mismatches > 0 || s.item_mismatches > 0) {
        return Err(CliError::new(
            EXIT_CHECK_MISMATCH,
            format!(
                "{} total mismatches, {} item mismatches",
                s.total_mismatches, s.item_mismatches
            ),
        ));
    }

    Ok(())
}

pub fn require_xlsx(path: &Path) -> Result<(), CliError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match (WorkbookFormat::from_path(path)?, ext.as_str()) {
        (WorkbookFormat::Spreadsheet, "xlsx" | "xlsm") => Ok(()),
        _ => Err(CliError::usage(format!(
            "{} cannot be patched in place",
            path.display()
        ))
        .with_hint("only xlsx/xlsm ledgers can be patched; use --corrections to export the fixes")),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::general(format!("cannot serialize: {e}")))?;
    std::fs::write(path, json + "\n")
        .map_err(|e| CliError::write(format!("cannot write {}: {e}", path.display())))
}

fn print_summary(ledger: &Path, report: &ReconReport) {
    let s = &report.summary;
    eprintln!(
        "ledger: {} ({} sheets, {} rows, {} duplicates dropped)",
        ledger.display(),
        report.meta.ledger_sheets.len(),
        s.rows_read,
        s.duplicate_rows_dropped
    );
    if s.rows_without_order > 0 {
        eprintln!("rows without order number: {}", s.rows_without_order);
    }
    eprintln!("orders: {}", s.orders);
    eprintln!("total_mismatch: {}", s.total_mismatches);
    eprintln!(
        "items: {} match, {} mismatch, {} not found, {} source error",
        s.item_matches, s.item_mismatches, s.not_found, s.source_errors
    );
    eprintln!("corrections: {}", s.corrections);

    for r in &report.results {
        if r.status == TotalStatus::Mismatch {
            let reported = r
                .reported_total
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".into());
            eprintln!(
                "  #{} total: reported {}, expected {} ({}{})",
                r.order,
                reported,
                r.expected_total,
                if r.difference.unwrap_or(0.0) >= 0.0 { "+" } else { "" },
                r.difference.unwrap_or(0.0)
            );
        }
        if r.match_status == MatchStatus::Mismatch {
            eprintln!(
                "  #{} items: ledger [{}] vs store [{}]",
                r.order,
                r.ledger_signature.join(", "),
                r.remote_signature.join(", ")
            );
        }
    }

    if !report.warnings.is_empty() {
        eprintln!("data quality ({}):", report.warnings.len());
        for w in &report.warnings {
            eprintln!("  {w}");
        }
    }
}
