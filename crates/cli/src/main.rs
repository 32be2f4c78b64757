// ordercheck - reconcile order ledgers against quotations and the storefront

mod check;
mod exit_codes;
mod fetch;
mod logger;
mod patch;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use ordercheck_io::IoError;
use ordercheck_recon::{ReconConfig, ReconError};

use exit_codes::{EXIT_ERROR, EXIT_INPUT_PARSE, EXIT_OUTPUT_WRITE, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "ordercheck")]
#[command(about = "Reconcile order ledgers against quotation prices and Shopify orders")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// More log output on stderr (-v summaries, -vv stage detail)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a ledger workbook (exit 3 with --strict when anything mismatches)
    #[command(after_help = "\
Orders files are given as STORE=PATH; a bare PATH belongs to --store (or \"default\").

Examples:
  ordercheck check --ledger ledger.xlsx --quotation quotation.xlsx
  ordercheck check --ledger ledger.xlsx --quotation quotation.xlsx \\
      --orders cellumove_fr=fr.json --orders yuma=yuma.json --json
  ordercheck check --ledger ledger.xlsx --quotation q.xlsx --corrections fixes.json
  ordercheck check --ledger ledger.xlsx --quotation q.xlsx --patched ledger.fixed.xlsx
  ordercheck check --ledger ledger.csv --quotation q.xlsx --config ordercheck.toml --strict")]
    Check(check::CheckArgs),

    /// Write a corrections file into a copy of an xlsx ledger
    #[command(after_help = "\
Examples:
  ordercheck patch --ledger ledger.xlsx --corrections fixes.json --out ledger.fixed.xlsx
  ordercheck patch --ledger ledger.xlsx --corrections fixes.json --out ledger.xlsx --json")]
    Patch(patch::PatchArgs),

    /// Download a store's orders into an orders file
    #[command(after_help = "\
Credentials come from {STORE}_SHOPIFY_STORE_DOMAIN, {STORE}_SHOPIFY_CLIENT_ID and
{STORE}_SHOPIFY_CLIENT_SECRET; SHOPIFY_API_VERSION selects the Admin API version.

Examples:
  ordercheck fetch --store bloomommy --out bloomommy.json
  ordercheck fetch --store cellumove --out fr.json --limit 500
  ordercheck fetch --store yuma --max-pages 2 --token-cache ./tokens.json")]
    Fetch(fetch::FetchArgs),

    /// Validate a config file without running
    #[command(after_help = "\
Examples:
  ordercheck validate ordercheck.toml")]
    Validate {
        /// Path to the TOML config file
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  ordercheck-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(logger::level_for(cli.verbose, cli.quiet));

    let result = match cli.command {
        Commands::Check(args) => check::cmd_check(args, cli.quiet),
        Commands::Patch(args) => patch::cmd_patch(args, cli.quiet),
        Commands::Fetch(args) => fetch::cmd_fetch(args, cli.quiet),
        Commands::Validate { config } => cmd_validate(config, cli.quiet),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self::new(EXIT_INPUT_PARSE, msg)
    }

    pub fn write(msg: impl Into<String>) -> Self {
        Self::new(EXIT_OUTPUT_WRITE, msg)
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<IoError> for CliError {
    fn from(e: IoError) -> Self {
        match e {
            IoError::UnsupportedFormat(_) => Self::usage(e.to_string())
                .with_hint("supported: xlsx, xlsm, xlsb, xls, ods, csv, tsv"),
            other => Self::input(other.to_string()),
        }
    }
}

/// Read and validate a config file.
pub fn load_config(path: &std::path::Path) -> Result<ReconConfig, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::usage(format!("cannot read config {}: {e}", path.display())))?;
    ReconConfig::from_toml(&text).map_err(|e| {
        let err = CliError::usage(format!("{}: {e}", path.display()));
        match e {
            ReconError::ConfigParse(_) => err.with_hint("check the TOML syntax and section names"),
            _ => err,
        }
    })
}

fn cmd_validate(path: PathBuf, quiet: bool) -> Result<(), CliError> {
    let config = load_config(&path)?;
    if !quiet {
        eprintln!("config OK: {}", path.display());
        eprintln!("  tolerance: {}", config.ledger.tolerance);
        eprintln!("  routing rules: {}", config.routing.rules.len());
        if let Some(store) = &config.routing.default_store {
            eprintln!("  default store: {store}");
        }
    }
    Ok(())
}
