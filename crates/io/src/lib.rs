//! `ordercheck-io` — file I/O around the reconciliation engine.
//!
//! Reads ledger and quotation workbooks into [`ordercheck_recon::RawSheet`]s,
//! loads remote order JSON into a [`ordercheck_recon::RemoteBook`], and writes
//! corrections back into xlsx packages.

pub mod error;
pub mod orders;
pub mod patch;
pub mod workbook;

pub use error::IoError;
pub use orders::{load_orders, load_remote_book, parse_orders};
pub use patch::{patch_xlsx, patch_xlsx_file, PatchReport, PatchedWorkbook, SkippedCorrection};
pub use workbook::{read_workbook, read_workbook_bytes, SheetResults, WorkbookFormat};
