//! `ordercheck-recon` — order reconciliation engine.
//!
//! Pure engine crate: receives parsed worksheets and remote orders, returns
//! per-order results and proposed cell corrections. No file or network IO.

pub mod canon;
pub mod config;
pub mod correct;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod group;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod price;
pub mod routing;
pub mod totals;

pub use config::ReconConfig;
pub use engine::{run, ReconInput};
pub use error::{ColumnNotFound, ReconError};
pub use model::{CellAddress, CellCorrection, CellValue, RawSheet, ReconReport, RemoteBook, RemoteOrder};
