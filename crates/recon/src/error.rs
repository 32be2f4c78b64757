use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty candidate list, bad tolerance, etc.).
    ConfigValidation(String),
    /// Malformed workbook or worksheet. Aborts the affected worksheet only.
    Parse { sheet: String, message: String },
    /// A required column is absent from a worksheet.
    MissingColumn { sheet: String, column: String },
    /// Remote order lookup failed for a store.
    RemoteLookup { store: String, message: String },
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Parse { sheet, message } => {
                write!(f, "sheet '{sheet}': cannot parse: {message}")
            }
            Self::MissingColumn { sheet, column } => {
                write!(f, "sheet '{sheet}': missing column '{column}'")
            }
            Self::RemoteLookup { store, message } => {
                write!(f, "store '{store}': remote lookup failed: {message}")
            }
        }
    }
}

impl std::error::Error for ReconError {}

/// Returned by [`crate::model::CanonicalRow`] accessors when a column is not
/// part of the row's worksheet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNotFound {
    pub sheet: String,
    pub column: String,
}

impl fmt::Display for ColumnNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column '{}' not found in sheet '{}'", self.column, self.sheet)
    }
}

impl std::error::Error for ColumnNotFound {}

impl From<ColumnNotFound> for ReconError {
    fn from(e: ColumnNotFound) -> Self {
        Self::MissingColumn { sheet: e.sheet, column: e.column }
    }
}
