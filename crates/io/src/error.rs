use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum IoError {
    /// Filesystem failure opening, reading or writing a path.
    Io { path: Option<PathBuf>, message: String },
    /// The workbook container (xlsx ZIP, xls CFB, ods) could not be read.
    Workbook(String),
    Zip(String),
    Xml { part: String, message: String },
    Csv(String),
    Json(String),
    UnsupportedFormat(String),
}

impl IoError {
    pub fn at(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: Some(path.into()),
            message: err.to_string(),
        }
    }

    pub(crate) fn xml(part: &str, err: impl fmt::Display) -> Self {
        Self::Xml {
            part: part.to_string(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path: Some(p), message } => write!(f, "{}: {message}", p.display()),
            Self::Io { path: None, message } => write!(f, "io error: {message}"),
            Self::Workbook(msg) => write!(f, "cannot read workbook: {msg}"),
            Self::Zip(msg) => write!(f, "zip error: {msg}"),
            Self::Xml { part, message } => write!(f, "{part}: XML error: {message}"),
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::Json(msg) => write!(f, "JSON error: {msg}"),
            Self::UnsupportedFormat(ext) => write!(f, "unsupported file format: {ext}"),
        }
    }
}

impl std::error::Error for IoError {}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            path: None,
            message: e.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for IoError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Zip(e.to_string())
    }
}

impl From<serde_json::Error> for IoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}
