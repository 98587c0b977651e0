//! Error types
//!
//! Only file-level failures surface as errors. Everything below the file
//! level (a missing sheet, a bad address, a malformed formula) degrades to
//! "no value" instead; see [`crate::resolver`] and [`crate::formula`].

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a file into a [`crate::reader::Workbook`]
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid spreadsheet: {0}")]
    InvalidWorkbook(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to load a mapping set
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("unsupported mapping file extension: {0}")]
    UnsupportedFormat(String),

    #[error("invalid JSON mapping: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML mapping: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a formula produced no value.
///
/// Callers of [`crate::formula::EvalContext::evaluate`] only see `None`;
/// the error is logged at debug level.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("formula nested too deeply")]
    TooDeep,

    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("text {0:?} used as a number")]
    UnexpectedText(String),

    #[error("cell reference {0} has no local workbook")]
    NoLocalWorkbook(String),
}
