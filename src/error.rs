use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("input file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("unsupported file format: {0} (expected .csv, .xlsx, .xls, .xlsm or .ods)")]
    UnsupportedFormat(String),

    #[error("missing required columns: {}", .missing.join(", "))]
    SchemaError { missing: Vec<String> },

    #[error("not enough students: the tier quotas need at least {required}, roster has {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("cannot write {}: the file is open in another program or not writable", .0.display())]
    ExportLocked(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("spreadsheet parse failed: {0}")]
    ExcelParseError(String),

    #[error("CSV parse failed: {0}")]
    CsvParseError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for AllocationError {
    fn from(err: csv::Error) -> Self {
        AllocationError::CsvParseError(err.to_string())
    }
}

impl From<calamine::Error> for AllocationError {
    fn from(err: calamine::Error) -> Self {
        AllocationError::ExcelParseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AllocationError>;
