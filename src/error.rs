use thiserror::Error;

#[derive(Error, Debug)]
pub enum WealthError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "xlsx")]
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Unsupported file type: {0} (accepted: .csv, .xlsx, .xls, .xlsm, .ods)")]
    UnsupportedFile(String),

    #[error("No sheets found in workbook")]
    NoSheets,

    #[error("Required column \"{field}\" not found (headers present: {})", .headers.join(", "))]
    MissingColumn { field: &'static str, headers: Vec<String> },

    #[error("Required matrix column(s) {} not found (headers present: {})", .missing.join(" and "), .headers.join(", "))]
    MissingMatrixColumns {
        missing: Vec<&'static str>,
        headers: Vec<String>,
    },

    #[error("No category columns found next to the year/month columns")]
    NoCategoryColumns,

    #[error("File too large: {} exceeds the {} limit", crate::fmt::megabytes(.size.to_owned()), crate::fmt::megabytes(.limit.to_owned()))]
    FileTooLarge { size: u64, limit: u64 },

    #[error("No valid rows parsed: check the year/month columns and the amounts")]
    NoValidRows,

    #[error("Unknown category: \"{0}\"")]
    UnknownCategory(String),

    #[error("Parse cancelled")]
    Cancelled,

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, WealthError>;
