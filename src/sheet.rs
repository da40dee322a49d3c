use std::path::Path;

use crate::categorizer::normalize_label;
use crate::error::{Result, WealthError};
use crate::models::RawCell;

/// Sheet names preferred over the first sheet when present.
const PREFERRED_SHEETS: &[&str] = &["transactions", "transazioni", "movimenti"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Spreadsheet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub sheet_name: Option<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl Table {
    pub fn header(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|r| r.iter().map(RawCell::as_label).collect())
            .unwrap_or_default()
    }
}

pub fn file_kind(file_name: &str) -> Result<FileKind> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => Ok(FileKind::Csv),
        "xlsx" | "xls" | "xlsm" | "ods" => Ok(FileKind::Spreadsheet),
        "" => Err(WealthError::UnsupportedFile(format!("\"{file_name}\" has no extension"))),
        other => Err(WealthError::UnsupportedFile(format!(".{other}"))),
    }
}

/// Decodes raw file bytes into rows of cells. The file name only selects the decoder.
pub fn read_table(bytes: &[u8], file_name: &str) -> Result<Table> {
    match file_kind(file_name)? {
        FileKind::Csv => read_csv(bytes),
        FileKind::Spreadsheet => read_workbook(bytes),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();
    if semicolons > 0 && commas == 0 {
        b';'
    } else {
        b','
    }
}

pub fn read_csv(bytes: &[u8]) -> Result<Table> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(bytes))
        .from_reader(bytes);

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row: Vec<RawCell> = record.iter().map(RawCell::text).collect();
        if row.iter().all(RawCell::is_empty) {
            continue;
        }
        rows.push(row);
    }
    Ok(Table {
        sheet_name: None,
        rows,
    })
}

// ---------------------------------------------------------------------------
// Workbooks (feature-gated)
// ---------------------------------------------------------------------------

pub fn pick_sheet(names: &[String]) -> Option<&String> {
    names
        .iter()
        .find(|name| {
            let norm = normalize_label(name);
            PREFERRED_SHEETS.iter().any(|p| norm.contains(p))
        })
        .or_else(|| names.first())
}

#[cfg(feature = "xlsx")]
pub fn read_workbook(bytes: &[u8]) -> Result<Table> {
    use calamine::{Data, Reader};

    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mut workbook = calamine::open_workbook_auto_from_rs(cursor)?;
    let names = workbook.sheet_names().to_vec();
    let sheet_name = pick_sheet(&names).cloned().ok_or(WealthError::NoSheets)?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let rows = range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::Empty => RawCell::Empty,
                    Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                        RawCell::text(s.as_str())
                    }
                    Data::Float(f) => RawCell::Number(*f),
                    Data::Int(i) => RawCell::Number(*i as f64),
                    Data::Bool(b) => RawCell::Bool(*b),
                    Data::DateTime(dt) => RawCell::Number(dt.as_f64()),
                    Data::Error(_) => RawCell::Empty,
                })
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(Table {
        sheet_name: Some(sheet_name),
        rows,
    })
}

#[cfg(not(feature = "xlsx"))]
pub fn read_workbook(_bytes: &[u8]) -> Result<Table> {
    Err(WealthError::UnsupportedFile(
        "spreadsheet support is disabled in this build (enable the `xlsx` feature)".to_string(),
    ))
}
