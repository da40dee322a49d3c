use std::time::Duration;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::categorizer::{normalize_label, Classifier};
use crate::diagnostics::{Diagnostics, LogEntry, SkipReason, SkipSummary};
use crate::error::{Result, WealthError};
use crate::models::{CategoryId, ParsedObservation, RawCell, UNKNOWN_SUB_LABEL};
use crate::parsers::{parse_month, parse_number, parse_temporal, parse_year, read_number, DateMode, NumberCell, Temporal};
use crate::sheet::{read_table, Table};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What to do with an empty cell in a matrix data row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlankCellPolicy {
    /// The rest of the row is ignored, even non-empty cells to the right.
    #[default]
    StopRow,
    /// Only the empty cell is ignored.
    SkipCell,
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub max_file_bytes: u64,
    pub strict_categories: bool,
    pub blank_cell: BlankCellPolicy,
    pub progress_every_rows: usize,
    pub progress_every: Duration,
    pub log_capacity: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_file_bytes: 25 * 1024 * 1024,
            strict_categories: false,
            blank_cell: BlankCellPolicy::StopRow,
            progress_every_rows: 250,
            progress_every: Duration::from_millis(300),
            log_capacity: crate::diagnostics::DEFAULT_LOG_CAPACITY,
        }
    }
}

pub fn check_size(size: u64, limit: u64) -> Result<()> {
    if size > limit {
        return Err(WealthError::FileTooLarge { size, limit });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

pub trait ProgressSink {
    /// Called after each data row. An error aborts the parse.
    fn report(&mut self, done: usize, total: usize) -> Result<()>;
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _done: usize, _total: usize) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shape detection
// ---------------------------------------------------------------------------

const DATE_HEADERS: &[&str] = &["date", "data", "period", "periodo"];
const ACCOUNT_HEADERS: &[&str] = &["account", "conto", "broker", "bank", "banca", "institution"];
const CATEGORY_HEADERS: &[&str] = &["category", "categoria"];
const VALUE_HEADERS: &[&str] = &["value", "amount", "importo", "valore", "balance", "saldo"];
const ASSET_CLASS_HEADERS: &[&str] = &["asset class", "assetclass", "asset", "titolo", "strumento", "instrument"];
const CURRENCY_HEADERS: &[&str] = &["currency", "valuta", "ccy"];

const YEAR_HEADERS: &[&str] = &["anno", "year", "yr"];
const MONTH_HEADERS: &[&str] = &["mese", "month"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatColumns {
    pub date: usize,
    pub account: usize,
    pub category: usize,
    pub value: usize,
    pub asset_class: Option<usize>,
    pub currency: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixColumn {
    pub index: usize,
    pub category_label: String,
    pub sub_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixLayout {
    pub year_col: usize,
    pub month_col: usize,
    pub data_start: usize,
    pub columns: Vec<MatrixColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableShape {
    Flat(FlatColumns),
    Matrix(MatrixLayout),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Flat,
    Matrix,
}

impl TableShape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            TableShape::Flat(_) => ShapeKind::Flat,
            TableShape::Matrix(_) => ShapeKind::Matrix,
        }
    }
}

static EMPTY: RawCell = RawCell::Empty;

fn cell(row: &[RawCell], idx: usize) -> &RawCell {
    row.get(idx).unwrap_or(&EMPTY)
}

fn labels(row: &[RawCell]) -> Vec<String> {
    row.iter().map(RawCell::as_label).collect()
}

/// First header containing one of `synonyms`, skipping columns already claimed.
fn find_header(normalized: &[String], synonyms: &[&str], claimed: &mut Vec<usize>) -> Option<usize> {
    let idx = normalized.iter().enumerate().find_map(|(i, h)| {
        (!claimed.contains(&i) && synonyms.iter().any(|s| h.contains(s))).then_some(i)
    })?;
    claimed.push(idx);
    Some(idx)
}

/// Resolves the flat schema, or names the first required field that is missing.
pub fn resolve_flat(header: &[String]) -> std::result::Result<FlatColumns, &'static str> {
    let normalized: Vec<String> = header.iter().map(|h| normalize_label(h)).collect();
    let mut claimed = Vec::new();
    let date = find_header(&normalized, DATE_HEADERS, &mut claimed);
    let account = find_header(&normalized, ACCOUNT_HEADERS, &mut claimed);
    let category = find_header(&normalized, CATEGORY_HEADERS, &mut claimed);
    let value = find_header(&normalized, VALUE_HEADERS, &mut claimed);
    let asset_class = find_header(&normalized, ASSET_CLASS_HEADERS, &mut claimed);
    let currency = find_header(&normalized, CURRENCY_HEADERS, &mut claimed);

    Ok(FlatColumns {
        date: date.ok_or("Date")?,
        account: account.ok_or("Account")?,
        category: category.ok_or("Category")?,
        value: value.ok_or("Value")?,
        asset_class,
        currency,
    })
}

fn is_header(label: &str, names: &[&str]) -> bool {
    names.contains(&normalize_label(label).as_str())
}

/// Looks for a year/month matrix. `Ok(None)` means nothing in the first rows
/// resembles one.
pub fn resolve_matrix(rows: &[Vec<RawCell>]) -> Result<Option<MatrixLayout>> {
    let mut partial: Option<(Vec<&'static str>, Vec<String>)> = None;

    for header_idx in 0..rows.len().min(2) {
        let header = labels(&rows[header_idx]);
        let year = header.iter().position(|h| is_header(h, YEAR_HEADERS));
        let month = header.iter().position(|h| is_header(h, MONTH_HEADERS));
        match (year, month) {
            (Some(y), Some(m)) => return build_matrix(rows, header_idx, y, m).map(Some),
            (Some(_), None) if partial.is_none() => partial = Some((vec!["Mese/Month"], header)),
            (None, Some(_)) if partial.is_none() => partial = Some((vec!["Anno/Year"], header)),
            _ => {}
        }
    }

    // Headerless convention: year in A, month in B, two label rows above the data.
    if let Some(first_data) = rows.get(2) {
        if parse_year(cell(first_data, 0)).is_some() && parse_month(cell(first_data, 1)).is_some() {
            let columns = collect_columns(&rows[0], Some(rows[1].as_slice()), 0, 1, 2);
            if columns.is_empty() {
                return Err(WealthError::NoCategoryColumns);
            }
            return Ok(Some(MatrixLayout {
                year_col: 0,
                month_col: 1,
                data_start: 2,
                columns,
            }));
        }
    }

    match partial {
        Some((missing, headers)) => Err(WealthError::MissingMatrixColumns { missing, headers }),
        None => Ok(None),
    }
}

fn build_matrix(rows: &[Vec<RawCell>], header_idx: usize, year_col: usize, month_col: usize) -> Result<MatrixLayout> {
    let (category_row, sub_row, data_start) = if header_idx == 1 {
        (&rows[0], Some(&rows[1]), 2)
    } else if rows.get(1).is_some_and(|r| is_sub_label_row(r, year_col, month_col)) {
        (&rows[0], Some(&rows[1]), 2)
    } else {
        (&rows[0], None, 1)
    };

    let columns = collect_columns(category_row, sub_row.map(|r| r.as_slice()), year_col, month_col, 0);
    if columns.is_empty() {
        return Err(WealthError::NoCategoryColumns);
    }
    Ok(MatrixLayout {
        year_col,
        month_col,
        data_start,
        columns,
    })
}

fn is_sub_label_row(row: &[RawCell], year_col: usize, month_col: usize) -> bool {
    parse_year(cell(row, year_col)).is_none()
        && parse_month(cell(row, month_col)).is_none()
        && row
            .iter()
            .enumerate()
            .any(|(i, c)| i != year_col && i != month_col && !c.is_empty() && parse_number(c).is_none())
}

fn collect_columns(
    category_row: &[RawCell],
    sub_row: Option<&[RawCell]>,
    year_col: usize,
    month_col: usize,
    start_col: usize,
) -> Vec<MatrixColumn> {
    let width = category_row.len().max(sub_row.map_or(0, |r| r.len()));
    let mut columns = Vec::new();
    let mut carried = String::new();

    for index in start_col..width {
        if index == year_col || index == month_col {
            continue;
        }
        let category = cell(category_row, index).as_label();
        let Some(sub_row) = sub_row else {
            if !category.is_empty() {
                columns.push(MatrixColumn {
                    index,
                    category_label: category.clone(),
                    sub_label: category,
                });
            }
            continue;
        };

        // Blank category cells inherit the label to their left (merged cells).
        if !category.is_empty() {
            carried = category;
        }
        let sub = cell(sub_row, index).as_label();
        if carried.is_empty() && sub.is_empty() {
            continue;
        }
        let category_label = if carried.is_empty() { sub.clone() } else { carried.clone() };
        let sub_label = if sub.is_empty() { category_label.clone() } else { sub };
        columns.push(MatrixColumn {
            index,
            category_label,
            sub_label,
        });
    }
    columns
}

/// Flat schema first, then the year/month matrix.
pub fn detect_shape(rows: &[Vec<RawCell>]) -> Result<TableShape> {
    let Some(first) = rows.first() else {
        return Err(WealthError::NoValidRows);
    };
    let header = labels(first);
    match resolve_flat(&header) {
        Ok(columns) => Ok(TableShape::Flat(columns)),
        Err(field) => match resolve_matrix(rows)? {
            Some(layout) => Ok(TableShape::Matrix(layout)),
            None => Err(WealthError::MissingColumn {
                field,
                headers: header.into_iter().filter(|h| !h.is_empty()).collect(),
            }),
        },
    }
}

// ---------------------------------------------------------------------------
// Row extraction
// ---------------------------------------------------------------------------

struct Extraction {
    observations: Vec<ParsedObservation>,
    fallback_entries: usize,
    rows_scanned: usize,
}

fn classify_tracked(classifier: &mut Classifier, label: &str) -> Result<(CategoryId, bool)> {
    let before = classifier.fallback_count();
    let id = classifier.classify(label)?;
    Ok((id, classifier.fallback_count() > before))
}

fn non_empty(label: String) -> Option<String> {
    (!label.is_empty()).then_some(label)
}

fn parse_flat(
    rows: &[Vec<RawCell>],
    columns: &FlatColumns,
    classifier: &mut Classifier,
    diagnostics: &mut Diagnostics,
    progress: &mut dyn ProgressSink,
) -> Result<Extraction> {
    let data = rows.get(1..).unwrap_or_default();
    let total = data.len();
    let mut out = Extraction {
        observations: Vec::new(),
        fallback_entries: 0,
        rows_scanned: 0,
    };

    for (i, row) in data.iter().enumerate() {
        progress.report(i + 1, total)?;
        if row.iter().all(RawCell::is_empty) {
            continue;
        }
        out.rows_scanned += 1;

        let amount = match read_number(cell(row, columns.value)) {
            NumberCell::Value(v) => v,
            NumberCell::Placeholder => {
                diagnostics.record_skip(SkipReason::MissingAmount, format!("row {}", i + 2));
                continue;
            }
            NumberCell::Invalid(raw) => {
                diagnostics.record_skip(SkipReason::InvalidAmount, raw);
                continue;
            }
        };
        let date = match parse_temporal(cell(row, columns.date), DateMode::IsoDate) {
            Temporal::Date(d) => d,
            Temporal::Month(_) | Temporal::Unparsed(_) => {
                diagnostics.record_skip(SkipReason::UnparsableDate, cell(row, columns.date).as_label());
                continue;
            }
        };

        let (category_id, fell_back) = classify_tracked(classifier, &cell(row, columns.category).as_label())?;
        if fell_back {
            out.fallback_entries += 1;
        }
        let sub_label = non_empty(cell(row, columns.account).as_label())
            .unwrap_or_else(|| UNKNOWN_SUB_LABEL.to_string());

        out.observations.push(ParsedObservation {
            year: date.year(),
            month: date.month(),
            category_id,
            sub_label,
            amount,
            asset_class: columns.asset_class.and_then(|c| non_empty(cell(row, c).as_label())),
            currency: columns
                .currency
                .and_then(|c| non_empty(cell(row, c).as_label()))
                .map(|c| c.to_uppercase()),
        });
    }
    Ok(out)
}

fn parse_matrix(
    rows: &[Vec<RawCell>],
    layout: &MatrixLayout,
    blank_cell: BlankCellPolicy,
    classifier: &mut Classifier,
    diagnostics: &mut Diagnostics,
    progress: &mut dyn ProgressSink,
) -> Result<Extraction> {
    let mut categories = Vec::with_capacity(layout.columns.len());
    for column in &layout.columns {
        categories.push(classify_tracked(classifier, &column.category_label)?);
    }

    let data = rows.get(layout.data_start..).unwrap_or_default();
    let total = data.len();
    let mut out = Extraction {
        observations: Vec::new(),
        fallback_entries: 0,
        rows_scanned: 0,
    };

    for (i, row) in data.iter().enumerate() {
        progress.report(i + 1, total)?;
        if row.iter().all(RawCell::is_empty) {
            continue;
        }
        out.rows_scanned += 1;

        let year_cell = cell(row, layout.year_col);
        let Some(year) = parse_year(year_cell) else {
            diagnostics.record_skip(SkipReason::UnparsableYear, year_cell.as_label());
            continue;
        };
        let month_cell = cell(row, layout.month_col);
        let Temporal::Month(month) = parse_temporal(month_cell, DateMode::MonthName) else {
            diagnostics.record_skip(SkipReason::UnparsableMonth, month_cell.as_label());
            continue;
        };

        for (column, (category_id, fell_back)) in layout.columns.iter().zip(&categories) {
            let value = cell(row, column.index);
            if value.is_empty() {
                match blank_cell {
                    BlankCellPolicy::StopRow => break,
                    BlankCellPolicy::SkipCell => continue,
                }
            }
            let amount = match read_number(value) {
                NumberCell::Value(v) => v,
                NumberCell::Placeholder => continue,
                NumberCell::Invalid(raw) => {
                    diagnostics.record_skip(SkipReason::InvalidAmount, raw);
                    continue;
                }
            };
            if *fell_back {
                out.fallback_entries += 1;
            }
            out.observations.push(ParsedObservation {
                year,
                month,
                category_id: *category_id,
                sub_label: column.sub_label.clone(),
                amount,
                asset_class: None,
                currency: None,
            });
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub sheet_name: Option<String>,
    pub shape: ShapeKind,
    pub rows_scanned: usize,
    pub observations: usize,
    pub unmapped_labels: Vec<String>,
    pub fallback_entries: usize,
    pub skipped: SkipSummary,
    pub log: Vec<LogEntry>,
}

#[derive(Debug, Clone)]
pub struct Ingested {
    pub observations: Vec<ParsedObservation>,
    pub report: IngestReport,
}

pub fn import_table(
    table: &Table,
    options: &ParseOptions,
    diagnostics: &mut Diagnostics,
    progress: &mut dyn ProgressSink,
) -> Result<Ingested> {
    let shape = detect_shape(&table.rows)?;
    diagnostics.debug(format!(
        "detected {:?} layout over {} row(s)",
        shape.kind(),
        table.rows.len()
    ));

    let mut classifier = Classifier::new(options.strict_categories);
    let extraction = match &shape {
        TableShape::Flat(columns) => parse_flat(&table.rows, columns, &mut classifier, diagnostics, progress)?,
        TableShape::Matrix(layout) => parse_matrix(
            &table.rows,
            layout,
            options.blank_cell,
            &mut classifier,
            diagnostics,
            progress,
        )?,
    };

    diagnostics.flush_skips();
    if extraction.fallback_entries > 0 {
        diagnostics.info(format!(
            "{} entries mapped to {} (unrecognised: {})",
            extraction.fallback_entries,
            CategoryId::FALLBACK.title(),
            classifier.unmapped().join(", ")
        ));
    }
    if extraction.observations.is_empty() {
        diagnostics.error("no valid rows parsed");
        return Err(WealthError::NoValidRows);
    }
    diagnostics.info(format!(
        "parsed {} observation(s) from {} row(s), {} skipped",
        extraction.observations.len(),
        extraction.rows_scanned,
        diagnostics.skipped_total()
    ));

    let report = IngestReport {
        sheet_name: table.sheet_name.clone(),
        shape: shape.kind(),
        rows_scanned: extraction.rows_scanned,
        observations: extraction.observations.len(),
        unmapped_labels: classifier.unmapped().to_vec(),
        fallback_entries: extraction.fallback_entries,
        skipped: diagnostics.skipped().clone(),
        log: diagnostics.entries(),
    };
    Ok(Ingested {
        observations: extraction.observations,
        report,
    })
}

/// Size check, decode, detect, extract.
pub fn import_bytes(
    bytes: &[u8],
    file_name: &str,
    options: &ParseOptions,
    diagnostics: &mut Diagnostics,
    progress: &mut dyn ProgressSink,
) -> Result<Ingested> {
    check_size(bytes.len() as u64, options.max_file_bytes)?;
    let table = read_table(bytes, file_name)?;
    diagnostics.debug(format!(
        "decoded {} row(s) from {} (first row: {})",
        table.rows.len(),
        table.sheet_name.as_deref().unwrap_or(file_name),
        table.header().join(" | ")
    ));
    import_table(&table, options, diagnostics, progress)
}
