use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::categorizer::strip_diacritics;
use crate::models::RawCell;

// ---------------------------------------------------------------------------
// Months
// ---------------------------------------------------------------------------

pub const MONTH_NAMES: [&str; 12] = [
    "gennaio", "febbraio", "marzo", "aprile", "maggio", "giugno",
    "luglio", "agosto", "settembre", "ottobre", "novembre", "dicembre",
];

/// Month-name mode: 1..=12, or `None` when the cell is not a month.
pub fn parse_month(cell: &RawCell) -> Option<u32> {
    match cell {
        RawCell::Number(n) => integral(*n).filter(|m| (1..=12).contains(m)).map(|m| m as u32),
        RawCell::Text(s) => {
            let key: String = strip_diacritics(&s.to_lowercase())
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            if let Ok(n) = key.parse::<u32>() {
                return (1..=12).contains(&n).then_some(n);
            }
            MONTH_NAMES
                .iter()
                .position(|name| *name == key)
                .map(|i| i as u32 + 1)
        }
        _ => None,
    }
}

pub fn parse_year(cell: &RawCell) -> Option<i32> {
    let n = match cell {
        RawCell::Number(n) => integral(*n)?,
        RawCell::Text(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(n) => n,
                Err(_) => integral(s.parse::<f64>().ok()?)?,
            }
        }
        _ => return None,
    };
    (1000..=9999).contains(&n).then_some(n as i32)
}

fn integral(n: f64) -> Option<i64> {
    (n.is_finite() && n.fract() == 0.0).then_some(n as i64)
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum DateValue {
    Parsed(NaiveDate),
    /// Nothing matched; the original text is kept rather than dropped.
    Unparsed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateMode {
    /// Flat sheets: one date per row.
    IsoDate,
    /// Matrix sheets: a month name next to a year column.
    MonthName,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Temporal {
    Date(NaiveDate),
    Month(u32),
    Unparsed(String),
}

pub fn parse_temporal(cell: &RawCell, mode: DateMode) -> Temporal {
    match mode {
        DateMode::IsoDate => match parse_date(cell) {
            DateValue::Parsed(d) => Temporal::Date(d),
            DateValue::Unparsed(s) => Temporal::Unparsed(s),
        },
        DateMode::MonthName => match parse_month(cell) {
            Some(m) => Temporal::Month(m),
            None => Temporal::Unparsed(cell.as_label()),
        },
    }
}

pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    if !serial.is_finite() || !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::days(serial.trunc() as i64))
}

fn date_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[/\-.]").expect("valid date separator pattern"))
}

/// Iso-date mode. Tries, in order: Excel serials, ISO dates and datetimes,
/// `YYYY-MM`, then `DD/MM/YYYY` and `MM/DD/YYYY`.
pub fn parse_date(cell: &RawCell) -> DateValue {
    let raw = match cell {
        RawCell::Number(n) => {
            return match excel_serial_to_date(*n) {
                Some(d) => DateValue::Parsed(d),
                None => DateValue::Unparsed(cell.as_label()),
            }
        }
        RawCell::Text(s) => s.trim(),
        other => return DateValue::Unparsed(other.as_label()),
    };

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return DateValue::Parsed(d);
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return DateValue::Parsed(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, fmt) {
            return DateValue::Parsed(dt.date());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d") {
        return DateValue::Parsed(d);
    }

    let parts: Vec<&str> = date_separator().split(raw).collect();
    if parts.len() == 3 {
        let nums: Option<Vec<u32>> = parts.iter().map(|p| p.trim().parse().ok()).collect();
        if let Some(nums) = nums {
            let (a, b, year) = (nums[0], nums[1], nums[2] as i32);
            if parts[2].trim().len() == 4 {
                let candidate = NaiveDate::from_ymd_opt(year, b, a)
                    .or_else(|| NaiveDate::from_ymd_opt(year, a, b));
                if let Some(d) = candidate {
                    return DateValue::Parsed(d);
                }
            }
        }
    }
    DateValue::Unparsed(raw.to_string())
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum NumberCell {
    Value(f64),
    /// Blank or dash placeholder; not an error.
    Placeholder,
    Invalid(String),
}

impl NumberCell {
    pub fn value(&self) -> Option<f64> {
        match self {
            NumberCell::Value(v) => Some(*v),
            _ => None,
        }
    }
}

const PLACEHOLDERS: &[&str] = &["-", "\u{2212}", "\u{2013}", "\u{2014}"];

fn currency_code() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(eur|usd|gbp|chf)\b").expect("valid currency pattern"))
}

/// Returns a finite number, or `None` for empty and placeholder cells as
/// well as for text that is not a number.
pub fn parse_number(cell: &RawCell) -> Option<f64> {
    read_number(cell).value()
}

pub fn read_number(cell: &RawCell) -> NumberCell {
    match cell {
        RawCell::Empty => NumberCell::Placeholder,
        RawCell::Number(n) if n.is_finite() => NumberCell::Value(*n),
        RawCell::Number(n) => NumberCell::Invalid(n.to_string()),
        RawCell::Bool(b) => NumberCell::Invalid(b.to_string()),
        RawCell::Text(s) => parse_number_text(s),
    }
}

fn parse_number_text(raw: &str) -> NumberCell {
    let trimmed = raw.trim();
    if trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed) {
        return NumberCell::Placeholder;
    }

    let mut s: String = currency_code()
        .replace_all(trimmed, "")
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '€' | '$' | '£' | '¥' | '"'))
        .collect();
    s = s.replace('\u{2212}', "-");

    let mut negative = false;
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = true;
        s = inner.to_string();
    }

    let normalized = normalize_separators(&s);
    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() => NumberCell::Value(if negative { -v.abs() } else { v }),
        _ => NumberCell::Invalid(trimmed.to_string()),
    }
}

fn normalize_separators(s: &str) -> String {
    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');
    match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(c), None) => {
            let decimals = &s[c + 1..];
            let single = s.matches(',').count() == 1;
            if single && (1..=2).contains(&decimals.len()) && decimals.bytes().all(|b| b.is_ascii_digit()) {
                s.replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
        (None, Some(_)) if s.matches('.').count() > 1 => s.replace('.', ""),
        (None, Some(d)) if is_grouped_thousands(&s[..d], &s[d + 1..]) => s.replace('.', ""),
        _ => s.to_string(),
    }
}

/// `1.500` and `250.000` group thousands; `0.500` and `1000.250` do not.
fn is_grouped_thousands(int_part: &str, fraction: &str) -> bool {
    let int_part = int_part.trim_start_matches(['-', '+']);
    fraction.len() == 3
        && fraction.bytes().all(|b| b.is_ascii_digit())
        && (1..=3).contains(&int_part.len())
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && !int_part.starts_with('0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_eu_and_us_formats_agree() {
        assert_eq!(parse_number(&text("1.234,56")), Some(1234.56));
        assert_eq!(parse_number(&text("1,234.56")), Some(1234.56));
    }

    #[test]
    fn test_currency_symbols_and_whitespace() {
        assert_eq!(parse_number(&text("€ 1.234,56")), Some(1234.56));
        assert_eq!(parse_number(&text("$1,234.56")), Some(1234.56));
        assert_eq!(parse_number(&text("1\u{a0}234,50 EUR")), Some(1234.5));
        assert_eq!(parse_number(&text("  -42.50  ")), Some(-42.5));
    }

    #[test]
    fn test_parenthesized_negatives() {
        assert_eq!(parse_number(&text("(123.45)")), Some(-123.45));
        assert_eq!(parse_number(&text("(1.234,00)")), Some(-1234.0));
        assert_eq!(parse_number(&text("\u{2212}50")), Some(-50.0));
    }

    #[test]
    fn test_comma_only_thousands() {
        assert_eq!(parse_number(&text("1,234")), Some(1234.0));
        assert_eq!(parse_number(&text("1,234,567")), Some(1234567.0));
    }

    #[test]
    fn test_single_dot_with_three_digits_groups_thousands() {
        assert_eq!(parse_number(&text("1.500")), Some(1500.0));
        assert_eq!(parse_number(&text("250.000")), Some(250000.0));
        assert_eq!(parse_number(&text("-12.345")), Some(-12345.0));
        assert_eq!(parse_number(&text("1000.25")), Some(1000.25));
        assert_eq!(parse_number(&text("1000.250")), Some(1000.25));
        assert_eq!(parse_number(&text("0.500")), Some(0.5));
        assert_eq!(parse_number(&text("2.75")), Some(2.75));
    }

    #[test]
    fn test_comma_only_trailing_two_digits_is_decimal() {
        assert_eq!(parse_number(&text("12,50")), Some(12.5));
        assert_eq!(parse_number(&text("1234,5")), Some(1234.5));
    }

    #[test]
    fn test_dots_only() {
        assert_eq!(parse_number(&text("1.234.567")), Some(1234567.0));
        assert_eq!(parse_number(&text("1000.25")), Some(1000.25));
    }

    #[test]
    fn test_placeholders_are_null_not_nan() {
        for s in ["", "-", "\u{2212}", "  "] {
            assert_eq!(parse_number(&text(s)), None, "{s:?}");
            assert_eq!(read_number(&text(s)), NumberCell::Placeholder, "{s:?}");
        }
        assert_eq!(read_number(&RawCell::Empty), NumberCell::Placeholder);
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert_eq!(read_number(&text("abc")), NumberCell::Invalid("abc".to_string()));
        assert_eq!(read_number(&RawCell::Number(f64::NAN)).value(), None);
        assert_eq!(parse_number(&text("1e400")), None);
    }

    #[test]
    fn test_numeric_cells_pass_through() {
        assert_eq!(parse_number(&RawCell::Number(987.5)), Some(987.5));
    }

    #[test]
    fn test_all_month_names() {
        for (i, name) in MONTH_NAMES.iter().enumerate() {
            let expected = Some(i as u32 + 1);
            assert_eq!(parse_month(&text(name)), expected);
            assert_eq!(parse_month(&text(&name.to_uppercase())), expected);
            assert_eq!(parse_month(&text(&format!("  {name} "))), expected);
        }
    }

    #[test]
    fn test_month_case_and_diacritic_variants() {
        assert_eq!(parse_month(&text("GIugno")), Some(6));
        assert_eq!(parse_month(&text("Gènnaio")), Some(1));
        assert_eq!(parse_month(&text("DICEMBRÉ")), Some(12));
        assert_eq!(parse_month(&text("sett embre")), Some(9));
    }

    #[test]
    fn test_numeric_months() {
        assert_eq!(parse_month(&RawCell::Number(3.0)), Some(3));
        assert_eq!(parse_month(&text("11")), Some(11));
        assert_eq!(parse_month(&text("13")), None);
        assert_eq!(parse_month(&RawCell::Number(2.5)), None);
    }

    #[test]
    fn test_unknown_months_are_unparseable() {
        for s in ["", "foo", "gennaioo", "mese", "2024"] {
            assert_eq!(parse_month(&text(s)), None, "{s:?}");
        }
        assert_eq!(parse_month(&RawCell::Empty), None);
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year(&RawCell::Number(2024.0)), Some(2024));
        assert_eq!(parse_year(&text(" 2023 ")), Some(2023));
        assert_eq!(parse_year(&text("2023.0")), Some(2023));
        assert_eq!(parse_year(&text("Anno")), None);
        assert_eq!(parse_year(&RawCell::Number(24.0)), None);
    }

    #[test]
    fn test_iso_dates() {
        assert_eq!(parse_date(&text("2024-03-15")), DateValue::Parsed(ymd(2024, 3, 15)));
        assert_eq!(parse_date(&text("2024/03/15")), DateValue::Parsed(ymd(2024, 3, 15)));
        assert_eq!(
            parse_date(&text("2024-03-15T10:30:00Z")),
            DateValue::Parsed(ymd(2024, 3, 15))
        );
        assert_eq!(parse_date(&text("2024-03")), DateValue::Parsed(ymd(2024, 3, 1)));
    }

    #[test]
    fn test_day_first_then_month_first() {
        assert_eq!(parse_date(&text("15/03/2024")), DateValue::Parsed(ymd(2024, 3, 15)));
        assert_eq!(parse_date(&text("03/15/2024")), DateValue::Parsed(ymd(2024, 3, 15)));
        // Both readings valid: day-first wins.
        assert_eq!(parse_date(&text("04/03/2024")), DateValue::Parsed(ymd(2024, 3, 4)));
        assert_eq!(parse_date(&text("15.03.2024")), DateValue::Parsed(ymd(2024, 3, 15)));
    }

    #[test]
    fn test_unparseable_date_keeps_original_text() {
        assert_eq!(parse_date(&text(" sometime ")), DateValue::Unparsed("sometime".to_string()));
        assert_eq!(parse_date(&text("31/31/2024")), DateValue::Unparsed("31/31/2024".to_string()));
    }

    #[test]
    fn test_excel_serial_dates() {
        assert_eq!(excel_serial_to_date(45667.0), Some(ymd(2025, 1, 10)));
        assert_eq!(parse_date(&RawCell::Number(45667.0)), DateValue::Parsed(ymd(2025, 1, 10)));
        assert_eq!(excel_serial_to_date(-3.0), None);
    }

    #[test]
    fn test_parse_temporal_dispatch() {
        assert_eq!(parse_temporal(&text("Marzo"), DateMode::MonthName), Temporal::Month(3));
        assert_eq!(
            parse_temporal(&text("2024-01-31"), DateMode::IsoDate),
            Temporal::Date(ymd(2024, 1, 31))
        );
        assert_eq!(
            parse_temporal(&text("Marzo"), DateMode::IsoDate),
            Temporal::Unparsed("Marzo".to_string())
        );
    }
}
