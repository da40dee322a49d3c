use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A cell as read from a CSV or workbook, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl RawCell {
    /// Text cells that are blank after trimming collapse to `Empty`.
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.trim().is_empty() {
            RawCell::Empty
        } else {
            RawCell::Text(s)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Display form used for labels and diagnostics samples.
    pub fn as_label(&self) -> String {
        match self {
            RawCell::Empty => String::new(),
            RawCell::Text(s) => s.trim().to_string(),
            RawCell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            RawCell::Number(n) => n.to_string(),
            RawCell::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for RawCell {
    fn from(s: &str) -> Self {
        RawCell::text(s)
    }
}

impl From<f64> for RawCell {
    fn from(n: f64) -> Self {
        RawCell::Number(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryId {
    RealEstate,
    GrowthInvestments,
    LuxuryAssets,
    DividendInvestments,
    FixedIncome,
    Alternatives,
}

impl CategoryId {
    pub const ALL: [CategoryId; 6] = [
        CategoryId::RealEstate,
        CategoryId::GrowthInvestments,
        CategoryId::LuxuryAssets,
        CategoryId::DividendInvestments,
        CategoryId::FixedIncome,
        CategoryId::Alternatives,
    ];

    /// Bucket for labels the classifier cannot place.
    pub const FALLBACK: CategoryId = CategoryId::Alternatives;

    pub fn key(&self) -> &'static str {
        match self {
            Self::RealEstate => "real_estate",
            Self::GrowthInvestments => "growth_investments",
            Self::LuxuryAssets => "luxury_assets",
            Self::DividendInvestments => "dividend_investments",
            Self::FixedIncome => "fixed_income",
            Self::Alternatives => "alternatives",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::RealEstate => "Real Estate",
            Self::GrowthInvestments => "Growth Investments",
            Self::LuxuryAssets => "Luxury Assets",
            Self::DividendInvestments => "Dividend Investments",
            Self::FixedIncome => "Fixed Income",
            Self::Alternatives => "Alternatives",
        }
    }

    pub fn definition(&self) -> &'static CategoryDefinition {
        CATEGORIES
            .iter()
            .find(|c| c.id == *self)
            .unwrap_or(&CATEGORIES[CATEGORIES.len() - 1])
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryDefinition {
    pub id: CategoryId,
    pub label: &'static str,
    pub emoji: &'static str,
}

pub const CATEGORIES: [CategoryDefinition; 6] = [
    CategoryDefinition { id: CategoryId::RealEstate, label: "REAL ESTATE", emoji: "🏠" },
    CategoryDefinition { id: CategoryId::GrowthInvestments, label: "GROWTH INVESTMENTS", emoji: "📈" },
    CategoryDefinition { id: CategoryId::LuxuryAssets, label: "LUXURY ASSETS", emoji: "💎" },
    CategoryDefinition { id: CategoryId::DividendInvestments, label: "DIVIDEND INVESTMENTS", emoji: "💰" },
    CategoryDefinition { id: CategoryId::FixedIncome, label: "FIXED INCOME", emoji: "🏦" },
    CategoryDefinition { id: CategoryId::Alternatives, label: "ALTERNATIVES", emoji: "🚀" },
];

pub const UNKNOWN_SUB_LABEL: &str = "Unknown";
pub const DEFAULT_ASSET_CLASS: &str = "Other";
pub const DEFAULT_CURRENCY: &str = "EUR";

/// One (year, month, category, sub-label, amount) fact extracted from a sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedObservation {
    pub year: i32,
    pub month: u32,
    pub category_id: CategoryId,
    pub sub_label: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl ParsedObservation {
    pub fn month_key(&self) -> MonthKey {
        MonthKey::new(self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioPosition {
    pub date: NaiveDate,
    pub account: String,
    pub category: CategoryId,
    pub asset_class: String,
    pub currency: String,
    pub value: f64,
}

impl PortfolioPosition {
    pub fn month_key(&self) -> MonthKey {
        MonthKey::new(self.date.year(), self.date.month())
    }
}

impl From<&ParsedObservation> for PortfolioPosition {
    fn from(obs: &ParsedObservation) -> Self {
        let date = NaiveDate::from_ymd_opt(obs.year, obs.month, 1)
            .unwrap_or(NaiveDate::MIN);
        PortfolioPosition {
            date,
            account: if obs.sub_label.trim().is_empty() {
                UNKNOWN_SUB_LABEL.to_string()
            } else {
                obs.sub_label.clone()
            },
            category: obs.category_id,
            asset_class: obs
                .asset_class
                .clone()
                .unwrap_or_else(|| DEFAULT_ASSET_CLASS.to_string()),
            currency: obs
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            value: obs.amount,
        }
    }
}

pub fn to_positions(observations: &[ParsedObservation]) -> Vec<PortfolioPosition> {
    observations.iter().map(PortfolioPosition::from).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
