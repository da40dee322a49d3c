use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{CategoryId, MonthKey, ParsedObservation, PortfolioPosition};

// ---------------------------------------------------------------------------
// Aggregate snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    pub month: MonthKey,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub name: String,
    pub category: CategoryId,
    pub total: f64,
    pub count: usize,
}

/// Everything derived from the position set. Rebuilt from scratch on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSnapshot {
    pub totals_by_category: BTreeMap<CategoryId, f64>,
    pub net_worth: f64,
    pub latest_month: Option<MonthKey>,
    pub previous_net_worth: f64,
    pub month_over_month_change: f64,
    pub change_percent: f64,
    pub monthly_series: Vec<MonthlyPoint>,
    pub accounts: Vec<AccountSummary>,
}

struct Entry<'a> {
    month: MonthKey,
    category: CategoryId,
    account: &'a str,
    value: f64,
}

#[derive(Default)]
struct Bucket<'a> {
    by_category: BTreeMap<CategoryId, f64>,
    by_account: BTreeMap<(&'a str, CategoryId), (f64, usize)>,
}

impl Bucket<'_> {
    fn total(&self) -> f64 {
        self.by_category.values().sum()
    }
}

fn fold<'a>(entries: impl Iterator<Item = Entry<'a>>) -> AggregateSnapshot {
    let mut buckets: BTreeMap<MonthKey, Bucket<'a>> = BTreeMap::new();
    for e in entries {
        let bucket = buckets.entry(e.month).or_default();
        *bucket.by_category.entry(e.category).or_insert(0.0) += e.value;
        let account = bucket.by_account.entry((e.account, e.category)).or_insert((0.0, 0));
        account.0 += e.value;
        account.1 += 1;
    }

    let monthly_series: Vec<MonthlyPoint> = buckets
        .iter()
        .map(|(month, bucket)| MonthlyPoint {
            month: *month,
            total: bucket.total(),
        })
        .collect();

    let mut latest = buckets.iter().rev();
    let Some((latest_month, latest_bucket)) = latest.next() else {
        return AggregateSnapshot::default();
    };
    let net_worth = latest_bucket.total();
    // A lone bucket is its own baseline.
    let previous_net_worth = latest.next().map_or(net_worth, |(_, b)| b.total());
    let change = net_worth - previous_net_worth;
    let change_percent = if previous_net_worth != 0.0 {
        change / previous_net_worth.abs() * 100.0
    } else {
        0.0
    };

    let mut accounts: Vec<AccountSummary> = latest_bucket
        .by_account
        .iter()
        .map(|((name, category), (total, count))| AccountSummary {
            name: name.to_string(),
            category: *category,
            total: *total,
            count: *count,
        })
        .collect();
    accounts.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.name.cmp(&b.name)));

    AggregateSnapshot {
        totals_by_category: latest_bucket.by_category.clone(),
        net_worth,
        latest_month: Some(*latest_month),
        previous_net_worth,
        month_over_month_change: change,
        change_percent,
        monthly_series,
        accounts,
    }
}

pub fn aggregate(observations: &[ParsedObservation]) -> AggregateSnapshot {
    fold(observations.iter().map(|o| Entry {
        month: o.month_key(),
        category: o.category_id,
        account: o.sub_label.as_str(),
        value: o.amount,
    }))
}

/// Positions sharing a month and account are summed, never deduplicated.
pub fn aggregate_positions(positions: &[PortfolioPosition]) -> AggregateSnapshot {
    fold(positions.iter().map(|p| Entry {
        month: p.month_key(),
        category: p.category,
        account: p.account.as_str(),
        value: p.value,
    }))
}

// ---------------------------------------------------------------------------
// Category breakdown
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: CategoryId,
    pub total: f64,
    pub share: f64,
}

/// All six categories in display order with their share of net worth.
pub fn category_breakdown(snapshot: &AggregateSnapshot) -> Vec<CategoryShare> {
    CategoryId::ALL
        .iter()
        .map(|id| {
            let total = snapshot.totals_by_category.get(id).copied().unwrap_or(0.0);
            let share = if snapshot.net_worth != 0.0 {
                total / snapshot.net_worth * 100.0
            } else {
                0.0
            };
            CategoryShare {
                category: *id,
                total,
                share,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Import summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub rows: usize,
    pub years: Vec<i32>,
    pub sub_labels: Vec<String>,
    pub fallback_entries: usize,
}

pub fn summarize_import(observations: &[ParsedObservation], fallback_entries: usize) -> ImportSummary {
    let years: BTreeSet<i32> = observations.iter().map(|o| o.year).collect();
    let mut sub_labels: Vec<String> = Vec::new();
    for o in observations {
        if !sub_labels.contains(&o.sub_label) {
            sub_labels.push(o.sub_label.clone());
        }
    }
    ImportSummary {
        rows: observations.len(),
        years: years.into_iter().collect(),
        sub_labels,
        fallback_entries,
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Imported {} data points", self.rows)?;
        if self.fallback_entries > 0 {
            write!(
                f,
                " ({} mapped to {})",
                self.fallback_entries,
                CategoryId::FALLBACK.title()
            )?;
        }
        let years: Vec<String> = self.years.iter().map(|y| y.to_string()).collect();
        write!(f, " - Years: {}", years.join(", "))
    }
}
