use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::{money, percent, signed_money};
use crate::reports::{category_breakdown, AggregateSnapshot};

use super::open_store;

fn colored_change(value: f64, text: String) -> String {
    if value >= 0.0 {
        text.green().to_string()
    } else {
        text.red().to_string()
    }
}

fn load() -> Result<Option<AggregateSnapshot>> {
    let snapshot = open_store()?.snapshot();
    if snapshot.positions.is_empty() {
        println!("No data yet. Run `wealthdeck import <file>` first.");
        return Ok(None);
    }
    Ok(Some(snapshot.aggregate.clone()))
}

pub fn summary() -> Result<()> {
    let Some(agg) = load()? else {
        return Ok(());
    };
    let latest = agg.latest_month.map(|m| m.to_string()).unwrap_or_default();

    println!("{} {}", "Net worth".bold(), money(agg.net_worth).bold());
    println!("As of      {latest}");
    println!(
        "Change     {} ({})",
        colored_change(agg.month_over_month_change, signed_money(agg.month_over_month_change)),
        colored_change(agg.change_percent, percent(agg.change_percent)),
    );

    let mut table = Table::new();
    table.set_header(vec!["Category", "Total", "Share"]);
    for share in category_breakdown(&agg) {
        let def = share.category.definition();
        table.add_row(vec![
            Cell::new(format!("{} {}", def.emoji, share.category.title())),
            Cell::new(money(share.total)),
            Cell::new(format!("{:.1}%", share.share)),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total".bold()),
        Cell::new(money(agg.net_worth)),
        Cell::new(""),
    ]);
    println!("\nAllocation\n{table}");
    Ok(())
}

pub fn accounts() -> Result<()> {
    let Some(agg) = load()? else {
        return Ok(());
    };
    let mut table = Table::new();
    table.set_header(vec!["Account", "Category", "Total", "Entries"]);
    for account in &agg.accounts {
        table.add_row(vec![
            Cell::new(&account.name),
            Cell::new(account.category.title()),
            Cell::new(money(account.total)),
            Cell::new(account.count),
        ]);
    }
    let latest = agg.latest_month.map(|m| m.to_string()).unwrap_or_default();
    println!("Accounts ({latest})\n{table}");
    Ok(())
}

pub fn series() -> Result<()> {
    let Some(agg) = load()? else {
        return Ok(());
    };
    let mut table = Table::new();
    table.set_header(vec!["Month", "Net Worth", "Change"]);
    let mut previous: Option<f64> = None;
    for point in &agg.monthly_series {
        let change = match previous {
            Some(p) => colored_change(point.total - p, signed_money(point.total - p)),
            None => String::new(),
        };
        table.add_row(vec![
            Cell::new(point.month.to_string()),
            Cell::new(money(point.total)),
            Cell::new(change),
        ]);
        previous = Some(point.total);
    }
    println!("Net Worth by Month\n{table}");
    Ok(())
}
