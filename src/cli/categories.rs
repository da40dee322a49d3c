use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::categorizer::{lookup, CATEGORY_ALIASES};
use crate::error::Result;
use crate::models::{CategoryId, CATEGORIES};

pub fn list() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Label", "Also accepts"]);
    for def in &CATEGORIES {
        let aliases: Vec<&str> = CATEGORY_ALIASES
            .iter()
            .filter(|(_, id)| *id == def.id)
            .map(|(alias, _)| *alias)
            .collect();
        table.add_row(vec![
            Cell::new(def.id.key()),
            Cell::new(format!("{} {}", def.emoji, def.label)),
            Cell::new(aliases.join(", ")),
        ]);
    }
    println!("Categories\n{table}");
    println!(
        "Unrecognised labels are filed under {}.",
        CategoryId::FALLBACK.title()
    );
    Ok(())
}

pub fn classify(label: &str) -> Result<()> {
    match lookup(label) {
        Some(id) => println!("{label} -> {} ({})", id.title().green(), id.key()),
        None => println!(
            "{label} -> {} ({})",
            CategoryId::FALLBACK.title().yellow(),
            "not recognised".dimmed()
        ),
    }
    Ok(())
}
