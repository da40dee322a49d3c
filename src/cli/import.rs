use std::path::PathBuf;

use colored::Colorize;

use crate::error::{Result, WealthError};
use crate::fmt::money;
use crate::importer::{check_size, BlankCellPolicy, IngestReport, ParseOptions};
use crate::models::{to_positions, ParsedObservation};
use crate::reports::summarize_import;
use crate::settings::load_settings;
use crate::store::ImportInfo;
use crate::worker::{ParseSupervisor, WorkerEvent};

use super::open_store;

pub fn run(file: &str, strict: bool, skip_blank_cells: bool) -> Result<()> {
    let file_path = PathBuf::from(file);
    let mut options = ParseOptions::from(&load_settings());
    if strict {
        options.strict_categories = true;
    }
    if skip_blank_cells {
        options.blank_cell = BlankCellPolicy::SkipCell;
    }

    // Reject oversized files before reading them into memory.
    check_size(std::fs::metadata(&file_path)?.len(), options.max_file_bytes)?;
    let bytes = std::fs::read(&file_path)?;
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.to_string());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let (rows, report) = runtime.block_on(parse_in_background(bytes.clone(), &file_name, options))?;

    let summary = summarize_import(&rows, report.fallback_entries);
    let info = ImportInfo::new(&file_name, &bytes, rows.len());

    let mut store = open_store()?;
    if store.last_import().is_some_and(|last| last.checksum == info.checksum) {
        println!("{}", "This file matches the previous import; replacing anyway.".dimmed());
    }
    let mut updates = store.subscribe();
    store.replace_all(to_positions(&rows), Some(info));

    println!("{}", summary.to_string().green());
    if updates.has_changed().unwrap_or(false) {
        let snapshot = updates.borrow_and_update().clone();
        if let Some(month) = snapshot.aggregate.latest_month {
            println!("Net worth ({month}): {}", money(snapshot.aggregate.net_worth));
        }
    }
    if !report.unmapped_labels.is_empty() {
        println!(
            "{} {}",
            "Unrecognised categories:".yellow(),
            report.unmapped_labels.join(", ")
        );
    }
    for (reason, stats) in &report.skipped {
        println!("Skipped {} ({reason}), e.g. {}", stats.count, stats.samples.join(", "));
    }
    Ok(())
}

async fn parse_in_background(
    bytes: Vec<u8>,
    file_name: &str,
    options: ParseOptions,
) -> Result<(Vec<ParsedObservation>, IngestReport)> {
    let mut supervisor = ParseSupervisor::new(options);
    supervisor.submit(bytes, file_name);
    while let Some(message) = supervisor.next_event().await {
        match message.event {
            WorkerEvent::Progress { percent } => eprint!("\rParsing {file_name}... {percent:>3}%"),
            WorkerEvent::Success { rows, report } => {
                eprintln!();
                return Ok((rows, report));
            }
            WorkerEvent::Error { message } => {
                eprintln!();
                return Err(WealthError::Other(message));
            }
        }
    }
    Err(WealthError::Cancelled)
}
