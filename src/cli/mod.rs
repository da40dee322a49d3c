pub mod categories;
pub mod clear;
pub mod import;
pub mod init;
pub mod report;
pub mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::db::{SqliteStorage, DB_FILE};
use crate::error::Result;
use crate::settings::get_data_dir;
use crate::store::DataStore;

#[derive(Parser)]
#[command(name = "wealthdeck", version, about = "Ingest wealth-tracking spreadsheets and report net worth over time.")]
pub struct Cli {
    /// Log parser diagnostics to stderr (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for wealthdeck data (default: ~/Documents/wealthdeck)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Import a CSV/XLSX file, replacing all previously imported data.
    Import {
        /// Path to the CSV or spreadsheet file
        file: String,
        /// Fail on category labels that cannot be recognised
        #[arg(long)]
        strict: bool,
        /// In year/month sheets, skip empty cells instead of ending the row
        #[arg(long = "skip-blank-cells")]
        skip_blank_cells: bool,
    },
    /// Net worth, month-over-month change and category allocation.
    Summary,
    /// Per-account totals for the latest month.
    Accounts,
    /// Net worth for every month on record.
    Series,
    /// List the asset categories and the labels they accept.
    Categories,
    /// Show which category a label maps to.
    Classify {
        /// Free-text category label, e.g. "Obbligazioni"
        label: String,
    },
    /// Delete all imported data.
    Clear,
    /// Show data location and what is currently stored.
    Status,
    /// Generate shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

pub(crate) fn db_path() -> PathBuf {
    get_data_dir().join(DB_FILE)
}

pub(crate) fn open_store() -> Result<DataStore> {
    let path = db_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let storage = SqliteStorage::open(&path)?;
    Ok(DataStore::open(Box::new(storage)))
}
