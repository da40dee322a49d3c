use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::{load_settings, settings_file_exists, settings_path};

use super::{db_path, open_store};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = db_path();

    println!(
        "Settings:   {}{}",
        settings_path().display(),
        if settings_file_exists() { "" } else { " (defaults)" }
    );
    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Max file:   {}MB", settings.max_file_size_mb);

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `wealthdeck init` to set up.");
        return Ok(());
    }
    println!("DB size:    {}", format_bytes(std::fs::metadata(&db_path)?.len()));

    let store = open_store()?;
    let snapshot = store.snapshot();
    println!();
    println!("Positions:  {}", snapshot.positions.len());
    println!("Months:     {}", snapshot.aggregate.monthly_series.len());
    match store.last_import() {
        Some(info) => {
            println!("Last import: {} ({} rows)", info.file_name, info.rows);
            println!("Imported at: {}", info.imported_at);
            println!("Checksum:    {}", &info.checksum[..info.checksum.len().min(12)]);
        }
        None => println!("Last import: (none)"),
    }
    Ok(())
}
