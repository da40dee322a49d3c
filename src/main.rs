mod categorizer;
mod cli;
mod db;
mod diagnostics;
mod error;
mod fmt;
mod importer;
mod models;
mod parsers;
mod reports;
mod settings;
mod sheet;
mod store;
mod worker;

use clap::{CommandFactory, Parser};
use tracing_subscriber::{prelude::*, EnvFilter};

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    // RUST_LOG > --verbose > warnings only
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Import {
            file,
            strict,
            skip_blank_cells,
        } => cli::import::run(&file, strict, skip_blank_cells),
        Commands::Summary => cli::report::summary(),
        Commands::Accounts => cli::report::accounts(),
        Commands::Series => cli::report::series(),
        Commands::Categories => cli::categories::list(),
        Commands::Classify { label } => cli::categories::classify(&label),
        Commands::Clear => cli::clear::run(),
        Commands::Status => cli::status::run(),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "wealthdeck", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
