mod categorize;
mod config;
mod db;
mod fx;
mod import;
mod matching;
mod models;
mod run;
mod sms;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    setup_logging();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        run::print_usage();
        return Ok(());
    }

    let settings = config::Settings::find_and_load()?;
    let db_path = settings.database_path()?;
    let mut db = db::Database::open(&db_path)?;
    run::as_cli(&args, &mut db, &settings)
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ledgerlink=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
