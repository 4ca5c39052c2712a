//! SpendSense CLI - Receipt classifier and spending dashboard
//!
//! Usage:
//!   spendsense init                       Initialize database
//!   spendsense classify --image r.jpg     Classify a receipt and record it
//!   spendsense dashboard --days 30        Spending by category
//!   spendsense serve --port 3000          Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Classify { image } => commands::cmd_classify(&cli.db, &config, &image).await,
        Commands::Dashboard { days } => commands::cmd_dashboard(&cli.db, &config, days),
        Commands::Expenses { limit } => commands::cmd_expenses(&cli.db, limit),
        Commands::Categories => {
            commands::cmd_categories();
            Ok(())
        }
        Commands::Serve { port, host } => {
            commands::cmd_serve(&cli.db, &config, &host, port).await
        }
    }
}
