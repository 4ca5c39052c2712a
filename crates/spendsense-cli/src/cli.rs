//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// SpendSense - Know where the grocery money goes
#[derive(Parser)]
#[command(name = "spendsense")]
#[command(about = "Classify receipt photos into spending categories", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "spendsense.db", global = true)]
    pub db: PathBuf,

    /// Config file (TOML); falls back to SPENDSENSE_CONFIG
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Classify a receipt image and record its line items
    Classify {
        /// Receipt image (PNG or JPEG)
        #[arg(short, long)]
        image: PathBuf,
    },

    /// Show spending by category over a trailing window
    Dashboard {
        /// Window in days (defaults to the configured window, 30)
        #[arg(
            short,
            long,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(spendsense_core::MAX_WINDOW_DAYS))
        )]
        days: Option<u32>,
    },

    /// List recorded expenses, newest first
    Expenses {
        /// Maximum number of expenses to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// List the spending categories
    Categories,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}
