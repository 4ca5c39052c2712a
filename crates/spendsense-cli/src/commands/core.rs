//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Layered config loading
//! - `cmd_init` - Initialize the database
//! - `cmd_categories` - Print the taxonomy

use std::path::Path;

use anyhow::{Context, Result};
use spendsense_core::{Category, Config, Database};

pub fn open_db(db_path: &Path) -> Result<Database> {
    Database::new(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).context("Failed to load configuration")
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path)?;
    let existing = db.count_expenses()?;
    if existing > 0 {
        println!("   Found {} existing expense(s)", existing);
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Set SPENDSENSE_API_KEY (or NVIDIA_API_KEY)");
    println!("  2. Classify a receipt: spendsense classify --image receipt.jpg");
    println!("  3. Start web UI: spendsense serve");

    Ok(())
}

pub fn cmd_categories() {
    println!();
    println!("🗂️  Categories");
    println!("   ─────────────────────────────");
    for category in Category::ALL {
        println!(
            "   {:<20} {}",
            category.display_name(),
            category.definition()
        );
    }
}
