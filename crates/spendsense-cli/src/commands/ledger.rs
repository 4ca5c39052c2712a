//! Dashboard and expense listing commands

use std::path::Path;

use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use spendsense_core::{CategorySummary, Config, MAX_WINDOW_DAYS};

use super::{open_db, truncate};

pub fn cmd_dashboard(db_path: &Path, config: &Config, days: Option<u32>) -> Result<()> {
    let window_days = days.unwrap_or(config.dashboard.window_days);
    if !(1..=MAX_WINDOW_DAYS).contains(&window_days) {
        bail!("Window must be between 1 and {} days", MAX_WINDOW_DAYS);
    }

    let db = open_db(db_path)?;
    let totals = db.aggregate(Duration::days(i64::from(window_days)), Utc::now())?;

    println!();
    println!("╭─────────────────────────────────────────╮");
    println!("│         💰 SpendSense Dashboard         │");
    println!("╰─────────────────────────────────────────╯");

    if totals.is_empty() {
        println!();
        println!("  No expenses in the last {} days.", window_days);
        println!("  Classify a receipt with: spendsense classify --image receipt.jpg");
        return Ok(());
    }

    print_summary(&format!("Last {} days", window_days), &totals);
    Ok(())
}

pub fn cmd_expenses(db_path: &Path, limit: i64) -> Result<()> {
    let db = open_db(db_path)?;
    let expenses = db.list_expenses(limit.max(1))?;

    if expenses.is_empty() {
        println!("No expenses recorded yet. Classify a receipt with:");
        println!("  spendsense classify --image receipt.jpg");
        return Ok(());
    }

    println!();
    println!("🧾 Recent Expenses");
    println!("   ─────────────────────────────");
    for expense in expenses {
        println!(
            "   {}  {:<30} {:<18} {}",
            expense.recorded_at.format("%Y-%m-%d %H:%M"),
            truncate(&expense.description, 30),
            expense.category.display_name(),
            money(expense.amount)
        );
    }

    Ok(())
}

/// Category lines, largest first
pub fn format_summary(totals: &CategorySummary) -> Vec<String> {
    let mut rows: Vec<_> = totals.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

    let mut lines: Vec<String> = rows
        .into_iter()
        .map(|(category, amount)| format!("{:<20} {}", category.display_name(), money(*amount)))
        .collect();

    let total: Decimal = totals.values().copied().sum();
    lines.push(format!("{:<20} {}", "Total", money(total)));
    lines
}

/// `$` amount, two decimals, right-aligned
fn money(amount: Decimal) -> String {
    format!("{:>10}", format!("${:.2}", amount))
}

pub fn print_summary(title: &str, totals: &CategorySummary) {
    println!();
    println!("📊 {}", title);
    println!("   ─────────────────────────────");
    for line in format_summary(totals) {
        println!("   {}", line);
    }
}
