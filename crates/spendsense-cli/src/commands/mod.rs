//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init, categories) and shared utilities (open_db, load_config)
//! - `classify` - Receipt classification
//! - `ledger` - Dashboard and expense listing
//! - `serve` - Web server command

pub mod classify;
pub mod core;
pub mod ledger;
pub mod serve;

// Re-export command functions for main.rs
pub use classify::*;
pub use core::*;
pub use ledger::*;
pub use serve::*;

/// Truncate a string for table display, on a char boundary
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
