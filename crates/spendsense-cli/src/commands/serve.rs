//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use spendsense_core::{ClassifierClient, Config};
use spendsense_server::ServerConfig;

use super::open_db;

pub async fn cmd_serve(db_path: &Path, config: &Config, host: &str, port: u16) -> Result<()> {
    println!("🚀 Starting SpendSense web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    let classifier = ClassifierClient::from_config(config)?;
    if classifier.is_none() {
        println!();
        println!("   ⚠️  No API key configured - /api/classify will return 503");
        println!("      Set SPENDSENSE_API_KEY (or NVIDIA_API_KEY) to enable classification");
    }

    // Comma-separated list of allowed CORS origins
    let allowed_origins: Vec<String> = std::env::var("SPENDSENSE_ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let server_config = ServerConfig {
        allowed_origins,
        ..ServerConfig::from_dashboard(&config.dashboard)
    };

    let db = open_db(db_path)?;
    spendsense_server::serve(db, classifier, host, port, server_config)
        .await
        .context("Server error")
}
