//! Receipt classification command

use std::path::Path;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use spendsense_core::{CategorySummary, ClassificationPipeline, ClassifierClient, Config};

use super::{open_db, print_summary};

pub async fn cmd_classify(db_path: &Path, config: &Config, image_path: &Path) -> Result<()> {
    let Some(classifier) = ClassifierClient::from_config(config)? else {
        bail!("No API key configured. Set SPENDSENSE_API_KEY (or NVIDIA_API_KEY), or SPENDSENSE_BACKEND=mock");
    };

    let db = open_db(db_path)?;
    let pipeline = ClassificationPipeline::new(classifier, db);

    println!("🧾 Classifying {}...", image_path.display());
    let totals = classify_file(&pipeline, image_path).await?;

    if totals.is_empty() {
        println!("   No line items found on this receipt.");
        return Ok(());
    }

    print_summary("Receipt", &totals);
    Ok(())
}

/// Read a receipt image and run it through the pipeline
pub async fn classify_file(
    pipeline: &ClassificationPipeline,
    image_path: &Path,
) -> Result<CategorySummary> {
    let image = std::fs::read(image_path)
        .with_context(|| format!("Failed to read receipt image {}", image_path.display()))?;

    let totals = pipeline
        .process(&image)
        .await
        .context("Receipt classification failed")?;

    let total: Decimal = totals.values().copied().sum();
    tracing::debug!("Receipt total {}", total);

    Ok(totals)
}
