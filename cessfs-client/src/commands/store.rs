//! Store Command
//!
//! Stores a file on miners and records the placement in the registry.

use super::{format_bytes, spinner, Session};
use crate::symbols;
use anyhow::{Context, Result};
use cessfs_client::StoreRequest;
use cessfs_core::CipherKey;
use console::style;
use std::path::PathBuf;

/// Store configuration
pub struct StoreConfig {
    pub file: PathBuf,
    pub territory: String,
    pub bucket: String,
    pub key: Option<String>,
    pub miners: Vec<String>,
}

/// Run store command
pub async fn run(session: &Session, config: StoreConfig) -> Result<()> {
    if !config.file.is_file() {
        anyhow::bail!("Not a file: {}", config.file.display());
    }
    let cipher_key = match config.key.as_deref() {
        Some(k) => CipherKey::from_passphrase(k)?,
        None => None,
    };
    let encrypted = cipher_key.is_some();

    let chain = session.open_chain().await?;
    let client = session.storage_client(chain.clone()).await?;

    let pb = spinner(format!("Storing {}", config.file.display()));
    let result = client
        .store_file(StoreRequest {
            file: config.file.clone(),
            cipher_key,
            territory: config.territory.clone(),
            bucket: config.bucket.clone(),
            want_miners: config.miners,
        })
        .await;
    pb.finish_and_clear();

    // A failed store leaves its order on chain for the next attempt to resume
    chain.save().await.context("Failed to save registry")?;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} Store failed", style(symbols::CROSS).red());
            return Err(e).context(format!("Failed to store {}", config.file.display()));
        }
    };

    println!();
    if report.deduplicated {
        println!(
            "{} {} is already stored",
            style(symbols::WARN).yellow(),
            config.file.display()
        );
    } else {
        println!(
            "{} Stored {} {}",
            style(symbols::CHECK).green(),
            style(config.file.display()).bold(),
            if encrypted { symbols::LOCK } else { "" }
        );
    }
    println!("  fid:       {}", style(&report.fid).cyan());
    println!("  size:      {}", format_bytes(report.file_size));
    println!("  segments:  {}", report.segments);
    println!("  territory: {}", config.territory);
    println!("  bucket:    {}", config.bucket);

    if !report.assignments.is_empty() {
        println!();
        println!("{}", style("SHARD  MINER").bold());
        println!("{}", symbols::HLINE);
        for assignment in &report.assignments {
            println!("{:<6} {}", assignment.shard, assignment.miner);
        }
    }
    Ok(())
}
