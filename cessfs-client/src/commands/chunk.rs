//! Chunk Command
//!
//! Segments and erasure codes a file locally and prints its fid, without
//! touching the chain or any miner.

use super::{format_bytes, short_hash, Session};
use crate::symbols;
use anyhow::{Context, Result};
use cessfs_core::{CipherKey, SegmentProcessor};
use console::style;
use std::path::PathBuf;

/// Chunk configuration
pub struct ChunkConfig {
    pub file: PathBuf,
    pub key: Option<String>,
    pub output: PathBuf,
}

/// Run chunk command
pub async fn run(session: &Session, config: ChunkConfig) -> Result<()> {
    let key = match config.key.as_deref() {
        Some(k) => CipherKey::from_passphrase(k)?,
        None => None,
    };
    let layout = session.config.layout;
    let file = config.file.clone();
    let output = config.output.clone();
    let processed = tokio::task::spawn_blocking(move || {
        SegmentProcessor::with_layout(layout)?.process(&file, key.as_ref(), &output)
    })
    .await?
    .with_context(|| format!("Failed to chunk {}", config.file.display()))?;

    println!();
    println!(
        "{} {} {}",
        style(symbols::CHECK).green(),
        style(config.file.display()).bold(),
        if processed.encrypted { symbols::LOCK } else { "" }
    );
    println!("  fid:       {}", style(&processed.fid).cyan());
    println!("  size:      {}", format_bytes(processed.file_size));
    println!("  segments:  {}", processed.segments.len());
    println!("  fragments: {}", processed.fragment_count());
    println!();

    for segment in &processed.segments {
        println!(
            "{} {}",
            style(format!("segment {}", segment.index)).bold(),
            style(short_hash(&segment.hash)).dim()
        );
        for fragment in &segment.fragments {
            println!("  [{}] {}", fragment.index, fragment.path.display());
        }
    }
    println!();
    println!(
        "{} {}",
        style("Fragments written to").dim(),
        config.output.display()
    );
    Ok(())
}
