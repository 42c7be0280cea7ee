//! Retrieve Command
//!
//! Rebuilds a stored file from its fragments.

use super::{format_bytes, spinner, Session};
use crate::symbols;
use anyhow::{Context, Result};
use cessfs_core::CipherKey;
use console::style;
use std::path::PathBuf;

/// Retrieve configuration
pub struct RetrieveConfig {
    pub fid: String,
    pub key: Option<String>,
    /// Directory to save into; the config's `save_dir` when unset
    pub output: Option<PathBuf>,
}

/// Run retrieve command
pub async fn run(session: &Session, config: RetrieveConfig) -> Result<()> {
    let cipher_key = match config.key.as_deref() {
        Some(k) => CipherKey::from_passphrase(k)?,
        None => None,
    };
    let save_dir = config
        .output
        .unwrap_or_else(|| session.config.storage.save_dir.clone());

    let chain = session.open_chain().await?;
    let client = session.storage_client(chain).await?;

    let pb = spinner(format!("Retrieving {}", config.fid));
    let result = client
        .retrieve_file(&config.fid, cipher_key.as_ref(), &save_dir)
        .await;
    pb.finish_and_clear();
    let path = result.with_context(|| format!("Failed to retrieve {}", config.fid))?;

    let size = tokio::fs::metadata(&path).await?.len();
    println!(
        "{} Retrieved {} ({})",
        style(symbols::CHECK).green(),
        style(path.display()).bold(),
        format_bytes(size)
    );
    Ok(())
}
