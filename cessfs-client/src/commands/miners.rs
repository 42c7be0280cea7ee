//! Miners Command
//!
//! Manages the miner registry of the local chain.

use super::{format_bytes, Session};
use crate::symbols;
use anyhow::{Context, Result};
use cessfs_client::keyring::ss58_decode;
use cessfs_client::{MinerInfo, MinerState};
use cessfs_core::GIB;
use console::style;

/// Miner registration
pub struct AddMinerConfig {
    pub account: String,
    pub peer_id: String,
    pub endpoint: String,
    pub idle_gib: u64,
    pub state: MinerState,
}

/// Register or replace a miner
pub async fn add(session: &Session, config: AddMinerConfig) -> Result<()> {
    ss58_decode(&config.account).context("Invalid miner account")?;
    let chain = session.open_chain().await?;
    chain
        .register_miner(MinerInfo {
            account: config.account.clone(),
            peer_id: config.peer_id,
            endpoint: config.endpoint,
            idle_space: config.idle_gib.saturating_mul(GIB),
            state: config.state,
        })
        .await;
    chain.save().await.context("Failed to save registry")?;
    println!(
        "{} Registered miner {}",
        style(symbols::CHECK).green(),
        config.account
    );
    Ok(())
}

/// Change a miner's state
pub async fn set_state(session: &Session, account: &str, state: MinerState) -> Result<()> {
    let chain = session.open_chain().await?;
    if !chain.set_miner_state(account, state).await {
        anyhow::bail!("Miner {} is not registered", account);
    }
    chain.save().await.context("Failed to save registry")?;
    println!(
        "{} Miner {} is now {}",
        style(symbols::CHECK).green(),
        account,
        state
    );
    Ok(())
}

/// List registered miners
pub async fn list(session: &Session) -> Result<()> {
    let chain = session.open_chain().await?;
    let registry = chain.snapshot().await;
    if registry.miners.is_empty() {
        println!("{}", style("No miners registered").yellow());
        return Ok(());
    }

    println!(
        "{}",
        style(format!(
            "{:<50} {:<10} {:>12}  {}",
            "ACCOUNT", "STATE", "IDLE", "ENDPOINT"
        ))
        .bold()
    );
    println!("{}", symbols::HLINE);
    for miner in &registry.miners {
        let state = match miner.state {
            MinerState::Positive => style(miner.state.to_string()).green(),
            _ => style(miner.state.to_string()).yellow(),
        };
        println!(
            "{:<50} {:<10} {:>12}  {}",
            miner.account,
            state,
            format_bytes(miner.idle_space),
            miner.endpoint
        );
    }
    println!();
    println!("{} miners", registry.miners.len());
    Ok(())
}
