//! Territory Command

use super::{format_bytes, Session};
use crate::symbols;
use anyhow::{Context, Result};
use cessfs_client::validate::validate_territory_name;
use cessfs_client::ChainClient;
use console::style;

/// Show one of the account's territories
pub async fn show(session: &Session, name: &str) -> Result<()> {
    let keyring = session.keyring()?;
    let chain = session.open_chain().await?;
    let Some(territory) = chain.query_territory(keyring.account(), name).await? else {
        anyhow::bail!("Territory {} not found for {}", name, keyring.account());
    };

    println!("{}", style(&territory.name).bold());
    println!("  owner:     {}", territory.owner);
    println!("  state:     {}", territory.state);
    println!("  total:     {}", format_bytes(territory.total_space));
    println!("  remaining: {}", format_bytes(territory.remaining_space));
    println!("  expires:   {}", territory.expires_at.format("%Y-%m-%d %H:%M UTC"));
    Ok(())
}

/// Mint a new territory for the account
pub async fn mint(session: &Session, name: &str, gib: u32, days: u32) -> Result<()> {
    validate_territory_name(name)?;
    let keyring = session.keyring()?;
    let chain = session.open_chain().await?;
    chain
        .mint_territory(keyring.account(), name, gib, days)
        .await
        .with_context(|| format!("Failed to mint territory {}", name))?;
    chain.save().await.context("Failed to save registry")?;
    println!(
        "{} Minted territory {} ({} GiB, {} days)",
        style(symbols::CHECK).green(),
        name,
        gib,
        days
    );
    Ok(())
}
