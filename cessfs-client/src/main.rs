//! cessfs CLI
//!
//! Command-line client for storing files on CESS storage miners.
//!
//! # Commands
//! - `chunk` - Segment and erasure code a file locally
//! - `store` - Store a file on miners
//! - `retrieve` - Rebuild a stored file
//! - `account` - Show the account derived from the mnemonic
//! - `miners` - Manage the local miner registry
//! - `territory` - Show or mint territories
//! - `config` - Show or initialize configuration
//!
//! # Configuration
//! Config file: ~/.cessfs/config.toml
//! Registry: ~/.cessfs/registry.json

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod symbols;

use cessfs_client::MinerState;
use commands::{chunk, miners, retrieve, store, territory, Session};

#[derive(Parser)]
#[command(name = "cessfs")]
#[command(about = "CESS storage client")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.cessfs/config.toml)
    #[arg(long, global = true, env = "CESSFS_CONFIG")]
    config: Option<PathBuf>,

    /// Registry file (overrides config file)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// BIP-39 mnemonic of the signing account
    #[arg(long, global = true, env = "CESSFS_MNEMONIC", hide_env_values = true)]
    mnemonic: Option<String>,

    /// Log debug output from the cessfs crates
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment and erasure code a file without uploading it
    Chunk {
        /// File to process
        file: PathBuf,

        /// Encryption key (1-32 bytes)
        #[arg(short, long)]
        key: Option<String>,

        /// Directory for fragment files
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Store a file on miners
    Store {
        /// File to store
        file: PathBuf,

        /// Territory to charge
        #[arg(short, long, default_value = "default")]
        territory: String,

        /// Bucket name
        #[arg(short, long, default_value = "default")]
        bucket: String,

        /// Encryption key (1-32 bytes)
        #[arg(short, long)]
        key: Option<String>,

        /// Preferred miner account; repeat once per shard for strict placement
        #[arg(short, long = "miner")]
        miners: Vec<String>,
    },

    /// Rebuild a stored file
    Retrieve {
        /// File id
        fid: String,

        /// Decryption key used when storing
        #[arg(short, long)]
        key: Option<String>,

        /// Directory to save into (overrides config file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the account derived from the mnemonic
    Account,

    /// Manage the local miner registry
    Miners {
        #[command(subcommand)]
        command: MinerCommands,
    },

    /// Show or mint territories
    Territory {
        #[command(subcommand)]
        command: TerritoryCommands,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum MinerCommands {
    /// Register a miner
    Add {
        /// SS58 account address
        account: String,

        /// libp2p peer id
        peer_id: String,

        /// HTTP endpoint, e.g. http://1.2.3.4:15001
        endpoint: String,

        /// Idle space in GiB
        #[arg(long, default_value = "1024")]
        idle_gib: u64,

        /// Initial state
        #[arg(long, default_value = "positive")]
        state: MinerState,
    },

    /// List registered miners
    List,

    /// Change a miner's state
    SetState {
        account: String,
        state: MinerState,
    },
}

#[derive(Subcommand)]
enum TerritoryCommands {
    /// Show a territory
    Show { name: String },

    /// Buy space under a new territory
    Mint {
        name: String,

        /// Space in GiB
        #[arg(long, default_value = "1")]
        gib: u32,

        /// Lifetime in days
        #[arg(long, default_value_t = cessfs_client::TERRITORY_DAYS)]
        days: u32,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new(
            "warn,cessfs=debug,cessfs_client=debug,cessfs_core=debug,cessfs_network=debug",
        )
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::WARN.into())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let Cli {
        config: config_path,
        registry,
        mnemonic,
        command,
        ..
    } = cli;

    // CLI args override config file
    let open_session = || -> Result<Session> {
        let cfg = config::load_config(config_path.as_deref())?;
        Ok(Session {
            registry: registry.clone().unwrap_or_else(|| cfg.chain.registry.clone()),
            mnemonic: mnemonic.clone(),
            config: cfg,
        })
    };

    match command {
        Commands::Chunk { file, key, output } => {
            let config = chunk::ChunkConfig { file, key, output };
            chunk::run(&open_session()?, config).await?;
        }

        Commands::Store {
            file,
            territory,
            bucket,
            key,
            miners,
        } => {
            let config = store::StoreConfig {
                file,
                territory,
                bucket,
                key,
                miners,
            };
            store::run(&open_session()?, config).await?;
        }

        Commands::Retrieve { fid, key, output } => {
            let config = retrieve::RetrieveConfig { fid, key, output };
            retrieve::run(&open_session()?, config).await?;
        }

        Commands::Account => {
            println!("{}", open_session()?.keyring()?.account());
        }

        Commands::Miners { command } => {
            let session = open_session()?;
            match command {
                MinerCommands::Add {
                    account,
                    peer_id,
                    endpoint,
                    idle_gib,
                    state,
                } => {
                    let config = miners::AddMinerConfig {
                        account,
                        peer_id,
                        endpoint,
                        idle_gib,
                        state,
                    };
                    miners::add(&session, config).await?;
                }
                MinerCommands::List => miners::list(&session).await?,
                MinerCommands::SetState { account, state } => {
                    miners::set_state(&session, &account, state).await?;
                }
            }
        }

        Commands::Territory { command } => {
            let session = open_session()?;
            match command {
                TerritoryCommands::Show { name } => territory::show(&session, &name).await?,
                TerritoryCommands::Mint { name, gib, days } => {
                    territory::mint(&session, &name, gib, days).await?;
                }
            }
        }

        Commands::Config { command } => {
            handle_config_command(command, config_path.as_deref())?;
        }
    }

    Ok(())
}

/// Handle config subcommands
fn handle_config_command(
    command: Option<ConfigCommands>,
    path: Option<&std::path::Path>,
) -> Result<()> {
    use console::style;

    match command {
        None | Some(ConfigCommands::Show) => {
            let cfg = config::load_config(path)?;
            println!();
            println!("{}", style("cessfs Configuration").bold().underlined());
            println!();
            println!("{}", style("[chain]").cyan());
            println!("  registry = \"{}\"", cfg.chain.registry.display());
            println!();
            println!("{}", style("[storage]").cyan());
            println!("  work_dir = \"{}\"", cfg.storage.work_dir.display());
            println!("  save_dir = \"{}\"", cfg.storage.save_dir.display());
            println!("  timeout_secs = {}", cfg.storage.timeout_secs);
            println!();
            println!("{}", style("[selector]").cyan());
            println!("  strategy = \"{}\"", cfg.selector.strategy);
            println!("  max_ttl_ms = {}", cfg.selector.max_ttl_ms);
            println!("  max_node_num = {}", cfg.selector.max_node_num);
            println!("  allow_list = {} peers", cfg.selector.allow_list.len());
            println!();
            println!("{}", style("[layout]").cyan());
            println!("  segment_size = {}", cfg.layout.segment_size);
            println!("  data_shards = {}", cfg.layout.data_shards);
            println!("  parity_shards = {}", cfg.layout.parity_shards);
            println!();

            let file = match path {
                Some(p) => p.to_path_buf(),
                None => config::config_file_path()?,
            };
            println!("{} {}", style("Config file:").dim(), file.display());
            if !file.exists() {
                println!(
                    "{} Run '{}' to create it",
                    style("(not created yet)").yellow(),
                    style("cessfs config init").green()
                );
            }
        }

        Some(ConfigCommands::Path) => match path {
            Some(p) => println!("{}", p.display()),
            None => println!("{}", config::config_file_path()?.display()),
        },

        Some(ConfigCommands::Init { force }) => {
            let file = match path {
                Some(p) => p.to_path_buf(),
                None => config::config_file_path()?,
            };
            if file.exists() && !force {
                println!(
                    "{} Config file already exists at {}",
                    style(symbols::WARN).yellow(),
                    file.display()
                );
                println!("Use --force to overwrite");
                return Ok(());
            }

            let saved = config::save_config(&config::ClientConfig::default(), Some(&file))?;
            println!(
                "{} Config file created at {}",
                style(symbols::CHECK).green(),
                saved.display()
            );
        }
    }

    Ok(())
}
