//! Blockhash Guess node
//!
//! Runs the round engine over a simulated chain, produces blocks on a timer and
//! serves the HTTP API.

use blockhash_guess::{
    api::ApiServer,
    config::{ConfigLoader, LogLevel, NodeConfig},
    errors::NodeResult,
    producer::BlockProducer,
    service::GameService,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Blockhash Guess CLI
#[derive(Parser)]
#[command(name = "blockhash-guess")]
#[command(about = "Round-based guessing game settled by a future block hash")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Data directory override
    #[arg(short, long)]
    data_dir: Option<String>,

    /// API port override
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node: block producer and HTTP API
    Run {
        /// Finalize rounds automatically once they become finalizable
        #[arg(long)]
        auto_finalize: bool,

        /// Block interval in milliseconds
        #[arg(short, long)]
        block_interval_ms: Option<u64>,
    },

    /// Write the effective configuration as TOML
    GenerateConfig {
        /// Output path
        #[arg(short, long, default_value = "blockhash-guess.toml")]
        output: String,

        /// Use the production preset instead of defaults
        #[arg(long)]
        production: bool,
    },
}

#[tokio::main]
async fn main() -> NodeResult<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;

    if let Some(dir) = cli.data_dir {
        config.storage.data_directory = dir;
    }
    if let Some(port) = cli.port {
        config.api.port = port;
    }
    if cli.verbose {
        config.monitoring.log_level = LogLevel::Debug;
    }

    init_tracing(&config);

    match cli.command.unwrap_or(Commands::Run {
        auto_finalize: false,
        block_interval_ms: None,
    }) {
        Commands::Run {
            auto_finalize,
            block_interval_ms,
        } => {
            if auto_finalize {
                config.chain.auto_finalize = true;
            }
            if let Some(ms) = block_interval_ms {
                config.chain.block_interval_ms = ms;
            }
            config.validate()?;
            run_node(config).await
        }
        Commands::GenerateConfig { output, production } => {
            let config = if production { NodeConfig::production() } else { config };
            ConfigLoader::save(&config, &output)?;
            tracing::info!("Configuration written to {}", output);
            Ok(())
        }
    }
}

fn init_tracing(config: &NodeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.monitoring.log_level.as_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_node(config: NodeConfig) -> NodeResult<()> {
    tracing::info!("Starting blockhash-guess node");
    tracing::info!(
        "Bets {}..={} units, {} blocks to wait, window {}",
        config.game.min_guess,
        config.game.max_guess,
        config.game.blocks_to_wait,
        config.game.blockhash_window
    );
    if config.storage.enabled {
        tracing::info!("Storage: {}", config.storage.data_directory);
    } else {
        tracing::warn!("Storage disabled, state is lost on exit");
    }

    let service = GameService::start(config.clone())?;
    let state = service.game_state().await;
    tracing::info!(
        "Round {} open, target block {}, head {}",
        state.current_round,
        state.target_block,
        state.current_block
    );

    let producer = BlockProducer::new(service.clone(), config.block_interval()).spawn();

    let server = ApiServer::new(config.api.clone(), service);
    let result = server.run().await;

    producer.stop().await;

    result.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Ok(())
}
