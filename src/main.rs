//! Sponsored swap engine service entry point
//!
//! Wires the engine together: config, sponsor wallet, RPC facade, price
//! oracle, fee calculator, provider registry, repository, and the
//! orchestrator. Everything is constructed once at startup and shared by
//! reference.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![warn(dead_code)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::Parser;
use sponsorswap::config::Config;
use sponsorswap::fees::FeeCalculator;
use sponsorswap::oracle::PriceOracle;
use sponsorswap::orchestrator::SwapOrchestrator;
use sponsorswap::providers::{ProviderRegistry, RelayBridgeProvider};
use sponsorswap::resilience::{BreakerRegistry, RetryPolicy};
use sponsorswap::rpc::{ChainRpc, RpcFacade};
use sponsorswap::storage::{MemorySwapStore, SledSwapStore, SwapRepository};
use sponsorswap::txbuild::TransactionBuilder;
use sponsorswap::wallet::SponsorWallet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    info!("Starting sponsored swap engine");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    let sponsor = Arc::new(
        SponsorWallet::from_file(&config.sponsor.keypair_path)
            .context("Failed to load sponsor wallet")?,
    );
    info!("Sponsor address: {}", sponsor.pubkey());

    if config.monitoring.enable_metrics {
        let port = config.monitoring.metrics_port;
        info!("Starting metrics endpoint on port {}", port);
        tokio::spawn(async move {
            if let Err(e) = sponsorswap::endpoints::endpoint_server(port).await {
                error!("Metrics endpoint error: {}", e);
            }
        });
    }

    // Shared resilience primitives
    let breakers = Arc::new(BreakerRegistry::default());
    let retry = RetryPolicy::new(config.rpc.max_retries as usize);

    info!(
        "Initializing RPC facade with {} endpoints",
        config.rpc.endpoints.len()
    );
    let rpc: Arc<dyn ChainRpc> = Arc::new(RpcFacade::new(
        &config.rpc.endpoints,
        retry.clone(),
        Arc::clone(&breakers),
        Duration::from_secs(config.rpc.timeout_secs),
    )?);

    let oracle = Arc::new(PriceOracle::new(Arc::clone(&rpc), config.oracle.clone())?);
    let calculator = Arc::new(FeeCalculator::new(Arc::clone(&oracle), config.fees.clone()));

    let usdc_mint = sponsorswap::Pubkey::from_str(&config.fees.usdc_mint)
        .context("Invalid USDC mint in config")?;
    let builder = Arc::new(TransactionBuilder::new(
        Arc::clone(&rpc),
        Arc::clone(&sponsor),
        usdc_mint,
    ));

    info!("Registering {} bridge providers", config.providers.len());
    let registry = Arc::new(ProviderRegistry::new(Duration::from_millis(
        config.swap.aggregation_timeout_ms,
    )));
    for provider_cfg in &config.providers {
        let provider = RelayBridgeProvider::new(
            provider_cfg.clone(),
            retry.clone(),
            Arc::clone(&breakers),
        )?;
        registry.register(Arc::new(provider));
    }
    if config.providers.is_empty() {
        warn!("No bridge providers configured; quote aggregation will fail");
    }

    let repository: Arc<dyn SwapRepository> = match config.storage.backend.as_str() {
        "sled" => {
            info!("Opening sled store at {}", config.storage.sled_path);
            Arc::new(SledSwapStore::open(&config.storage.sled_path)?)
        }
        _ => Arc::new(MemorySwapStore::new()),
    };

    let orchestrator = Arc::new(SwapOrchestrator::new(
        registry,
        calculator,
        builder,
        rpc,
        repository,
        oracle,
        config.swap.clone(),
        config.fees.clone(),
        config.sponsor.advance_lamports,
    ));

    info!("All components initialized");
    run_until_shutdown(orchestrator).await
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        "sponsorswap=debug,info"
    } else {
        "sponsorswap=info,warn,error"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path).with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        Ok(Config::default())
    }
}

/// Idle until ctrl-c, reporting engine vitals periodically
async fn run_until_shutdown(orchestrator: Arc<SwapOrchestrator>) -> Result<()> {
    let mut stats_interval = tokio::time::interval(Duration::from_secs(60));

    loop {
        tokio::select! {
            _ = stats_interval.tick() => {
                info!(
                    pending = orchestrator.pending_count(),
                    monitors = orchestrator.active_monitor_count(),
                    "Engine vitals"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    orchestrator.shutdown();
    info!("Shut down cleanly");
    Ok(())
}
