//! Configuration module for the sponsored swap engine
//!
//! Handles configuration loading from TOML files with environment variable
//! overrides, and provides structured configuration types with validation.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// RPC endpoints configuration
    pub rpc: RpcConfig,

    /// Sponsor wallet configuration
    pub sponsor: SponsorConfig,

    /// Price oracle configuration
    pub oracle: OracleConfig,

    /// Fee policy configuration
    pub fees: FeeConfig,

    /// Bridge provider endpoints
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Swap lifecycle configuration
    #[serde(default)]
    pub swap: SwapConfig,

    /// Monitoring and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Persistence backend
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// List of RPC endpoints, rotated round-robin
    pub endpoints: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Max retries per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SponsorConfig {
    /// Path to the sponsor keypair file
    pub keypair_path: String,

    /// Optional lamports advanced from sponsor to user inside the sponsored
    /// transaction (covers wrapped-SOL or interim balances). Zero disables.
    #[serde(default)]
    pub advance_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// On-chain SOL/USD price feed account
    pub price_feed: String,

    /// Cache TTL in seconds
    #[serde(default = "default_oracle_ttl")]
    pub cache_ttl_secs: u64,

    /// Maximum accepted age of the on-chain publish timestamp in seconds;
    /// older values are treated as fetch failures
    #[serde(default = "default_feed_max_age")]
    pub feed_max_age_secs: u64,

    /// Sanity band: prices outside [min, max] USD are rejected as implausible
    #[serde(default = "default_sanity_min")]
    pub sanity_min_usd: f64,

    #[serde(default = "default_sanity_max")]
    pub sanity_max_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Volatility buffer applied on top of sponsor cost (0.15 = 15%)
    #[serde(default = "default_volatility_buffer")]
    pub volatility_buffer: f64,

    /// Platform fee in basis points (0 = disabled)
    #[serde(default)]
    pub platform_fee_bps: u16,

    /// Maximum accepted quote drift in percent
    #[serde(default = "default_max_drift")]
    pub max_drift_percent: f64,

    /// Absolute sanity ceiling for sponsor cost in lamports
    #[serde(default = "default_max_sponsor_cost")]
    pub max_sponsor_cost_lamports: u64,

    /// USDC mint used for the token fee denomination
    #[serde(default = "default_usdc_mint")]
    pub usdc_mint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name, unique within the registry
    pub name: String,

    /// Base URL of the provider's HTTP API
    pub base_url: String,

    /// Optional bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfig {
    /// TTL of prepared (unsigned) swaps in seconds
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_secs: u64,

    /// Monitor polling interval in seconds
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    /// Monitor attempt budget before giving up
    #[serde(default = "default_monitor_attempts")]
    pub monitor_max_attempts: u32,

    /// Aggregation round timeout in milliseconds
    #[serde(default = "default_aggregation_timeout_ms")]
    pub aggregation_timeout_ms: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            pending_ttl_secs: default_pending_ttl(),
            monitor_interval_secs: default_monitor_interval(),
            monitor_max_attempts: default_monitor_attempts(),
            aggregation_timeout_ms: default_aggregation_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            metrics_port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend: "memory" or "sled"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Path for the sled database
    #[serde(default = "default_sled_path")]
    pub sled_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            sled_path: default_sled_path(),
        }
    }
}

// Default value functions
fn default_rpc_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_oracle_ttl() -> u64 {
    60
}
fn default_feed_max_age() -> u64 {
    120
}
fn default_sanity_min() -> f64 {
    1.0
}
fn default_sanity_max() -> f64 {
    100_000.0
}
fn default_volatility_buffer() -> f64 {
    0.15
}
fn default_max_drift() -> f64 {
    2.0
}
fn default_max_sponsor_cost() -> u64 {
    100_000_000 // 0.1 SOL
}
fn default_usdc_mint() -> String {
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string()
}
fn default_provider_timeout_ms() -> u64 {
    5_000
}
fn default_pending_ttl() -> u64 {
    120
}
fn default_monitor_interval() -> u64 {
    10
}
fn default_monitor_attempts() -> u32 {
    60
}
fn default_aggregation_timeout_ms() -> u64 {
    8_000
}
fn default_true() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_storage_backend() -> String {
    "memory".to_string()
}
fn default_sled_path() -> String {
    "data/swaps.sled".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides (.env)
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.endpoints.is_empty() {
            anyhow::bail!("rpc.endpoints must not be empty");
        }
        if self.fees.volatility_buffer < 0.0 || self.fees.volatility_buffer > 1.0 {
            anyhow::bail!(
                "fees.volatility_buffer {} outside [0, 1]",
                self.fees.volatility_buffer
            );
        }
        if self.fees.max_drift_percent <= 0.0 {
            anyhow::bail!("fees.max_drift_percent must be positive");
        }
        if self.oracle.sanity_min_usd >= self.oracle.sanity_max_usd {
            anyhow::bail!("oracle sanity band is empty");
        }
        if !matches!(self.storage.backend.as_str(), "memory" | "sled") {
            anyhow::bail!("storage.backend must be 'memory' or 'sled'");
        }
        let mut names = std::collections::HashSet::new();
        for p in &self.providers {
            if !names.insert(&p.name) {
                anyhow::bail!("duplicate provider name '{}'", p.name);
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                endpoints: vec!["https://api.mainnet-beta.solana.com".to_string()],
                timeout_secs: default_rpc_timeout(),
                max_retries: default_max_retries(),
            },
            sponsor: SponsorConfig {
                keypair_path: "~/.config/solana/sponsor.json".to_string(),
                advance_lamports: 0,
            },
            oracle: OracleConfig {
                // Pyth SOL/USD mainnet feed
                price_feed: "H6ARHf6YXhGYeQfUzQNGk6rDNnLBQKrenN712K4AQJEG".to_string(),
                cache_ttl_secs: default_oracle_ttl(),
                feed_max_age_secs: default_feed_max_age(),
                sanity_min_usd: default_sanity_min(),
                sanity_max_usd: default_sanity_max(),
            },
            fees: FeeConfig {
                volatility_buffer: default_volatility_buffer(),
                platform_fee_bps: 0,
                max_drift_percent: default_max_drift(),
                max_sponsor_cost_lamports: default_max_sponsor_cost(),
                usdc_mint: default_usdc_mint(),
            },
            providers: Vec::new(),
            swap: SwapConfig::default(),
            monitoring: MonitoringConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}
