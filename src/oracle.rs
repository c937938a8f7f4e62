//! Price oracle client
//!
//! Reads the SOL/USD reference rate from a signed on-chain feed (Pyth V2
//! price account layout) rather than a centralized API, so there is no single
//! off-chain trust point. The value is cached with a short TTL; a stale cache
//! is served as a last-resort fallback with a logged warning, but an empty
//! cache plus a failed fetch is a hard `PriceOracleUnavailable`: fee
//! computation must never proceed on an unknown price.

use crate::config::OracleConfig;
use crate::error::SwapError;
use crate::rpc::ChainRpc;
use chrono::Utc;
use parking_lot::RwLock;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Pyth price account magic (little-endian u32 at offset 0)
const FEED_MAGIC: u32 = 0xa1b2_c3d4;
/// Supported feed layout version
const FEED_VERSION: u32 = 2;
/// Aggregate status value meaning the feed is actively trading
const STATUS_TRADING: u32 = 1;
/// Minimum account length covering the aggregate price slot
const FEED_MIN_LEN: usize = 240;

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    usd: f64,
    fetched_at: Instant,
}

/// On-chain price feed client with TTL caching and refresh deduplication
pub struct PriceOracle {
    rpc: Arc<dyn ChainRpc>,
    feed: Pubkey,
    cfg: OracleConfig,
    cache: RwLock<Option<CachedPrice>>,
    /// Serializes refreshes so concurrent callers share one in-flight fetch
    refresh_lock: tokio::sync::Mutex<()>,
}

impl PriceOracle {
    pub fn new(rpc: Arc<dyn ChainRpc>, cfg: OracleConfig) -> Result<Self, SwapError> {
        let feed = Pubkey::from_str(&cfg.price_feed)
            .map_err(|e| SwapError::Configuration(format!("bad oracle feed address: {}", e)))?;
        Ok(Self {
            rpc,
            feed,
            cfg,
            cache: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Current SOL/USD rate, from cache when fresh
    pub async fn sol_usd(&self) -> Result<f64, SwapError> {
        let ttl = Duration::from_secs(self.cfg.cache_ttl_secs);

        if let Some(cached) = *self.cache.read() {
            if cached.fetched_at.elapsed() < ttl {
                return Ok(cached.usd);
            }
        }

        // One refresh at a time; waiters re-check the cache on wakeup instead
        // of issuing parallel fetches
        let _guard = self.refresh_lock.lock().await;
        if let Some(cached) = *self.cache.read() {
            if cached.fetched_at.elapsed() < ttl {
                return Ok(cached.usd);
            }
        }

        match self.fetch_feed().await {
            Ok(price) => {
                *self.cache.write() = Some(CachedPrice {
                    usd: price,
                    fetched_at: Instant::now(),
                });
                debug!(price_usd = price, "Oracle price refreshed");
                Ok(price)
            }
            Err(err) => {
                if let Some(stale) = *self.cache.read() {
                    warn!(
                        error = %err,
                        stale_age_secs = stale.fetched_at.elapsed().as_secs(),
                        "Oracle refresh failed, serving stale cached price"
                    );
                    Ok(stale.usd)
                } else {
                    Err(SwapError::PriceOracleUnavailable(err.to_string()))
                }
            }
        }
    }

    async fn fetch_feed(&self) -> Result<f64, SwapError> {
        let account = self.rpc.get_account(&self.feed).await?;
        parse_feed_price(
            &account.data,
            Utc::now().timestamp(),
            self.cfg.feed_max_age_secs as i64,
            self.cfg.sanity_min_usd,
            self.cfg.sanity_max_usd,
        )
    }

    /// Inject a price for tests and offline operation
    #[cfg(any(test, feature = "test_utils"))]
    pub fn set_cached_price(&self, usd: f64) {
        *self.cache.write() = Some(CachedPrice {
            usd,
            fetched_at: Instant::now(),
        });
    }
}

/// Parse the aggregate price out of a Pyth V2 price account.
///
/// A publish timestamp older than `max_age_secs` and a price outside the
/// sanity band are both treated as fetch failures, not valid prices.
pub fn parse_feed_price(
    data: &[u8],
    now_unix: i64,
    max_age_secs: i64,
    sanity_min: f64,
    sanity_max: f64,
) -> Result<f64, SwapError> {
    if data.len() < FEED_MIN_LEN {
        return Err(SwapError::PriceOracleUnavailable(format!(
            "feed account too short: {} bytes",
            data.len()
        )));
    }

    let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
    if magic != FEED_MAGIC {
        return Err(SwapError::PriceOracleUnavailable(format!(
            "bad feed magic {:#x}",
            magic
        )));
    }
    let version = u32::from_le_bytes(data[4..8].try_into().unwrap());
    if version != FEED_VERSION {
        return Err(SwapError::PriceOracleUnavailable(format!(
            "unsupported feed version {}",
            version
        )));
    }

    let expo = i32::from_le_bytes(data[20..24].try_into().unwrap());
    let publish_time = i64::from_le_bytes(data[96..104].try_into().unwrap());
    let agg_price = i64::from_le_bytes(data[208..216].try_into().unwrap());
    let agg_status = u32::from_le_bytes(data[224..228].try_into().unwrap());

    if agg_status != STATUS_TRADING {
        return Err(SwapError::PriceOracleUnavailable(format!(
            "feed not trading (status {})",
            agg_status
        )));
    }

    let age = now_unix - publish_time;
    if age > max_age_secs {
        return Err(SwapError::PriceOracleUnavailable(format!(
            "feed publish time {}s old exceeds {}s",
            age, max_age_secs
        )));
    }

    let price = agg_price as f64 * 10f64.powi(expo);
    if !price.is_finite() || price < sanity_min || price > sanity_max {
        return Err(SwapError::PriceOracleUnavailable(format!(
            "price {} outside sanity band [{}, {}]",
            price, sanity_min, sanity_max
        )));
    }

    Ok(price)
}
