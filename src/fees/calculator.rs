//! Fee calculator
//!
//! Converts sponsor costs to the reference currency, applies the volatility
//! buffer and optional platform fee, and rounds **up** to the smallest unit
//! of each supported denomination. Undercharging breaks the sponsor
//! guarantee, so rounding down is never acceptable.

use crate::config::FeeConfig;
use crate::error::SwapError;
use crate::oracle::PriceOracle;
use crate::types::{
    CostBreakdown, FeeToken, UserFee, LAMPORTS_PER_SOL, USDC_UNITS_PER_USD,
};
use std::sync::Arc;

/// Minimum fee expressed in both supported denominations so the caller (or
/// the user) can choose
#[derive(Debug, Clone)]
pub struct MinimumFee {
    pub sol: UserFee,
    pub usdc: UserFee,
    /// USD value the fee must cover after buffer and platform fee
    pub required_usd: f64,
}

impl MinimumFee {
    pub fn in_token(&self, token: FeeToken) -> UserFee {
        match token {
            FeeToken::Sol => self.sol.clone(),
            FeeToken::Usdc => self.usdc.clone(),
        }
    }
}

pub struct FeeCalculator {
    oracle: Arc<PriceOracle>,
    cfg: FeeConfig,
}

impl FeeCalculator {
    pub fn new(oracle: Arc<PriceOracle>, cfg: FeeConfig) -> Self {
        Self { oracle, cfg }
    }

    /// Minimum user fee covering `costs` plus the volatility buffer and the
    /// configured platform fee
    pub async fn minimum_fee(
        &self,
        costs: &CostBreakdown,
        volatility_buffer: f64,
    ) -> Result<MinimumFee, SwapError> {
        let price = self.oracle.sol_usd().await?;
        Ok(self.minimum_fee_at_price(costs, volatility_buffer, price))
    }

    /// Pure computation at a known reference price (used by the validator to
    /// re-derive the minimum during checks)
    pub fn minimum_fee_at_price(
        &self,
        costs: &CostBreakdown,
        volatility_buffer: f64,
        sol_usd: f64,
    ) -> MinimumFee {
        let cost_usd = lamports_to_usd(costs.total_sponsor_cost, sol_usd);
        let required_usd = cost_usd
            * (1.0 + volatility_buffer)
            * (1.0 + self.cfg.platform_fee_bps as f64 / 10_000.0);

        let sol_amount = (required_usd / sol_usd * LAMPORTS_PER_SOL as f64).ceil() as u64;
        let usdc_amount = (required_usd * USDC_UNITS_PER_USD as f64).ceil() as u64;

        MinimumFee {
            sol: UserFee {
                token: FeeToken::Sol,
                amount: sol_amount,
                value_usd: lamports_to_usd(sol_amount, sol_usd),
            },
            usdc: UserFee {
                token: FeeToken::Usdc,
                amount: usdc_amount,
                value_usd: usdc_amount as f64 / USDC_UNITS_PER_USD as f64,
            },
            required_usd,
        }
    }

    /// Convert an amount between fee denominations through the cached
    /// reference price; identity when `from == to`. Rounds up.
    pub async fn convert(
        &self,
        amount: u64,
        from: FeeToken,
        to: FeeToken,
    ) -> Result<u64, SwapError> {
        if from == to {
            return Ok(amount);
        }
        let price = self.oracle.sol_usd().await?;
        let converted = match (from, to) {
            (FeeToken::Sol, FeeToken::Usdc) => {
                lamports_to_usd(amount, price) * USDC_UNITS_PER_USD as f64
            }
            (FeeToken::Usdc, FeeToken::Sol) => {
                amount as f64 / USDC_UNITS_PER_USD as f64 / price * LAMPORTS_PER_SOL as f64
            }
            _ => unreachable!("identity handled above"),
        };
        Ok(converted.ceil() as u64)
    }

    /// USD value of a fee amount at the current reference price
    pub async fn fee_value_usd(&self, token: FeeToken, amount: u64) -> Result<f64, SwapError> {
        match token {
            FeeToken::Usdc => Ok(amount as f64 / USDC_UNITS_PER_USD as f64),
            FeeToken::Sol => {
                let price = self.oracle.sol_usd().await?;
                Ok(lamports_to_usd(amount, price))
            }
        }
    }

    /// Absolute drift allowance for a quoted amount
    pub fn drift_threshold(amount: f64, max_drift_percent: f64) -> f64 {
        amount * max_drift_percent / 100.0
    }

    /// Percentage change between a quoted amount and a fresh re-quote
    pub fn drift_percent(expected: f64, actual: f64) -> f64 {
        if expected == 0.0 {
            return 0.0;
        }
        ((expected - actual).abs() / expected) * 100.0
    }

    pub fn config(&self) -> &FeeConfig {
        &self.cfg
    }
}

/// Lamports to USD at a given SOL/USD rate
pub fn lamports_to_usd(lamports: u64, sol_usd: f64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64 * sol_usd
}
