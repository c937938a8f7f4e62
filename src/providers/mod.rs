//! Bridge provider abstraction
//!
//! A uniform contract over heterogeneous bridge services. Every call is
//! idempotent from the caller's perspective (safe to retry) except
//! `build_transaction`, which may mint a new opaque order id on each call
//! and must never be retried blindly.

pub mod registry;
pub mod relay;

pub use registry::ProviderRegistry;
pub use relay::RelayBridgeProvider;

use crate::error::SwapError;
use crate::types::{BridgeQuote, CostBreakdown, ExecutionStatus, QuoteParams, TokenInfo};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

/// Provider-built transaction plus the order id used for status polling
#[derive(Debug, Clone)]
pub struct ProviderTransaction {
    /// Provider-side order id (may be freshly minted per call)
    pub order_id: String,
    /// Base64-encoded serialized transaction
    pub transaction_base64: String,
}

/// Contract implemented by every bridge service integration
#[async_trait]
pub trait BridgeProvider: Send + Sync {
    /// Stable provider name used for registry keying and error tagging
    fn name(&self) -> &str;

    /// Whether this provider can serve the requested route
    async fn supports_route(&self, params: &QuoteParams) -> Result<bool, SwapError>;

    /// Fetch a quote for the route
    async fn get_quote(&self, params: &QuoteParams) -> Result<BridgeQuote, SwapError>;

    /// Re-quote and return the fresh destination amount, used by callers to
    /// bound quote drift
    async fn validate_quote(&self, quote: &BridgeQuote) -> Result<String, SwapError>;

    /// Build the provider's transaction for a quote. NOT idempotent.
    async fn build_transaction(
        &self,
        quote: &BridgeQuote,
        user_wallet: &Pubkey,
    ) -> Result<ProviderTransaction, SwapError>;

    /// Current bridging status for an order
    async fn get_status(&self, order_id: &str) -> Result<ExecutionStatus, SwapError>;

    /// Source-chain cost estimate for executing a quote
    async fn estimate_costs(&self, quote: &BridgeQuote) -> Result<CostBreakdown, SwapError>;

    /// Token list consumed by the external token-metadata cache. Providers
    /// without a list endpoint keep the default empty implementation.
    async fn fetch_token_list(&self) -> Result<Vec<TokenInfo>, SwapError> {
        Ok(Vec::new())
    }
}
