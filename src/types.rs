//! Common types used throughout the swap engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Lamports charged per signature on the source chain
pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Smallest-unit scale of the USDC fee denomination (6 decimals)
pub const USDC_UNITS_PER_USD: u64 = 1_000_000;

/// Fee denomination offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeToken {
    /// Native SOL (lamports)
    Sol,
    /// USDC (6-decimal base units)
    Usdc,
}

impl FeeToken {
    pub fn decimals(&self) -> u8 {
        match self {
            FeeToken::Sol => 9,
            FeeToken::Usdc => 6,
        }
    }
}

/// Immutable parameters of a quote request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteParams {
    /// Source token mint on Solana
    pub source_token: Pubkey,

    /// Swap amount in source token base units
    pub amount: u64,

    /// Destination chain identifier (provider-facing, e.g. "ethereum")
    pub destination_chain: String,

    /// Destination token address in the destination chain's format
    pub destination_token: String,

    /// Wallet receiving funds on the destination chain
    pub destination_wallet: String,

    /// User wallet on Solana (authorizes the swap and the fee)
    pub user_wallet: Pubkey,
}

/// Itemized source-chain costs borne by the sponsor
///
/// `total_sponsor_cost` is always the sum of the itemized sponsor-borne
/// components; amounts the user pays directly never appear here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Base transaction gas in lamports
    pub base_gas: u64,

    /// Priority fee in lamports
    pub priority_fee: u64,

    /// Bridge service fee in lamports
    pub bridge_fee: u64,

    /// Optional token transfer fee in lamports
    pub transfer_fee: Option<u64>,

    /// Optional rent for newly created accounts in lamports
    pub rent: Option<u64>,

    /// Derived total, maintained by the constructor
    pub total_sponsor_cost: u64,
}

impl CostBreakdown {
    pub fn new(
        base_gas: u64,
        priority_fee: u64,
        bridge_fee: u64,
        transfer_fee: Option<u64>,
        rent: Option<u64>,
    ) -> Self {
        let total_sponsor_cost = base_gas
            + priority_fee
            + bridge_fee
            + transfer_fee.unwrap_or(0)
            + rent.unwrap_or(0);
        Self {
            base_gas,
            priority_fee,
            bridge_fee,
            transfer_fee,
            rent,
            total_sponsor_cost,
        }
    }

    /// Add lamports for extra sponsor-side signatures and recompute the total
    pub fn with_added_signatures(mut self, count: u64) -> Self {
        self.base_gas += count * LAMPORTS_PER_SIGNATURE;
        self.total_sponsor_cost += count * LAMPORTS_PER_SIGNATURE;
        self
    }
}

/// A quote returned by a bridge provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeQuote {
    /// Provider that produced this quote
    pub provider: String,

    /// Provider-assigned quote id
    pub quote_id: String,

    /// Source amount in base units (string to survive u128 chains)
    pub source_amount: String,

    /// Destination amount in base units
    pub destination_amount: String,

    /// Estimated bridging duration in seconds
    pub estimated_seconds: u64,

    /// Absolute expiry; always in the future when returned to a caller,
    /// but consumers must re-check before acting
    pub valid_until: DateTime<Utc>,

    /// Human-readable route description
    pub route: String,

    /// Itemized sponsor costs
    pub costs: CostBreakdown,

    /// Opaque provider-specific payload required to build a transaction later
    pub provider_data: serde_json::Value,
}

impl BridgeQuote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until <= now
    }

    /// Net amount used for ranking: destination proceeds minus the fee
    /// components the user's proceeds actually bear. Sponsor-borne costs are
    /// recovered through the user fee and do not reduce this figure.
    pub fn net_amount(&self) -> f64 {
        let dest: f64 = self.destination_amount.parse().unwrap_or(0.0);
        let fees = self.costs.bridge_fee + self.costs.transfer_fee.unwrap_or(0);
        dest - fees as f64
    }
}

/// Fee charged to the user, with a normalized USD value for comparison
///
/// `value_usd` is derived from `amount` via the reference rate current at
/// validation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFee {
    pub token: FeeToken,
    /// Amount in the denomination's base units
    pub amount: u64,
    /// Normalized USD value
    pub value_usd: f64,
}

/// Per-provider outcome of an aggregation round; failures are recorded,
/// never silently dropped
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProviderOutcome {
    Success { quote_id: String },
    NoRoute,
    Error { message: String },
}

/// Result of querying every eligible provider
#[derive(Debug, Clone)]
pub struct AggregatedQuotes {
    /// All quotes obtained, ranked best-first
    pub quotes: Vec<BridgeQuote>,

    /// Index into `quotes` of the highest-net quote (always 0 when non-empty)
    pub best: usize,

    /// Index into `quotes` of the speed/value-weighted recommendation
    pub recommended: usize,

    /// Outcome per probed provider, keyed by provider name
    pub outcomes: Vec<(String, ProviderOutcome)>,
}

impl AggregatedQuotes {
    pub fn best_quote(&self) -> Option<&BridgeQuote> {
        self.quotes.get(self.best)
    }

    pub fn recommended_quote(&self) -> Option<&BridgeQuote> {
        self.quotes.get(self.recommended)
    }
}

/// Ephemeral prepared swap held only in the orchestrator's short-TTL cache.
/// Not durable, never treated as committed state.
#[derive(Debug, Clone)]
pub struct PreparedSwap {
    pub swap_id: String,

    /// Unsigned (sponsor-partially-signed) transaction bytes
    pub transaction: Vec<u8>,

    /// Fee the user agreed to, None on the direct (unsponsored) path
    pub fee: Option<UserFee>,

    /// Sponsor cost snapshot at preparation time
    pub sponsor_cost: CostBreakdown,

    /// The quote this swap was prepared from
    pub quote: BridgeQuote,

    /// The original request, preserved for the durable record's route fields
    pub params: QuoteParams,

    /// Provider-side order id minted when the transaction was built
    pub provider_order_id: String,

    pub expires_at: DateTime<Utc>,
}

impl PreparedSwap {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Lifecycle status of a persisted swap
///
/// Monotonic along `Quoted → Preparing → AwaitingSignature → Submitted →
/// Processing → Bridging → Completed`; `Failed` and `Expired` are terminal
/// branches reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    Quoted,
    Preparing,
    AwaitingSignature,
    Submitted,
    Processing,
    Bridging,
    Completed,
    Failed,
    Expired,
}

impl SwapStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SwapStatus::Completed | SwapStatus::Failed | SwapStatus::Expired
        )
    }
}

/// Durable swap record, created only once the user has signed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swap {
    pub id: String,

    pub user_wallet: String,

    pub source_token: String,
    pub source_amount: String,
    pub destination_chain: String,
    pub destination_token: String,
    pub destination_wallet: String,

    /// Provider that quoted and executes this swap
    pub provider: String,

    /// Provider-side order id used for status polling
    pub provider_order_id: String,

    pub fee: Option<UserFee>,

    pub status: SwapStatus,

    /// Source-chain transaction signature once submitted
    pub source_signature: Option<String>,

    /// Destination-chain transaction reference once bridged
    pub destination_tx: Option<String>,

    /// Failure detail for terminal error states
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalized provider-reported bridging status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgingState {
    Pending,
    Processing,
    Bridging,
    Completed,
    Failed,
}

/// Provider execution status with optional chain references
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub state: BridgingState,
    pub source_tx: Option<String>,
    pub destination_tx: Option<String>,
    pub error: Option<String>,
}

impl ExecutionStatus {
    /// Map the provider-reported state onto the swap lifecycle
    pub fn as_swap_status(&self) -> SwapStatus {
        match self.state {
            BridgingState::Pending => SwapStatus::Submitted,
            BridgingState::Processing => SwapStatus::Processing,
            BridgingState::Bridging => SwapStatus::Bridging,
            BridgingState::Completed => SwapStatus::Completed,
            BridgingState::Failed => SwapStatus::Failed,
        }
    }
}

/// Token metadata exposed by providers for the external token cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub chain: String,
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}
