//! Test utilities: mock chain RPC, scriptable mock bridge provider, and
//! fixture builders shared by unit and integration tests.

use crate::config::OracleConfig;
use crate::error::SwapError;
use crate::oracle::PriceOracle;
use crate::providers::{BridgeProvider, ProviderTransaction};
use crate::rpc::{ChainRpc, SimulationResult};
use crate::types::{
    BridgeQuote, BridgingState, CostBreakdown, ExecutionStatus, QuoteParams, TokenInfo,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use solana_sdk::{
    account::Account,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{v0::Message as MessageV0, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    system_instruction,
    transaction::VersionedTransaction,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Scriptable in-memory chain
#[derive(Default)]
pub struct MockChainRpc {
    balances: DashMap<Pubkey, u64>,
    accounts: DashMap<Pubkey, Account>,
    simulation: Mutex<SimulationResult>,
    /// Error message returned by send_transaction when set
    send_failure: Mutex<Option<String>>,
    sent: Mutex<Vec<VersionedTransaction>>,
    blockhash: Mutex<Option<Hash>>,
}

impl MockChainRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, pubkey: Pubkey, lamports: u64) {
        self.balances.insert(pubkey, lamports);
    }

    pub fn set_account(&self, pubkey: Pubkey, account: Account) {
        self.accounts.insert(pubkey, account);
    }

    pub fn set_blockhash(&self, hash: Hash) {
        *self.blockhash.lock() = Some(hash);
    }

    pub fn fail_sends(&self, message: &str) {
        *self.send_failure.lock() = Some(message.to_string());
    }

    pub fn set_simulation(&self, result: SimulationResult) {
        *self.simulation.lock() = result;
    }

    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ChainRpc for MockChainRpc {
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, SwapError> {
        // Generous default so sponsor solvency checks pass unless a test
        // scripts otherwise
        Ok(self
            .balances
            .get(pubkey)
            .map(|b| *b)
            .unwrap_or(10_000_000_000))
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, SwapError> {
        Ok(self.blockhash.lock().unwrap_or_else(Hash::new_unique))
    }

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Account, SwapError> {
        self.accounts
            .get(pubkey)
            .map(|a| a.clone())
            .ok_or_else(|| SwapError::Rpc(format!("AccountNotFound: {}", pubkey)))
    }

    async fn simulate_transaction(
        &self,
        _tx: &VersionedTransaction,
    ) -> Result<SimulationResult, SwapError> {
        Ok(self.simulation.lock().clone())
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, SwapError> {
        if let Some(message) = self.send_failure.lock().clone() {
            return Err(SwapError::Rpc(message));
        }
        self.sent.lock().push(tx.clone());
        Ok(Signature::from([7u8; 64]))
    }
}

/// A price oracle with an injected cached price and no live feed behind it
pub fn oracle_with_price(usd: f64) -> Arc<PriceOracle> {
    let oracle = PriceOracle::new(
        Arc::new(MockChainRpc::new()),
        OracleConfig {
            price_feed: "H6ARHf6YXhGYeQfUzQNGk6rDNnLBQKrenN712K4AQJEG".to_string(),
            cache_ttl_secs: 3_600,
            feed_max_age_secs: 120,
            sanity_min_usd: 1.0,
            sanity_max_usd: 100_000.0,
        },
    )
    .expect("oracle");
    oracle.set_cached_price(usd);
    Arc::new(oracle)
}

/// Quote request fixture
pub fn test_params(user_wallet: Pubkey) -> QuoteParams {
    QuoteParams {
        source_token: Pubkey::new_unique(),
        amount: 1_000_000,
        destination_chain: "ethereum".to_string(),
        destination_token: "0xA0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string(),
        destination_wallet: "0x00000000000000000000000000000000deadbeef".to_string(),
        user_wallet,
    }
}

/// Quote fixture valid for one minute
pub fn test_quote(provider: &str, destination_amount: &str) -> BridgeQuote {
    BridgeQuote {
        provider: provider.to_string(),
        quote_id: format!("{}-quote", provider),
        source_amount: "1000000".to_string(),
        destination_amount: destination_amount.to_string(),
        estimated_seconds: 120,
        valid_until: Utc::now() + ChronoDuration::seconds(60),
        route: "solana->ethereum".to_string(),
        costs: CostBreakdown::new(5_000, 10_000, 0, None, None),
        provider_data: serde_json::json!({ "leg": "direct" }),
    }
}

/// Base64 of an unsigned user-payer transaction with an opaque bridge
/// instruction, shaped like what a real provider returns
pub fn provider_tx_base64(user: &Pubkey) -> String {
    let bridge_program = Pubkey::new_unique();
    let instructions = vec![
        Instruction::new_with_bytes(
            bridge_program,
            &[0xb1, 0x06, 0x0e],
            vec![
                AccountMeta::new(*user, true),
                AccountMeta::new(Pubkey::new_unique(), false),
            ],
        ),
        system_instruction::transfer(user, &Pubkey::new_unique(), 1_000_000),
    ];
    let message = MessageV0::try_compile(user, &instructions, &[], Hash::new_unique())
        .expect("compile provider tx");
    let message = VersionedMessage::V0(message);
    let n = crate::compat::message_header(&message).num_required_signatures as usize;
    let tx = VersionedTransaction {
        signatures: vec![Signature::default(); n],
        message,
    };
    BASE64_STANDARD.encode(bincode::serialize(&tx).expect("serialize"))
}

/// Scriptable bridge provider
pub struct MockBridgeProvider {
    name: String,
    supports: Mutex<Result<bool, String>>,
    quote: Mutex<Option<Result<BridgeQuote, String>>>,
    validate_amount: Mutex<Option<String>>,
    costs: Mutex<Option<CostBreakdown>>,
    transaction_b64: Mutex<Option<String>>,
    statuses: Mutex<VecDeque<BridgingState>>,
    current_status: Mutex<BridgingState>,
    pub build_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
}

impl MockBridgeProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            supports: Mutex::new(Ok(true)),
            quote: Mutex::new(None),
            validate_amount: Mutex::new(None),
            costs: Mutex::new(None),
            transaction_b64: Mutex::new(None),
            statuses: Mutex::new(VecDeque::new()),
            current_status: Mutex::new(BridgingState::Pending),
            build_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_supports(&self, supported: bool) {
        *self.supports.lock() = Ok(supported);
    }

    pub fn fail_supports(&self, message: &str) {
        *self.supports.lock() = Err(message.to_string());
    }

    pub fn set_quote(&self, quote: BridgeQuote) {
        *self.quote.lock() = Some(Ok(quote));
    }

    pub fn fail_quote(&self, message: &str) {
        *self.quote.lock() = Some(Err(message.to_string()));
    }

    /// Destination amount returned by validate_quote; defaults to the
    /// original quoted amount (zero drift)
    pub fn set_requote_amount(&self, amount: &str) {
        *self.validate_amount.lock() = Some(amount.to_string());
    }

    pub fn set_costs(&self, costs: CostBreakdown) {
        *self.costs.lock() = Some(costs);
    }

    pub fn set_transaction_base64(&self, b64: String) {
        *self.transaction_b64.lock() = Some(b64);
    }

    /// Queue one status to be reported after the currently queued ones
    pub fn push_status(&self, state: BridgingState) {
        self.statuses.lock().push_back(state);
    }

    /// Report this status on every poll, dropping any queue
    pub fn hold_status(&self, state: BridgingState) {
        self.statuses.lock().clear();
        *self.current_status.lock() = state;
    }
}

#[async_trait]
impl BridgeProvider for MockBridgeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn supports_route(&self, _params: &QuoteParams) -> Result<bool, SwapError> {
        self.supports
            .lock()
            .clone()
            .map_err(|m| SwapError::provider(&self.name, m))
    }

    async fn get_quote(&self, _params: &QuoteParams) -> Result<BridgeQuote, SwapError> {
        match self.quote.lock().clone() {
            Some(Ok(quote)) => Ok(quote),
            Some(Err(message)) => Err(SwapError::provider(&self.name, message)),
            None => Ok(test_quote(&self.name, "995000")),
        }
    }

    async fn validate_quote(&self, quote: &BridgeQuote) -> Result<String, SwapError> {
        Ok(self
            .validate_amount
            .lock()
            .clone()
            .unwrap_or_else(|| quote.destination_amount.clone()))
    }

    async fn build_transaction(
        &self,
        _quote: &BridgeQuote,
        user_wallet: &Pubkey,
    ) -> Result<ProviderTransaction, SwapError> {
        let call = self.build_calls.fetch_add(1, Ordering::SeqCst);
        let transaction_base64 = self
            .transaction_b64
            .lock()
            .clone()
            .unwrap_or_else(|| provider_tx_base64(user_wallet));
        Ok(ProviderTransaction {
            // A fresh order id per call, like real providers
            order_id: format!("{}-order-{}", self.name, call),
            transaction_base64,
        })
    }

    async fn get_status(&self, _order_id: &str) -> Result<ExecutionStatus, SwapError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut current = self.current_status.lock();
        if let Some(next) = self.statuses.lock().pop_front() {
            *current = next;
        }
        Ok(ExecutionStatus {
            state: *current,
            source_tx: None,
            destination_tx: matches!(*current, BridgingState::Completed)
                .then(|| "0xdesttx".to_string()),
            error: None,
        })
    }

    async fn estimate_costs(&self, quote: &BridgeQuote) -> Result<CostBreakdown, SwapError> {
        Ok(self.costs.lock().clone().unwrap_or_else(|| quote.costs.clone()))
    }

    async fn fetch_token_list(&self) -> Result<Vec<TokenInfo>, SwapError> {
        Ok(vec![TokenInfo {
            chain: "ethereum".to_string(),
            address: "0xA0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string(),
            symbol: "USDC".to_string(),
            decimals: 6,
        }])
    }
}
