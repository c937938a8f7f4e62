//! Swap orchestrator
//!
//! Top-level state machine coordinating quote → prepare → user-sign →
//! execute → monitor. Exclusively owns the pending-swap cache and the set of
//! active monitoring tasks; durable `Swap` rows belong to the repository
//! once created.
//!
//! Lifecycle: `quoted → preparing → awaiting_signature → submitted →
//! bridging → completed`, with `failed`/`expired` reachable from any
//! non-terminal state.

pub mod monitor;

use crate::config::{FeeConfig, SwapConfig};
use crate::error::SwapError;
use crate::fees::calculator::lamports_to_usd;
use crate::fees::{FeeCalculator, FeeValidator};
use crate::metrics::metrics;
use crate::oracle::PriceOracle;
use crate::providers::ProviderRegistry;
use crate::rpc::ChainRpc;
use crate::storage::{NewSwap, StatusUpdate, SwapRepository};
use crate::txbuild::{
    simulate_transaction, validate_no_fund_leak, validate_size, TransactionBuilder,
};
use crate::types::{
    AggregatedQuotes, BridgeQuote, CostBreakdown, FeeToken, PreparedSwap, QuoteParams, Swap,
    SwapStatus, UserFee,
};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use monitor::{spawn_monitor, MonitorConfig, MonitorHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// What the caller gets back from `prepare_swap`: everything needed to
/// present the unsigned transaction for signature
#[derive(Debug, Clone)]
pub struct PrepareResponse {
    pub swap_id: String,
    /// Base64 of the unsigned (sponsor-partially-signed) transaction
    pub transaction_base64: String,
    /// Fee the user will pay; None on the native-fee path
    pub fee: Option<UserFee>,
    pub sponsor_cost: CostBreakdown,
    pub expires_at: DateTime<Utc>,
}

pub struct SwapOrchestrator {
    registry: Arc<ProviderRegistry>,
    calculator: Arc<FeeCalculator>,
    validator: FeeValidator,
    builder: Arc<TransactionBuilder>,
    rpc: Arc<dyn ChainRpc>,
    repo: Arc<dyn SwapRepository>,
    oracle: Arc<PriceOracle>,
    swap_cfg: SwapConfig,
    fee_cfg: FeeConfig,
    /// Optional sponsor→user lamport advance included in sponsored swaps
    advance_lamports: u64,

    /// Short-TTL cache of prepared, unsigned swaps, never durable state
    pending: DashMap<String, PreparedSwap>,

    /// At most one live monitor per swap id
    monitors: Arc<DashMap<String, MonitorHandle>>,
}

impl SwapOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        calculator: Arc<FeeCalculator>,
        builder: Arc<TransactionBuilder>,
        rpc: Arc<dyn ChainRpc>,
        repo: Arc<dyn SwapRepository>,
        oracle: Arc<PriceOracle>,
        swap_cfg: SwapConfig,
        fee_cfg: FeeConfig,
        advance_lamports: u64,
    ) -> Self {
        Self {
            registry,
            calculator,
            validator: FeeValidator::new(fee_cfg.clone()),
            builder,
            rpc,
            repo,
            oracle,
            swap_cfg,
            fee_cfg,
            advance_lamports,
            pending: DashMap::new(),
            monitors: Arc::new(DashMap::new()),
        }
    }

    /// Aggregate quotes from every eligible provider
    pub async fn aggregate_quotes(
        &self,
        params: &QuoteParams,
    ) -> Result<AggregatedQuotes, SwapError> {
        metrics().quotes_requested.inc();
        let timer = metrics().quote_latency.start_timer();
        let result = self.registry.aggregate_quotes(params).await;
        timer.observe_duration();
        if result.is_err() {
            metrics().quotes_failed.inc();
        }
        result
    }

    /// Prepare a swap for signing.
    ///
    /// Native-fee path (`FeeToken::Sol`): the provider transaction already
    /// carries the user as payer, so only the recency token is replaced.
    /// Token-fee path (`FeeToken::Usdc`): full sponsored rebuild with fee
    /// injection and the no-fund-leak validation chain.
    ///
    /// The result lives only in the short-TTL pending cache; nothing is
    /// written durably until the user signs.
    pub async fn prepare_swap(
        &self,
        params: &QuoteParams,
        quote: &BridgeQuote,
        fee_token: FeeToken,
    ) -> Result<PrepareResponse, SwapError> {
        self.sweep_expired_pending();
        let timer = metrics().prepare_latency.start_timer();
        let user_wallet = params.user_wallet;

        let now = Utc::now();
        if quote.is_expired(now) {
            return Err(SwapError::QuoteExpired {
                provider: quote.provider.clone(),
                quote_id: quote.quote_id.clone(),
            });
        }

        let provider = self
            .registry
            .get(&quote.provider)
            .ok_or_else(|| SwapError::NotFound(format!("provider {}", quote.provider)))?;

        // Drift re-validation against a fresh provider quote
        let fresh_amount = provider.validate_quote(quote).await?;
        let expected: f64 = quote
            .destination_amount
            .parse()
            .map_err(|_| SwapError::Validation("unparseable quoted amount".to_string()))?;
        let actual: f64 = fresh_amount
            .parse()
            .map_err(|_| SwapError::Validation("unparseable re-quoted amount".to_string()))?;
        let drift = FeeCalculator::drift_percent(expected, actual);
        if drift > self.fee_cfg.max_drift_percent {
            return Err(SwapError::QuoteDrift {
                expected: quote.destination_amount.clone(),
                actual: fresh_amount,
                drift_percent: drift,
                max_percent: self.fee_cfg.max_drift_percent,
            });
        }

        let mut costs = provider.estimate_costs(quote).await?;

        // Provider build is not idempotent; one call, no blind retries
        let provider_tx = provider.build_transaction(quote, &user_wallet).await?;
        let mut tx_bytes = TransactionBuilder::decode_base64(&provider_tx.transaction_base64)?;

        let fee = match fee_token {
            FeeToken::Sol => {
                // User pays directly; just refresh the recency token
                self.builder.refresh_blockhash(&mut tx_bytes).await?;
                None
            }
            FeeToken::Usdc => {
                // The sponsored rebuild adds the sponsor's signature
                costs = costs.with_added_signatures(1);

                let sol_usd = self.oracle.sol_usd().await?;
                let minimum = self
                    .calculator
                    .minimum_fee(&costs, self.fee_cfg.volatility_buffer)
                    .await?;
                let fee = minimum.in_token(FeeToken::Usdc);

                self.validator
                    .ensure_economics(&fee, &costs, quote, &minimum, sol_usd, now)?;

                // Sponsor must be solvent for everything it fronts
                let sponsor_balance =
                    self.rpc.get_balance(&self.builder.sponsor_pubkey()).await?;
                self.validator.check_balance(
                    costs.total_sponsor_cost + self.advance_lamports,
                    sponsor_balance,
                )?;

                tx_bytes = self
                    .builder
                    .build_sponsored(&tx_bytes, &user_wallet, &fee, self.advance_lamports)
                    .await?;

                let cost_usd = lamports_to_usd(costs.total_sponsor_cost, sol_usd);
                self.validator.assert_no_fund_leak(fee.value_usd, cost_usd)?;
                if let Err(err) =
                    validate_no_fund_leak(&tx_bytes, Some(&self.builder.sponsor_pubkey()))
                {
                    metrics().fund_leaks_blocked.inc();
                    return Err(err);
                }

                Some(fee)
            }
        };

        validate_size(&tx_bytes)?;
        simulate_transaction(self.rpc.as_ref(), &tx_bytes).await?;

        let swap_id = Uuid::new_v4().to_string();
        let expires_at = now + ChronoDuration::seconds(self.swap_cfg.pending_ttl_secs as i64);
        let prepared = PreparedSwap {
            swap_id: swap_id.clone(),
            transaction: tx_bytes.clone(),
            fee: fee.clone(),
            sponsor_cost: costs.clone(),
            quote: quote.clone(),
            params: params.clone(),
            provider_order_id: provider_tx.order_id,
            expires_at,
        };
        self.pending.insert(swap_id.clone(), prepared);
        metrics().pending_swaps.set(self.pending.len() as i64);
        metrics().swaps_prepared.inc();
        timer.observe_duration();

        info!(
            swap_id = %swap_id,
            provider = %quote.provider,
            fee_token = ?fee_token,
            "Swap prepared, awaiting signature"
        );

        Ok(PrepareResponse {
            swap_id,
            transaction_base64: BASE64_STANDARD.encode(&tx_bytes),
            fee,
            sponsor_cost: costs,
            expires_at,
        })
    }

    /// Execute a prepared swap with the user's signature.
    ///
    /// The pending entry is consumed on first call: duplicate or late
    /// confirmations get a not-found error, which is the expected outcome.
    /// The durable record is created only here.
    pub async fn execute_swap(
        &self,
        swap_id: &str,
        signed_tx_base64: &str,
    ) -> Result<Swap, SwapError> {
        self.sweep_expired_pending();

        let (_, prepared) = self
            .pending
            .remove(swap_id)
            .ok_or_else(|| SwapError::NotFound(format!("pending swap {}", swap_id)))?;
        metrics().pending_swaps.set(self.pending.len() as i64);

        if prepared.is_expired(Utc::now()) {
            return Err(SwapError::NotFound(format!(
                "pending swap {} expired",
                swap_id
            )));
        }

        let signed_bytes = TransactionBuilder::decode_base64(signed_tx_base64)?;

        // Final defense on the exact bytes that will be submitted
        if prepared.fee.is_some() {
            if let Err(err) =
                validate_no_fund_leak(&signed_bytes, Some(&self.builder.sponsor_pubkey()))
            {
                metrics().fund_leaks_blocked.inc();
                return Err(err);
            }
        }

        self.repo
            .create(
                NewSwap {
                    user_wallet: prepared.params.user_wallet.to_string(),
                    source_token: prepared.params.source_token.to_string(),
                    source_amount: prepared.quote.source_amount.clone(),
                    destination_chain: prepared.params.destination_chain.clone(),
                    destination_token: prepared.params.destination_token.clone(),
                    destination_wallet: prepared.params.destination_wallet.clone(),
                    provider: prepared.quote.provider.clone(),
                    provider_order_id: prepared.provider_order_id.clone(),
                    fee: prepared.fee.clone(),
                },
                SwapStatus::AwaitingSignature,
                swap_id,
            )
            .await?;

        let tx = TransactionBuilder::deserialize(&signed_bytes)?;
        match self.rpc.send_transaction(&tx).await {
            Ok(signature) => {
                let swap = self
                    .repo
                    .update_status(
                        swap_id,
                        SwapStatus::Submitted,
                        StatusUpdate {
                            source_signature: Some(signature.to_string()),
                            ..Default::default()
                        },
                    )
                    .await?;
                metrics().swaps_executed.inc();
                info!(swap_id = %swap_id, signature = %signature, "Swap submitted");
                self.start_monitoring(&swap);
                Ok(swap)
            }
            Err(err) => {
                metrics().swaps_failed.inc();
                warn!(swap_id = %swap_id, error = %err, "Submission failed");
                self.repo
                    .update_status(
                        swap_id,
                        SwapStatus::Failed,
                        StatusUpdate {
                            error: Some(err.user_message()),
                            ..Default::default()
                        },
                    )
                    .await?;
                Err(err)
            }
        }
    }

    /// Current status of a swap. With no live monitor (e.g. after a restart)
    /// the durable state is merged with a one-shot provider status fetch so
    /// polling loss never strands a swap indefinitely.
    pub async fn get_status(&self, swap_id: &str) -> Result<Swap, SwapError> {
        let swap = self
            .repo
            .find_by_id(swap_id)
            .await?
            .ok_or_else(|| SwapError::NotFound(format!("swap {}", swap_id)))?;

        if self.monitors.contains_key(swap_id) || swap.status.is_terminal() {
            return Ok(swap);
        }

        let Some(provider) = self.registry.get(&swap.provider) else {
            return Ok(swap);
        };
        match provider.get_status(&swap.provider_order_id).await {
            Ok(status) => {
                let new_status = status.as_swap_status();
                if new_status != swap.status {
                    return self
                        .repo
                        .update_status(
                            swap_id,
                            new_status,
                            StatusUpdate {
                                source_signature: status.source_tx,
                                destination_tx: status.destination_tx,
                                error: status.error,
                            },
                        )
                        .await;
                }
                Ok(swap)
            }
            Err(err) => {
                warn!(swap_id = %swap_id, error = %err, "One-shot status fetch failed");
                Ok(swap)
            }
        }
    }

    /// Swaps for a user wallet, most recent first
    pub async fn list_swaps(&self, wallet: &str, limit: usize) -> Result<Vec<Swap>, SwapError> {
        self.repo.find_by_user(wallet, limit).await
    }

    /// Spawn the status monitor for a submitted swap; a swap that already
    /// has a live monitor keeps it
    fn start_monitoring(&self, swap: &Swap) {
        if self.monitors.contains_key(&swap.id) {
            return;
        }
        let Some(provider) = self.registry.get(&swap.provider) else {
            warn!(swap_id = %swap.id, provider = %swap.provider, "No provider for monitoring");
            return;
        };
        spawn_monitor(
            swap.id.clone(),
            swap.provider_order_id.clone(),
            provider,
            Arc::clone(&self.repo),
            Arc::clone(&self.monitors),
            MonitorConfig {
                interval: Duration::from_secs(self.swap_cfg.monitor_interval_secs),
                max_attempts: self.swap_cfg.monitor_max_attempts,
            },
        );
    }

    /// Cancel a swap's monitor. A second call for a swap with no active
    /// monitor is a no-op.
    pub fn stop_monitoring(&self, swap_id: &str) -> bool {
        match self.monitors.remove(swap_id) {
            Some((_, handle)) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every live monitor (shutdown path)
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.monitors.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.stop_monitoring(&id);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn active_monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Drop expired pending entries; called opportunistically on each
    /// prepare/execute
    fn sweep_expired_pending(&self) {
        let now = Utc::now();
        self.pending.retain(|_, prepared| !prepared.is_expired(now));
        metrics().pending_swaps.set(self.pending.len() as i64);
    }

    /// Inject a prepared swap directly into the pending cache
    #[cfg(any(test, feature = "test_utils"))]
    pub fn inject_prepared(&self, prepared: PreparedSwap) {
        self.pending.insert(prepared.swap_id.clone(), prepared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySwapStore;
    use crate::test_utils::{
        oracle_with_price, provider_tx_base64, test_params, test_quote, MockBridgeProvider,
        MockChainRpc,
    };
    use crate::types::BridgingState;
    use crate::wallet::SponsorWallet;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::{Keypair, Signer};

    struct Harness {
        orchestrator: SwapOrchestrator,
        provider: Arc<MockBridgeProvider>,
        chain: Arc<MockChainRpc>,
        sponsor: Pubkey,
        repo: Arc<MemorySwapStore>,
    }

    fn harness() -> Harness {
        let chain = Arc::new(MockChainRpc::new());
        let sponsor_kp = Keypair::new();
        let sponsor = sponsor_kp.pubkey();
        let wallet = Arc::new(SponsorWallet::from_keypair(sponsor_kp));
        let oracle = oracle_with_price(150.0);
        let cfg = crate::config::Config::default();
        let builder = Arc::new(TransactionBuilder::new(
            chain.clone() as Arc<dyn ChainRpc>,
            wallet,
            Pubkey::new_unique(),
        ));
        let calculator = Arc::new(FeeCalculator::new(oracle.clone(), cfg.fees.clone()));
        let registry = Arc::new(ProviderRegistry::new(Duration::from_millis(500)));
        let provider = Arc::new(MockBridgeProvider::new("mock"));
        registry.register(provider.clone());
        let repo = Arc::new(MemorySwapStore::new());

        let orchestrator = SwapOrchestrator::new(
            registry,
            calculator,
            builder,
            chain.clone() as Arc<dyn ChainRpc>,
            repo.clone() as Arc<dyn SwapRepository>,
            oracle,
            SwapConfig {
                monitor_interval_secs: 1,
                monitor_max_attempts: 30,
                ..SwapConfig::default()
            },
            cfg.fees,
            0,
        );

        Harness {
            orchestrator,
            provider,
            chain,
            sponsor,
            repo,
        }
    }

    fn signed_b64(_h: &Harness, prepare: &PrepareResponse) -> String {
        // The user would sign here; for tests the sponsor-partial bytes are
        // already a structurally valid submission payload
        prepare.transaction_base64.clone()
    }

    #[tokio::test]
    async fn test_prepare_then_execute_exactly_once() {
        let h = harness();
        let user = Pubkey::new_unique();
        let params = test_params(user);
        let quote = test_quote("mock", "995000");
        h.provider.set_quote(quote.clone());

        let prepared = h
            .orchestrator
            .prepare_swap(&params, &quote, FeeToken::Usdc)
            .await
            .expect("prepare");
        assert!(prepared.fee.is_some());
        assert_eq!(h.orchestrator.pending_count(), 1);

        let signed = signed_b64(&h, &prepared);
        let swap = h
            .orchestrator
            .execute_swap(&prepared.swap_id, &signed)
            .await
            .expect("execute");
        assert_eq!(swap.status, SwapStatus::Submitted);
        assert!(swap.source_signature.is_some());
        assert_eq!(h.orchestrator.pending_count(), 0);

        // Second execution of the same id: not-found, the expected outcome
        let err = h
            .orchestrator
            .execute_swap(&prepared.swap_id, &signed)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");

        h.orchestrator.shutdown();
    }

    #[tokio::test]
    async fn test_prepare_sponsored_transaction_shape() {
        let h = harness();
        let user = Pubkey::new_unique();
        let params = test_params(user);
        let quote = test_quote("mock", "995000");
        h.provider.set_quote(quote.clone());

        let prepared = h
            .orchestrator
            .prepare_swap(&params, &quote, FeeToken::Usdc)
            .await
            .expect("prepare");

        let bytes = TransactionBuilder::decode_base64(&prepared.transaction_base64).unwrap();
        // Sponsored bytes satisfy the no-fund-leak invariants
        validate_no_fund_leak(&bytes, Some(&h.sponsor)).expect("sponsored shape");

        let tx = TransactionBuilder::deserialize(&bytes).unwrap();
        assert_eq!(crate::compat::static_account_keys(&tx.message)[0], h.sponsor);
    }

    #[tokio::test]
    async fn test_prepare_rejects_excessive_drift() {
        let h = harness();
        let user = Pubkey::new_unique();
        let params = test_params(user);
        let quote = test_quote("mock", "1000");
        h.provider.set_quote(quote.clone());

        // 3% drift against a 2% threshold
        h.provider.set_requote_amount("970");
        let err = h
            .orchestrator
            .prepare_swap(&params, &quote, FeeToken::Usdc)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "quote_drift");

        // 1.5% drift is accepted
        h.provider.set_requote_amount("985");
        h.orchestrator
            .prepare_swap(&params, &quote, FeeToken::Usdc)
            .await
            .expect("1.5% drift accepted");
    }

    #[tokio::test]
    async fn test_prepare_rejects_expired_quote() {
        let h = harness();
        let user = Pubkey::new_unique();
        let params = test_params(user);
        let mut quote = test_quote("mock", "995000");
        quote.valid_until = Utc::now() - ChronoDuration::seconds(1);
        h.provider.set_quote(quote.clone());

        let err = h
            .orchestrator
            .prepare_swap(&params, &quote, FeeToken::Usdc)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "quote_expired");
    }

    #[tokio::test]
    async fn test_prepare_native_path_keeps_user_payer() {
        let h = harness();
        let user = Pubkey::new_unique();
        let params = test_params(user);
        let quote = test_quote("mock", "995000");
        h.provider.set_quote(quote.clone());

        let prepared = h
            .orchestrator
            .prepare_swap(&params, &quote, FeeToken::Sol)
            .await
            .expect("prepare");
        assert!(prepared.fee.is_none());

        let bytes = TransactionBuilder::decode_base64(&prepared.transaction_base64).unwrap();
        let tx = TransactionBuilder::deserialize(&bytes).unwrap();
        // Untouched provider payer; only the recency token changed
        assert_eq!(crate::compat::static_account_keys(&tx.message)[0], user);
    }

    #[tokio::test]
    async fn test_execute_blocks_tampered_transaction() {
        let h = harness();
        let user = Pubkey::new_unique();
        let params = test_params(user);
        let quote = test_quote("mock", "995000");
        h.provider.set_quote(quote.clone());

        let prepared = h
            .orchestrator
            .prepare_swap(&params, &quote, FeeToken::Usdc)
            .await
            .expect("prepare");

        // A "signed" payload that swapped the payer away from the sponsor
        let tampered = provider_tx_base64(&user);
        let err = h
            .orchestrator
            .execute_swap(&prepared.swap_id, &tampered)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "transaction_validation");

        // Nothing was persisted for the blocked execution
        assert!(h.repo.find_by_id(&prepared.swap_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_execute_send_failure_persists_failed_status() {
        let h = harness();
        let user = Pubkey::new_unique();
        let params = test_params(user);
        let quote = test_quote("mock", "995000");
        h.provider.set_quote(quote.clone());

        let prepared = h
            .orchestrator
            .prepare_swap(&params, &quote, FeeToken::Usdc)
            .await
            .expect("prepare");

        h.chain.fail_sends("blockhash not found");
        let signed = signed_b64(&h, &prepared);
        let err = h
            .orchestrator
            .execute_swap(&prepared.swap_id, &signed)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "rpc_error");

        let swap = h.repo.find_by_id(&prepared.swap_id).await.unwrap().unwrap();
        assert_eq!(swap.status, SwapStatus::Failed);
        assert!(swap.error.is_some());
    }

    #[tokio::test]
    async fn test_get_status_falls_back_to_provider_without_monitor() {
        let h = harness();
        let user = Pubkey::new_unique();
        let params = test_params(user);
        let quote = test_quote("mock", "995000");
        h.provider.set_quote(quote.clone());

        let prepared = h
            .orchestrator
            .prepare_swap(&params, &quote, FeeToken::Usdc)
            .await
            .expect("prepare");
        let signed = signed_b64(&h, &prepared);
        h.orchestrator
            .execute_swap(&prepared.swap_id, &signed)
            .await
            .expect("execute");

        // Simulate a restart: monitor gone, provider has moved on
        assert!(h.orchestrator.stop_monitoring(&prepared.swap_id));
        h.provider.hold_status(BridgingState::Bridging);

        let swap = h.orchestrator.get_status(&prepared.swap_id).await.unwrap();
        assert_eq!(swap.status, SwapStatus::Bridging);

        // Stopping again is a no-op
        assert!(!h.orchestrator.stop_monitoring(&prepared.swap_id));
    }

    #[tokio::test]
    async fn test_expired_pending_entry_is_not_executable() {
        let h = harness();
        let user = Pubkey::new_unique();
        let quote = test_quote("mock", "995000");
        let prepared = PreparedSwap {
            swap_id: "stale".to_string(),
            transaction: vec![0u8; 8],
            fee: None,
            sponsor_cost: CostBreakdown::default(),
            quote,
            params: test_params(user),
            provider_order_id: "order".to_string(),
            expires_at: Utc::now() - ChronoDuration::seconds(5),
        };
        h.orchestrator.inject_prepared(prepared);

        let err = h
            .orchestrator
            .execute_swap("stale", "AAAA")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert_eq!(h.orchestrator.pending_count(), 0);
    }
}
