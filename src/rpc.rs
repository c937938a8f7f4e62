//! Chain RPC facade
//!
//! The engine consumes the chain through the `ChainRpc` contract: balance,
//! blockhash, account data, simulate, send: typed results or errors, nothing
//! else. `RpcFacade` is the production implementation: a thin round-robin
//! pool over nonblocking `RpcClient`s where every call runs behind the retry
//! policy and a `rpc:<method>` circuit breaker with a per-call timeout.

use crate::error::SwapError;
use crate::resilience::{retry_async, BreakerRegistry, RetryPolicy};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::{
    account::Account, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of a transaction dry-run
#[derive(Debug, Clone, Default)]
pub struct SimulationResult {
    pub err: Option<TransactionError>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

/// Black-box chain access consumed by the engine
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Lamport balance of an account
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, SwapError>;

    /// Latest blockhash for transaction recency
    async fn get_latest_blockhash(&self) -> Result<Hash, SwapError>;

    /// Full account fetch (oracle feeds, lookup tables)
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Account, SwapError>;

    /// Dry-run a transaction without signature verification
    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<SimulationResult, SwapError>;

    /// Submit a fully-signed transaction
    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, SwapError>;
}

/// Round-robin RPC endpoint pool with retry and breaker discipline
pub struct RpcFacade {
    clients: Vec<Arc<RpcClient>>,
    cursor: AtomicUsize,
    retry: RetryPolicy,
    breakers: Arc<BreakerRegistry>,
    call_timeout: Duration,
}

impl RpcFacade {
    pub fn new(
        endpoints: &[String],
        retry: RetryPolicy,
        breakers: Arc<BreakerRegistry>,
        call_timeout: Duration,
    ) -> Result<Self, SwapError> {
        if endpoints.is_empty() {
            return Err(SwapError::Configuration(
                "at least one RPC endpoint is required".to_string(),
            ));
        }
        let clients = endpoints
            .iter()
            .map(|url| Arc::new(RpcClient::new(url.clone())))
            .collect();
        Ok(Self {
            clients,
            cursor: AtomicUsize::new(0),
            retry,
            breakers,
            call_timeout,
        })
    }

    /// Pick the next client in rotation
    fn next_client(&self) -> Arc<RpcClient> {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        Arc::clone(&self.clients[idx])
    }

    /// Run one RPC call with timeout, mapped into the engine error taxonomy
    async fn call<T, F, Fut>(&self, method: &'static str, f: F) -> Result<T, SwapError>
    where
        F: Fn(Arc<RpcClient>) -> Fut,
        Fut: Future<Output = Result<T, solana_client::client_error::ClientError>>,
    {
        let breaker = self.breakers.breaker(&format!("rpc:{}", method));
        let call_timeout = self.call_timeout;
        retry_async(&self.retry, Some(&breaker), method, || {
            let client = self.next_client();
            let fut = f(client);
            async move {
                match tokio::time::timeout(call_timeout, fut).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(SwapError::Rpc(err.to_string())),
                    Err(_) => Err(SwapError::Rpc(format!(
                        "{} timed out after {}ms",
                        method,
                        call_timeout.as_millis()
                    ))),
                }
            }
        })
        .await
    }

    pub fn endpoint_count(&self) -> usize {
        self.clients.len()
    }
}

#[async_trait]
impl ChainRpc for RpcFacade {
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, SwapError> {
        self.call("get_balance", |client| {
            let pubkey = *pubkey;
            async move { client.get_balance(&pubkey).await }
        })
        .await
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, SwapError> {
        self.call("get_latest_blockhash", |client| async move {
            client.get_latest_blockhash().await
        })
        .await
    }

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Account, SwapError> {
        self.call("get_account", |client| {
            let pubkey = *pubkey;
            async move { client.get_account(&pubkey).await }
        })
        .await
    }

    /// `replace_recent_blockhash` is set so partially-signed transactions
    /// simulate cleanly before the user signature arrives
    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<SimulationResult, SwapError> {
        let result = self
            .call("simulate_transaction", |client| {
                let tx = tx.clone();
                async move {
                    client
                        .simulate_transaction_with_config(
                            &tx,
                            RpcSimulateTransactionConfig {
                                sig_verify: false,
                                replace_recent_blockhash: true,
                                ..Default::default()
                            },
                        )
                        .await
                }
            })
            .await?;
        Ok(SimulationResult {
            err: result.value.err,
            logs: result.value.logs.unwrap_or_default(),
            units_consumed: result.value.units_consumed,
        })
    }

    /// Preflight is skipped: the engine runs its own simulation at prepare
    /// time and the no-fund-leak validation immediately before this call
    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, SwapError> {
        debug!(signatures = tx.signatures.len(), "Submitting transaction");
        self.call("send_transaction", |client| {
            let tx = tx.clone();
            async move {
                client
                    .send_transaction_with_config(
                        &tx,
                        RpcSendTransactionConfig {
                            skip_preflight: true,
                            ..Default::default()
                        },
                    )
                    .await
            }
        })
        .await
    }
}
