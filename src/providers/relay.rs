//! HTTP bridge provider
//!
//! Generic client for relay-style bridge APIs exposing quote, transaction
//! build, and order status endpoints over JSON. Idempotent calls run behind
//! the retry policy and an `api:<name>` circuit breaker; `build_transaction`
//! is deliberately single-shot because the provider mints a new order id on
//! every call.

use crate::config::ProviderConfig;
use crate::error::SwapError;
use crate::providers::{BridgeProvider, ProviderTransaction};
use crate::resilience::{retry_async, BreakerRegistry, RetryPolicy};
use crate::types::{
    BridgeQuote, BridgingState, CostBreakdown, ExecutionStatus, QuoteParams, TokenInfo,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct RouteCheckRequest<'a> {
    source_token: String,
    destination_chain: &'a str,
    destination_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RouteCheckResponse {
    supported: bool,
}

#[derive(Debug, Serialize)]
struct QuoteRequest<'a> {
    source_token: String,
    amount: String,
    destination_chain: &'a str,
    destination_token: &'a str,
    destination_wallet: &'a str,
    user_wallet: String,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    quote_id: String,
    source_amount: String,
    destination_amount: String,
    estimated_seconds: u64,
    valid_until: DateTime<Utc>,
    route: String,
    costs: CostsPayload,
    #[serde(default)]
    provider_data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CostsPayload {
    base_gas: u64,
    #[serde(default)]
    priority_fee: u64,
    #[serde(default)]
    bridge_fee: u64,
    #[serde(default)]
    transfer_fee: Option<u64>,
    #[serde(default)]
    rent: Option<u64>,
}

impl CostsPayload {
    fn into_breakdown(self) -> CostBreakdown {
        CostBreakdown::new(
            self.base_gas,
            self.priority_fee,
            self.bridge_fee,
            self.transfer_fee,
            self.rent,
        )
    }
}

#[derive(Debug, Deserialize)]
struct RequoteResponse {
    destination_amount: String,
}

#[derive(Debug, Serialize)]
struct BuildRequest<'a> {
    quote_id: &'a str,
    user_wallet: String,
    provider_data: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BuildResponse {
    order_id: String,
    transaction: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    source_tx: Option<String>,
    #[serde(default)]
    destination_tx: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenListResponse {
    tokens: Vec<TokenInfo>,
}

pub struct RelayBridgeProvider {
    cfg: ProviderConfig,
    http: Client,
    retry: RetryPolicy,
    breakers: Arc<BreakerRegistry>,
}

impl RelayBridgeProvider {
    pub fn new(
        cfg: ProviderConfig,
        retry: RetryPolicy,
        breakers: Arc<BreakerRegistry>,
    ) -> Result<Self, SwapError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| SwapError::Configuration(format!("http client: {}", e)))?;
        Ok(Self {
            cfg,
            http,
            retry,
            breakers,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    fn err(&self, message: impl Into<String>) -> SwapError {
        SwapError::provider(&self.cfg.name, message)
    }

    /// One POST round-trip with auth header and JSON decode
    async fn post_once<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, SwapError> {
        let mut req = self.http.post(self.url(path)).json(body);
        if let Some(key) = &self.cfg.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        let resp = req
            .send()
            .await
            .map_err(|e| self.err(format!("request error: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(self.err(format!("{} returned {}: {}", path, status, body)));
        }
        resp.json::<Resp>()
            .await
            .map_err(|e| self.err(format!("JSON parse error: {}", e)))
    }

    /// Retried POST for the idempotent endpoints
    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, SwapError> {
        let breaker = self.breakers.breaker(&format!("api:{}", self.cfg.name));
        retry_async(&self.retry, Some(&breaker), path, || {
            self.post_once::<Req, Resp>(path, body)
        })
        .await
    }

    /// One GET round-trip with auth header and JSON decode
    async fn get_once<Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<Resp, SwapError> {
        let mut req = self.http.get(self.url(path));
        if let Some(key) = &self.cfg.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        let resp = req
            .send()
            .await
            .map_err(|e| self.err(format!("request error: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(self.err(format!("{} returned {}", path, status)));
        }
        resp.json::<Resp>()
            .await
            .map_err(|e| self.err(format!("JSON parse error: {}", e)))
    }

    /// Retried GET for the idempotent endpoints
    async fn get<Resp: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<Resp, SwapError> {
        let breaker = self.breakers.breaker(&format!("api:{}", self.cfg.name));
        retry_async(&self.retry, Some(&breaker), path, || {
            self.get_once::<Resp>(path)
        })
        .await
    }
}

#[async_trait]
impl BridgeProvider for RelayBridgeProvider {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    async fn supports_route(&self, params: &QuoteParams) -> Result<bool, SwapError> {
        let resp: RouteCheckResponse = self
            .post(
                "v1/route/check",
                &RouteCheckRequest {
                    source_token: params.source_token.to_string(),
                    destination_chain: &params.destination_chain,
                    destination_token: &params.destination_token,
                },
            )
            .await?;
        Ok(resp.supported)
    }

    async fn get_quote(&self, params: &QuoteParams) -> Result<BridgeQuote, SwapError> {
        let resp: QuoteResponse = self
            .post(
                "v1/quote",
                &QuoteRequest {
                    source_token: params.source_token.to_string(),
                    amount: params.amount.to_string(),
                    destination_chain: &params.destination_chain,
                    destination_token: &params.destination_token,
                    destination_wallet: &params.destination_wallet,
                    user_wallet: params.user_wallet.to_string(),
                },
            )
            .await?;

        if resp.valid_until <= Utc::now() {
            return Err(self.err(format!("quote {} already expired on arrival", resp.quote_id)));
        }

        Ok(BridgeQuote {
            provider: self.cfg.name.clone(),
            quote_id: resp.quote_id,
            source_amount: resp.source_amount,
            destination_amount: resp.destination_amount,
            estimated_seconds: resp.estimated_seconds,
            valid_until: resp.valid_until,
            route: resp.route,
            costs: resp.costs.into_breakdown(),
            provider_data: resp.provider_data,
        })
    }

    async fn validate_quote(&self, quote: &BridgeQuote) -> Result<String, SwapError> {
        let resp: RequoteResponse = self
            .post(
                "v1/quote/validate",
                &serde_json::json!({ "quote_id": quote.quote_id }),
            )
            .await?;
        Ok(resp.destination_amount)
    }

    async fn build_transaction(
        &self,
        quote: &BridgeQuote,
        user_wallet: &Pubkey,
    ) -> Result<ProviderTransaction, SwapError> {
        // Single attempt: the provider mints a fresh order id per call, so a
        // blind retry could strand a live order
        let resp: BuildResponse = self
            .post_once(
                "v1/transaction",
                &BuildRequest {
                    quote_id: &quote.quote_id,
                    user_wallet: user_wallet.to_string(),
                    provider_data: &quote.provider_data,
                },
            )
            .await?;
        Ok(ProviderTransaction {
            order_id: resp.order_id,
            transaction_base64: resp.transaction,
        })
    }

    async fn get_status(&self, order_id: &str) -> Result<ExecutionStatus, SwapError> {
        let resp: StatusResponse = self.get(&format!("v1/status/{}", order_id)).await?;
        let state = match resp.status.as_str() {
            "pending" => BridgingState::Pending,
            "processing" => BridgingState::Processing,
            "bridging" => BridgingState::Bridging,
            "completed" => BridgingState::Completed,
            "failed" => BridgingState::Failed,
            other => {
                return Err(self.err(format!("unknown status '{}' for order {}", other, order_id)))
            }
        };
        Ok(ExecutionStatus {
            state,
            source_tx: resp.source_tx,
            destination_tx: resp.destination_tx,
            error: resp.error,
        })
    }

    async fn estimate_costs(&self, quote: &BridgeQuote) -> Result<CostBreakdown, SwapError> {
        let resp: CostsPayload = self
            .post(
                "v1/costs",
                &serde_json::json!({ "quote_id": quote.quote_id }),
            )
            .await?;
        Ok(resp.into_breakdown())
    }

    async fn fetch_token_list(&self) -> Result<Vec<TokenInfo>, SwapError> {
        let resp: TokenListResponse = self.get("v1/tokens").await?;
        Ok(resp.tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> RelayBridgeProvider {
        RelayBridgeProvider::new(
            ProviderConfig {
                name: "relaybridge".to_string(),
                base_url: "https://api.relaybridge.example/".to_string(),
                api_key: None,
                timeout_ms: 1_000,
            },
            RetryPolicy::default(),
            Arc::new(BreakerRegistry::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_url_join_strips_trailing_slash() {
        let p = provider();
        assert_eq!(
            p.url("v1/quote"),
            "https://api.relaybridge.example/v1/quote"
        );
    }

    #[test]
    fn test_costs_payload_derives_total() {
        let payload = CostsPayload {
            base_gas: 5_000,
            priority_fee: 10_000,
            bridge_fee: 2_000,
            transfer_fee: None,
            rent: Some(2_039_280),
        };
        let costs = payload.into_breakdown();
        assert_eq!(costs.total_sponsor_cost, 5_000 + 10_000 + 2_000 + 2_039_280);
    }

    #[test]
    fn test_status_payload_deserializes_minimal() {
        let resp: StatusResponse =
            serde_json::from_str(r#"{"status": "bridging"}"#).expect("parse");
        assert_eq!(resp.status, "bridging");
        assert!(resp.source_tx.is_none());
        assert!(resp.error.is_none());
    }
}
