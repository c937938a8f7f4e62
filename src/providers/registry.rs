//! Provider registry: concurrent quote aggregation and deterministic ranking
//!
//! The registry probes every registered provider's route support
//! concurrently, fetches quotes from all eligible providers concurrently,
//! records per-provider outcomes (a slow or failed provider never blocks the
//! others), and ranks the results. The round fails only when zero providers
//! return a quote.

use crate::error::SwapError;
use crate::providers::BridgeProvider;
use crate::types::{AggregatedQuotes, BridgeQuote, ProviderOutcome, QuoteParams};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Weight of the normalized net-amount score in the recommendation
const NET_WEIGHT: f64 = 0.7;
/// Weight of the normalized speed score in the recommendation
const SPEED_WEIGHT: f64 = 0.3;

pub struct ProviderRegistry {
    /// Providers in registration order; duplicate registration overwrites in
    /// place so ranking tie-breaks stay deterministic
    providers: RwLock<Vec<(String, Arc<dyn BridgeProvider>)>>,

    /// Per-call timeout applied to probes and quote fetches
    call_timeout: Duration,
}

impl ProviderRegistry {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
            call_timeout,
        }
    }

    /// Register a provider; a duplicate name overwrites but keeps its
    /// original registration slot
    pub fn register(&self, provider: Arc<dyn BridgeProvider>) {
        let name = provider.name().to_string();
        let mut providers = self.providers.write();
        if let Some(slot) = providers.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = provider;
            info!(provider = %name, "Provider re-registered");
        } else {
            providers.push((name.clone(), provider));
            info!(provider = %name, "Provider registered");
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut providers = self.providers.write();
        let before = providers.len();
        providers.retain(|(n, _)| n != name);
        before != providers.len()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BridgeProvider>> {
        self.providers
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| Arc::clone(p))
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.read().iter().map(|(n, _)| n.clone()).collect()
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn BridgeProvider>)> {
        self.providers
            .read()
            .iter()
            .map(|(n, p)| (n.clone(), Arc::clone(p)))
            .collect()
    }

    /// Query all eligible providers concurrently and rank the results
    pub async fn aggregate_quotes(
        &self,
        params: &QuoteParams,
    ) -> Result<AggregatedQuotes, SwapError> {
        let providers = self.snapshot();
        if providers.is_empty() {
            return Err(SwapError::Configuration(
                "no bridge providers registered".to_string(),
            ));
        }

        // Route-support probes run concurrently; a probe error keeps the
        // provider optimistically eligible; it may still reject at get_quote
        let probes = join_all(providers.iter().map(|(name, provider)| {
            let provider = Arc::clone(provider);
            let params = params.clone();
            let timeout = self.call_timeout;
            async move {
                match tokio::time::timeout(timeout, provider.supports_route(&params)).await {
                    Ok(Ok(supported)) => Some(supported),
                    Ok(Err(err)) => {
                        debug!(provider = %name, error = %err, "Route probe failed, including optimistically");
                        None
                    }
                    Err(_) => {
                        debug!(provider = %name, "Route probe timed out, including optimistically");
                        None
                    }
                }
            }
        }))
        .await;

        let mut outcomes: Vec<(String, ProviderOutcome)> = Vec::with_capacity(providers.len());
        let mut eligible: Vec<(String, Arc<dyn BridgeProvider>)> = Vec::new();
        for ((name, provider), probe) in providers.iter().zip(probes) {
            if probe == Some(false) {
                outcomes.push((name.clone(), ProviderOutcome::NoRoute));
            } else {
                eligible.push((name.clone(), Arc::clone(provider)));
            }
        }

        let fetches = join_all(eligible.iter().map(|(name, provider)| {
            let provider = Arc::clone(provider);
            let params = params.clone();
            let timeout = self.call_timeout;
            let name = name.clone();
            async move {
                match tokio::time::timeout(timeout, provider.get_quote(&params)).await {
                    Ok(Ok(quote)) => Ok(quote),
                    Ok(Err(err)) => {
                        warn!(provider = %name, error = %err, "Quote fetch failed");
                        Err(err.to_string())
                    }
                    Err(_) => {
                        warn!(provider = %name, "Quote fetch timed out");
                        Err(format!("timed out after {}ms", timeout.as_millis()))
                    }
                }
            }
        }))
        .await;

        let order: HashMap<String, usize> = providers
            .iter()
            .enumerate()
            .map(|(i, (n, _))| (n.clone(), i))
            .collect();

        let mut quotes = Vec::new();
        for ((name, _), fetched) in eligible.into_iter().zip(fetches) {
            match fetched {
                Ok(quote) => {
                    outcomes.push((
                        name,
                        ProviderOutcome::Success {
                            quote_id: quote.quote_id.clone(),
                        },
                    ));
                    quotes.push(quote);
                }
                Err(message) => outcomes.push((name, ProviderOutcome::Error { message })),
            }
        }
        // Keep outcome ordering aligned with registration order
        outcomes.sort_by_key(|(name, _)| order.get(name).copied().unwrap_or(usize::MAX));

        if quotes.is_empty() {
            return Err(SwapError::provider(
                "registry",
                format!("no provider returned a quote ({} probed)", providers.len()),
            ));
        }

        rank_quotes(&mut quotes, &order);
        let recommended = recommend(&quotes);

        info!(
            quotes = quotes.len(),
            providers = providers.len(),
            best = %quotes[0].provider,
            recommended = %quotes[recommended].provider,
            "Quote aggregation completed"
        );

        Ok(AggregatedQuotes {
            quotes,
            best: 0,
            recommended,
            outcomes,
        })
    }
}

/// Order quotes descending by net amount, ties broken by provider
/// registration order. Deterministic for a given quote set.
pub fn rank_quotes(quotes: &mut [BridgeQuote], registration_order: &HashMap<String, usize>) {
    quotes.sort_by(|a, b| {
        b.net_amount()
            .partial_cmp(&a.net_amount())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let oa = registration_order.get(&a.provider).copied().unwrap_or(usize::MAX);
                let ob = registration_order.get(&b.provider).copied().unwrap_or(usize::MAX);
                oa.cmp(&ob)
            })
    });
}

/// Weighted recommendation over ranked quotes:
/// `0.7 × normalized net + 0.3 × normalized speed`, where speed is
/// `1 − duration/max_duration` among the candidates. Ties resolve to the
/// net-amount-best quote (the earliest ranked index).
pub fn recommend(ranked: &[BridgeQuote]) -> usize {
    if ranked.len() <= 1 {
        return 0;
    }

    let max_net = ranked
        .iter()
        .map(|q| q.net_amount())
        .fold(f64::MIN, f64::max);
    let max_duration = ranked
        .iter()
        .map(|q| q.estimated_seconds)
        .max()
        .unwrap_or(0);

    let mut best_idx = 0;
    let mut best_score = f64::MIN;
    for (idx, quote) in ranked.iter().enumerate() {
        let net_score = if max_net > 0.0 {
            quote.net_amount() / max_net
        } else {
            0.0
        };
        let speed_score = if max_duration > 0 {
            1.0 - quote.estimated_seconds as f64 / max_duration as f64
        } else {
            0.0
        };
        let score = NET_WEIGHT * net_score + SPEED_WEIGHT * speed_score;
        // Strict improvement only: equal scores keep the better-ranked quote
        if score > best_score {
            best_score = score;
            best_idx = idx;
        }
    }
    best_idx
}
