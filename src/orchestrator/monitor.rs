//! Asynchronous swap status monitoring
//!
//! Each submitted swap gets at most one polling task: a cancellable loop
//! with a bounded attempt budget and fixed interval that queries the
//! provider's status endpoint and advances the durable record. The task
//! stops itself on a terminal status, on exhausting its budget, or on
//! external cancellation, and removes itself from the orchestrator's
//! monitor set on the way out.

use crate::metrics::metrics;
use crate::providers::BridgeProvider;
use crate::storage::{StatusUpdate, SwapRepository};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Handle to a live monitoring task
pub struct MonitorHandle {
    cancel: watch::Sender<bool>,
}

impl MonitorHandle {
    /// Signal the task to stop; it exits at its next loop turn
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Spawn the monitoring loop for one swap. The caller must have inserted a
/// placeholder guard beforehand if it needs at-most-one semantics; this
/// function inserts the returned handle into `monitors` itself.
pub fn spawn_monitor(
    swap_id: String,
    order_id: String,
    provider: Arc<dyn BridgeProvider>,
    repo: Arc<dyn SwapRepository>,
    monitors: Arc<DashMap<String, MonitorHandle>>,
    config: MonitorConfig,
) {
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    // Register before spawning so the task's self-removal can never race
    // ahead of the insertion
    monitors.insert(swap_id.clone(), MonitorHandle { cancel: cancel_tx });
    metrics().active_monitors.set(monitors.len() as i64);

    let monitors_for_task = Arc::clone(&monitors);
    let id_for_task = swap_id;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut attempts: u32 = 0;
        let mut last_status = None;

        loop {
            tokio::select! {
                changed = cancel_rx.changed() => {
                    if changed.is_err() || *cancel_rx.borrow() {
                        info!(swap_id = %id_for_task, "Monitor cancelled");
                        break;
                    }
                }
                _ = interval.tick() => {
                    attempts += 1;
                    metrics().monitor_polls.inc();

                    match provider.get_status(&order_id).await {
                        Ok(status) => {
                            let new_status = status.as_swap_status();
                            if last_status != Some(new_status) {
                                debug!(
                                    swap_id = %id_for_task,
                                    status = ?new_status,
                                    "Monitor advancing swap status"
                                );
                                let update = StatusUpdate {
                                    source_signature: status.source_tx.clone(),
                                    destination_tx: status.destination_tx.clone(),
                                    error: status.error.clone(),
                                };
                                if let Err(err) =
                                    repo.update_status(&id_for_task, new_status, update).await
                                {
                                    warn!(swap_id = %id_for_task, error = %err, "Monitor status write failed");
                                }
                                last_status = Some(new_status);
                            }

                            if new_status.is_terminal() {
                                match new_status {
                                    crate::types::SwapStatus::Completed => {
                                        metrics().swaps_completed.inc()
                                    }
                                    _ => metrics().swaps_failed.inc(),
                                }
                                info!(swap_id = %id_for_task, status = ?new_status, "Monitor finished");
                                break;
                            }
                        }
                        Err(err) => {
                            // Provider call already retried internally; log
                            // and spend the attempt
                            warn!(swap_id = %id_for_task, error = %err, "Monitor status poll failed");
                        }
                    }

                    if attempts >= config.max_attempts {
                        warn!(
                            swap_id = %id_for_task,
                            attempts,
                            "Monitor attempt budget exhausted"
                        );
                        break;
                    }
                }
            }
        }

        monitors_for_task.remove(&id_for_task);
        metrics().active_monitors.set(monitors_for_task.len() as i64);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemorySwapStore, NewSwap};
    use crate::test_utils::MockBridgeProvider;
    use crate::types::{BridgingState, SwapStatus};

    fn new_swap() -> NewSwap {
        NewSwap {
            user_wallet: "alice".to_string(),
            source_token: "mint".to_string(),
            source_amount: "1000".to_string(),
            destination_chain: "ethereum".to_string(),
            destination_token: "0xtoken".to_string(),
            destination_wallet: "0xwallet".to_string(),
            provider: "mock".to_string(),
            provider_order_id: "order-1".to_string(),
            fee: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_advances_to_completed_and_stops() {
        let repo = Arc::new(MemorySwapStore::new());
        repo.create(new_swap(), SwapStatus::Submitted, "swap-1")
            .await
            .unwrap();

        let provider = Arc::new(MockBridgeProvider::new("mock"));
        provider.push_status(BridgingState::Processing);
        provider.push_status(BridgingState::Bridging);
        provider.push_status(BridgingState::Completed);

        let monitors: Arc<DashMap<String, MonitorHandle>> = Arc::new(DashMap::new());
        spawn_monitor(
            "swap-1".to_string(),
            "order-1".to_string(),
            provider,
            Arc::clone(&repo) as Arc<dyn SwapRepository>,
            Arc::clone(&monitors),
            MonitorConfig {
                interval: Duration::from_secs(1),
                max_attempts: 10,
            },
        );

        // Let the loop run its polls under the paused clock
        for _ in 0..6 {
            tokio::time::advance(Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }
        // Give the final repo write a chance to land
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let swap = repo.find_by_id("swap-1").await.unwrap().unwrap();
        assert_eq!(swap.status, SwapStatus::Completed);
        assert!(monitors.is_empty(), "monitor must deregister itself");
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_cancellation_is_isolated() {
        let repo = Arc::new(MemorySwapStore::new());
        repo.create(new_swap(), SwapStatus::Submitted, "swap-a")
            .await
            .unwrap();
        repo.create(new_swap(), SwapStatus::Submitted, "swap-b")
            .await
            .unwrap();

        let provider_a = Arc::new(MockBridgeProvider::new("mock"));
        let provider_b = Arc::new(MockBridgeProvider::new("mock"));
        // Both stay in processing forever
        provider_a.hold_status(BridgingState::Processing);
        provider_b.hold_status(BridgingState::Processing);

        let monitors: Arc<DashMap<String, MonitorHandle>> = Arc::new(DashMap::new());
        let config = MonitorConfig {
            interval: Duration::from_secs(1),
            max_attempts: 1_000,
        };
        spawn_monitor(
            "swap-a".to_string(),
            "order-a".to_string(),
            provider_a,
            Arc::clone(&repo) as Arc<dyn SwapRepository>,
            Arc::clone(&monitors),
            config,
        );
        spawn_monitor(
            "swap-b".to_string(),
            "order-b".to_string(),
            provider_b,
            Arc::clone(&repo) as Arc<dyn SwapRepository>,
            Arc::clone(&monitors),
            config,
        );
        assert_eq!(monitors.len(), 2);

        // Cancel only swap-a
        monitors.get("swap-a").unwrap().cancel();
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }

        assert!(monitors.get("swap-a").is_none());
        assert!(monitors.get("swap-b").is_some(), "other monitor unaffected");

        // Clean up the second task
        monitors.get("swap-b").unwrap().cancel();
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }
        assert!(monitors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_attempt_budget() {
        let repo = Arc::new(MemorySwapStore::new());
        repo.create(new_swap(), SwapStatus::Submitted, "swap-1")
            .await
            .unwrap();

        let provider = Arc::new(MockBridgeProvider::new("mock"));
        provider.hold_status(BridgingState::Processing);

        let monitors: Arc<DashMap<String, MonitorHandle>> = Arc::new(DashMap::new());
        spawn_monitor(
            "swap-1".to_string(),
            "order-1".to_string(),
            provider,
            Arc::clone(&repo) as Arc<dyn SwapRepository>,
            Arc::clone(&monitors),
            MonitorConfig {
                interval: Duration::from_secs(1),
                max_attempts: 3,
            },
        );

        for _ in 0..8 {
            tokio::time::advance(Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }

        assert!(monitors.is_empty(), "monitor must stop after its budget");
        // Status remains non-terminal; a later get_status falls back to a
        // one-shot provider fetch
        let swap = repo.find_by_id("swap-1").await.unwrap().unwrap();
        assert_eq!(swap.status, SwapStatus::Processing);
    }
}
