//! Metrics collection and export module

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub quotes_requested: IntCounter,
    pub quotes_failed: IntCounter,
    pub swaps_prepared: IntCounter,
    pub swaps_executed: IntCounter,
    pub swaps_completed: IntCounter,
    pub swaps_failed: IntCounter,
    pub fund_leaks_blocked: IntCounter,
    pub monitor_polls: IntCounter,

    // Gauges
    pub pending_swaps: IntGauge,
    pub active_monitors: IntGauge,

    // Histograms
    pub quote_latency: Histogram,
    pub prepare_latency: Histogram,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let quotes_requested = IntCounter::with_opts(Opts::new(
            "quotes_requested",
            "Quote aggregation rounds requested",
        ))?;
        let quotes_failed = IntCounter::with_opts(Opts::new(
            "quotes_failed",
            "Aggregation rounds with zero quotes",
        ))?;
        let swaps_prepared =
            IntCounter::with_opts(Opts::new("swaps_prepared", "Swaps prepared for signing"))?;
        let swaps_executed =
            IntCounter::with_opts(Opts::new("swaps_executed", "Signed swaps submitted"))?;
        let swaps_completed =
            IntCounter::with_opts(Opts::new("swaps_completed", "Swaps bridged to completion"))?;
        let swaps_failed = IntCounter::with_opts(Opts::new("swaps_failed", "Swaps ending failed"))?;
        let fund_leaks_blocked = IntCounter::with_opts(Opts::new(
            "fund_leaks_blocked",
            "Transactions rejected by the no-fund-leak guard",
        ))?;
        let monitor_polls =
            IntCounter::with_opts(Opts::new("monitor_polls", "Status monitor poll iterations"))?;

        let pending_swaps = IntGauge::with_opts(Opts::new(
            "pending_swaps",
            "Prepared swaps awaiting signature",
        ))?;
        let active_monitors =
            IntGauge::with_opts(Opts::new("active_monitors", "Live monitoring tasks"))?;

        let quote_latency = Histogram::with_opts(HistogramOpts::new(
            "quote_latency_seconds",
            "Quote aggregation round latency",
        ))?;
        let prepare_latency = Histogram::with_opts(HistogramOpts::new(
            "prepare_latency_seconds",
            "Swap preparation latency",
        ))?;

        registry.register(Box::new(quotes_requested.clone()))?;
        registry.register(Box::new(quotes_failed.clone()))?;
        registry.register(Box::new(swaps_prepared.clone()))?;
        registry.register(Box::new(swaps_executed.clone()))?;
        registry.register(Box::new(swaps_completed.clone()))?;
        registry.register(Box::new(swaps_failed.clone()))?;
        registry.register(Box::new(fund_leaks_blocked.clone()))?;
        registry.register(Box::new(monitor_polls.clone()))?;
        registry.register(Box::new(pending_swaps.clone()))?;
        registry.register(Box::new(active_monitors.clone()))?;
        registry.register(Box::new(quote_latency.clone()))?;
        registry.register(Box::new(prepare_latency.clone()))?;

        Ok(Self {
            registry,
            quotes_requested,
            quotes_failed,
            swaps_prepared,
            swaps_executed,
            swaps_completed,
            swaps_failed,
            fund_leaks_blocked,
            monitor_polls,
            pending_swaps,
            active_monitors,
            quote_latency,
            prepare_latency,
        })
    }

    /// Encode the registry in Prometheus text exposition format
    pub fn encode(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}

/// Process-wide metrics instance, constructed on first access
pub fn metrics() -> &'static Metrics {
    static METRICS: Lazy<Metrics> = Lazy::new(|| Metrics::new().expect("metrics registry"));
    &METRICS
}
