pub mod batch;
pub mod probe;
pub mod system;

use crate::metrics::Metrics;
use crate::rate::{RateSampler, NET_RX, NET_TX};
use crate::registry::{write_back, AppRegistry};
use crate::state::{DiskStat, NetCounters, NetworkRates, State};
use batch::probe_batch;
use probe::{Prober, Transport};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemSnapshot {
    pub host_name: Option<String>,
    pub uptime_seconds: u64,
    pub cpu_usage_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub disk: Option<DiskStat>,
    pub net: NetCounters,
    pub temperature_supported: bool,
    pub collected_at_ms: i64,
}

pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// One poll cycle over an already collected host snapshot.
///
/// Derives network rates from `sampler`, probes every registry app as one
/// batch, writes statuses back and publishes the result to `state` and
/// `metrics`. Returns the published state.
pub async fn run_cycle<T: Transport>(
    system: SystemSnapshot,
    sampler: &RateSampler,
    prober: &Prober<T>,
    registry: &dyn AppRegistry,
    metrics: &Metrics,
    state: &RwLock<State>,
) -> State {
    let sampled_at_ms = system.collected_at_ms;
    let network = NetworkRates {
        rx_bytes_per_sec: sampler.sample(
            NET_RX,
            system.net.rx_bytes_total,
            sampled_at_ms,
            system.net.rx_provider_rate,
        ),
        tx_bytes_per_sec: sampler.sample(
            NET_TX,
            system.net.tx_bytes_total,
            sampled_at_ms,
            system.net.tx_provider_rate,
        ),
        sampled_at_ms,
    };

    let apps = registry.list();
    let urls: Vec<String> = apps.iter().map(|a| a.url.clone()).collect();
    let report = probe_batch(prober, &urls).await;

    let now_ms = now_unix_ms();
    let written = write_back(registry, &apps, &report.results, now_ms / 1000);
    if written < apps.iter().filter(|a| !a.url.trim().is_empty()).count() {
        metrics.inc_collect_error("registry");
    }
    metrics.record_app_batch(&apps, &report);

    let snapshot = {
        let mut guard = state.write().await;
        guard.update_collected(now_ms, system, network, report);
        guard.clone()
    };
    metrics.update_from_state(&snapshot);
    snapshot
}
