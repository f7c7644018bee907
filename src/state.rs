use crate::collectors::batch::BatchReport;
use crate::collectors::SystemSnapshot;
use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct State {
    pub started_at_unix: i64,
    pub last_collect_timestamp_ms: i64,
    pub system: SystemSnapshot,
    pub network: NetworkRates,
    pub apps: BatchReport,
    pub collect_cycles: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskStat {
    pub mount: String,
    pub used_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetStat {
    pub iface: String,
    pub rx_bytes_total: u64,
    pub tx_bytes_total: u64,
    pub rx_bytes_since_refresh: u64,
    pub tx_bytes_since_refresh: u64,
}

/// Host-wide network counters as read from the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetCounters {
    pub rx_bytes_total: u64,
    pub tx_bytes_total: u64,
    pub rx_provider_rate: Option<f64>,
    pub tx_provider_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkRates {
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
    pub sampled_at_ms: i64,
}

impl State {
    pub fn new(now_unix: i64) -> Self {
        Self {
            started_at_unix: now_unix,
            ..Self::default()
        }
    }

    pub fn update_collected(
        &mut self,
        now_ms: i64,
        system: SystemSnapshot,
        network: NetworkRates,
        apps: BatchReport,
    ) {
        self.last_collect_timestamp_ms = now_ms;
        self.system = system;
        self.network = network;
        self.apps = apps;
        self.collect_cycles = self.collect_cycles.saturating_add(1);
    }

    pub fn memory_usage_percent(&self) -> f64 {
        percent(self.system.memory_used_bytes, self.system.memory_total_bytes)
    }

    pub fn disk_usage_percent(&self) -> f64 {
        self.system
            .disk
            .as_ref()
            .map(|d| percent(d.used_bytes, d.total_bytes))
            .unwrap_or(0.0)
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total > 0 {
        (used as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::probe::ProbeResult;

    #[test]
    fn update_collected_replaces_readings() {
        let mut state = State::new(100);
        let system = SystemSnapshot {
            memory_used_bytes: 512,
            memory_total_bytes: 2048,
            disk: Some(DiskStat {
                mount: "/".to_string(),
                used_bytes: 30,
                total_bytes: 120,
            }),
            ..SystemSnapshot::default()
        };
        let network = NetworkRates {
            rx_bytes_per_sec: 10.0,
            tx_bytes_per_sec: 5.0,
            sampled_at_ms: 100_000,
        };
        let apps = BatchReport {
            results: vec![ProbeResult::online("http://a", 3)],
            timestamp: 100_000,
        };

        state.update_collected(100_500, system, network.clone(), apps);

        assert_eq!(state.started_at_unix, 100);
        assert_eq!(state.last_collect_timestamp_ms, 100_500);
        assert_eq!(state.network, network);
        assert_eq!(state.apps.results.len(), 1);
        assert_eq!(state.collect_cycles, 1);
        assert_eq!(state.memory_usage_percent(), 25.0);
        assert_eq!(state.disk_usage_percent(), 25.0);
    }

    #[test]
    fn missing_readings_report_zero_usage() {
        let state = State::new(0);
        assert_eq!(state.memory_usage_percent(), 0.0);
        assert_eq!(state.disk_usage_percent(), 0.0);
    }
}
