use crate::collectors::batch::BatchReport;
use crate::collectors::now_unix_ms;
use crate::collectors::probe::{ProbeResult, ProbeStatus};
use crate::registry::App;
use crate::state::State;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub zamos_cpu_usage_percent: Gauge,
    pub zamos_memory_used_bytes: Gauge,
    pub zamos_memory_total_bytes: Gauge,
    pub zamos_memory_usage_percent: Gauge,
    pub zamos_disk_used_bytes: Gauge,
    pub zamos_disk_total_bytes: Gauge,
    pub zamos_disk_usage_percent: Gauge,
    pub zamos_net_rx_bytes_total: Gauge,
    pub zamos_net_tx_bytes_total: Gauge,
    pub zamos_net_rx_bytes_per_sec: Gauge,
    pub zamos_net_tx_bytes_per_sec: Gauge,
    pub zamos_host_uptime_seconds: Gauge,
    pub zamos_temperature_supported: Gauge,
    pub zamos_app_up: GaugeVec,
    pub zamos_app_response_time_ms: GaugeVec,
    pub zamos_apps_total: Gauge,
    pub zamos_apps_up: Gauge,
    pub zamos_probes_total: CounterVec,
    pub zamos_uptime_seconds: Gauge,
    pub zamos_scrape_count_total: Counter,
    pub zamos_collect_errors_total: CounterVec,
    pub zamos_last_collect_timestamp_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let zamos_cpu_usage_percent = Gauge::with_opts(opts!(
            "zamos_cpu_usage_percent",
            "Global CPU load in percent (0..100)"
        ))?;
        let zamos_memory_used_bytes =
            Gauge::with_opts(opts!("zamos_memory_used_bytes", "Used memory in bytes"))?;
        let zamos_memory_total_bytes =
            Gauge::with_opts(opts!("zamos_memory_total_bytes", "Total memory in bytes"))?;
        let zamos_memory_usage_percent = Gauge::with_opts(opts!(
            "zamos_memory_usage_percent",
            "Memory usage in percent"
        ))?;
        let zamos_disk_used_bytes = Gauge::with_opts(opts!(
            "zamos_disk_used_bytes",
            "Used bytes on the primary disk"
        ))?;
        let zamos_disk_total_bytes = Gauge::with_opts(opts!(
            "zamos_disk_total_bytes",
            "Size of the primary disk in bytes"
        ))?;
        let zamos_disk_usage_percent = Gauge::with_opts(opts!(
            "zamos_disk_usage_percent",
            "Primary disk usage in percent"
        ))?;
        let zamos_net_rx_bytes_total = Gauge::with_opts(opts!(
            "zamos_net_rx_bytes_total",
            "Cumulative received bytes across monitored interfaces"
        ))?;
        let zamos_net_tx_bytes_total = Gauge::with_opts(opts!(
            "zamos_net_tx_bytes_total",
            "Cumulative transmitted bytes across monitored interfaces"
        ))?;
        let zamos_net_rx_bytes_per_sec = Gauge::with_opts(opts!(
            "zamos_net_rx_bytes_per_sec",
            "Receive throughput in bytes per second"
        ))?;
        let zamos_net_tx_bytes_per_sec = Gauge::with_opts(opts!(
            "zamos_net_tx_bytes_per_sec",
            "Transmit throughput in bytes per second"
        ))?;
        let zamos_host_uptime_seconds = Gauge::with_opts(opts!(
            "zamos_host_uptime_seconds",
            "Host uptime in seconds"
        ))?;
        let zamos_temperature_supported = Gauge::with_opts(opts!(
            "zamos_temperature_supported",
            "1 if the host exposes temperature sensors, else 0"
        ))?;
        let zamos_app_up = GaugeVec::new(
            opts!("zamos_app_up", "1 if the app answered its last probe, else 0"),
            &["app", "url"],
        )?;
        let zamos_app_response_time_ms = GaugeVec::new(
            opts!(
                "zamos_app_response_time_ms",
                "Round trip of the last successful probe in milliseconds"
            ),
            &["app", "url"],
        )?;
        let zamos_apps_total =
            Gauge::with_opts(opts!("zamos_apps_total", "Number of registered apps"))?;
        let zamos_apps_up = Gauge::with_opts(opts!(
            "zamos_apps_up",
            "Number of apps online in the last poll"
        ))?;
        let zamos_probes_total = CounterVec::new(
            opts!("zamos_probes_total", "Probes issued, by outcome"),
            &["status"],
        )?;
        let zamos_uptime_seconds =
            Gauge::with_opts(opts!("zamos_uptime_seconds", "Daemon uptime in seconds"))?;
        let zamos_scrape_count_total = Counter::with_opts(opts!(
            "zamos_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;
        let zamos_collect_errors_total = CounterVec::new(
            opts!(
                "zamos_collect_errors_total",
                "Collection errors by collector"
            ),
            &["collector"],
        )?;
        let zamos_last_collect_timestamp_seconds = Gauge::with_opts(opts!(
            "zamos_last_collect_timestamp_seconds",
            "Unix timestamp of the last finished poll cycle"
        ))?;

        register(&registry, &zamos_cpu_usage_percent)?;
        register(&registry, &zamos_memory_used_bytes)?;
        register(&registry, &zamos_memory_total_bytes)?;
        register(&registry, &zamos_memory_usage_percent)?;
        register(&registry, &zamos_disk_used_bytes)?;
        register(&registry, &zamos_disk_total_bytes)?;
        register(&registry, &zamos_disk_usage_percent)?;
        register(&registry, &zamos_net_rx_bytes_total)?;
        register(&registry, &zamos_net_tx_bytes_total)?;
        register(&registry, &zamos_net_rx_bytes_per_sec)?;
        register(&registry, &zamos_net_tx_bytes_per_sec)?;
        register(&registry, &zamos_host_uptime_seconds)?;
        register(&registry, &zamos_temperature_supported)?;
        register(&registry, &zamos_app_up)?;
        register(&registry, &zamos_app_response_time_ms)?;
        register(&registry, &zamos_apps_total)?;
        register(&registry, &zamos_apps_up)?;
        register(&registry, &zamos_probes_total)?;
        register(&registry, &zamos_uptime_seconds)?;
        register(&registry, &zamos_scrape_count_total)?;
        register(&registry, &zamos_collect_errors_total)?;
        register(&registry, &zamos_last_collect_timestamp_seconds)?;

        Ok(Arc::new(Self {
            registry,
            zamos_cpu_usage_percent,
            zamos_memory_used_bytes,
            zamos_memory_total_bytes,
            zamos_memory_usage_percent,
            zamos_disk_used_bytes,
            zamos_disk_total_bytes,
            zamos_disk_usage_percent,
            zamos_net_rx_bytes_total,
            zamos_net_tx_bytes_total,
            zamos_net_rx_bytes_per_sec,
            zamos_net_tx_bytes_per_sec,
            zamos_host_uptime_seconds,
            zamos_temperature_supported,
            zamos_app_up,
            zamos_app_response_time_ms,
            zamos_apps_total,
            zamos_apps_up,
            zamos_probes_total,
            zamos_uptime_seconds,
            zamos_scrape_count_total,
            zamos_collect_errors_total,
            zamos_last_collect_timestamp_seconds,
        }))
    }

    pub fn update_from_state(&self, state: &State) {
        let system = &state.system;
        self.zamos_cpu_usage_percent.set(system.cpu_usage_percent);
        self.zamos_memory_used_bytes
            .set(system.memory_used_bytes as f64);
        self.zamos_memory_total_bytes
            .set(system.memory_total_bytes as f64);
        self.zamos_memory_usage_percent
            .set(state.memory_usage_percent());

        let (disk_used, disk_total) = system
            .disk
            .as_ref()
            .map(|d| (d.used_bytes, d.total_bytes))
            .unwrap_or((0, 0));
        self.zamos_disk_used_bytes.set(disk_used as f64);
        self.zamos_disk_total_bytes.set(disk_total as f64);
        self.zamos_disk_usage_percent.set(state.disk_usage_percent());

        self.zamos_net_rx_bytes_total
            .set(system.net.rx_bytes_total as f64);
        self.zamos_net_tx_bytes_total
            .set(system.net.tx_bytes_total as f64);
        self.zamos_net_rx_bytes_per_sec
            .set(state.network.rx_bytes_per_sec);
        self.zamos_net_tx_bytes_per_sec
            .set(state.network.tx_bytes_per_sec);

        self.zamos_host_uptime_seconds
            .set(system.uptime_seconds as f64);
        self.zamos_temperature_supported
            .set(if system.temperature_supported { 1.0 } else { 0.0 });
        self.zamos_last_collect_timestamp_seconds
            .set((state.last_collect_timestamp_ms / 1000) as f64);

        let now = now_unix_ms() / 1000;
        let uptime = now.saturating_sub(state.started_at_unix) as f64;
        self.zamos_uptime_seconds.set(uptime);
    }

    /// `apps` and `report.results` correlate positionally. Apps without a
    /// URL were never probed and are left out of the per-app gauges and the
    /// probe counter.
    pub fn record_app_batch(&self, apps: &[App], report: &BatchReport) {
        self.zamos_app_up.reset();
        self.zamos_app_response_time_ms.reset();

        let probed: Vec<(&App, &ProbeResult)> = apps
            .iter()
            .zip(&report.results)
            .filter(|(app, _)| !app.url.trim().is_empty())
            .collect();

        for (app, result) in &probed {
            let labels = [app.name.as_str(), app.url.as_str()];
            self.zamos_app_up
                .with_label_values(&labels)
                .set(if result.is_online() { 1.0 } else { 0.0 });
            self.zamos_app_response_time_ms
                .with_label_values(&labels)
                .set(result.response_time_ms as f64);
        }
        self.zamos_apps_total.set(apps.len() as f64);
        self.zamos_apps_up.set(report.online_count() as f64);
        self.record_probes(probed.into_iter().map(|(_, result)| result));
    }

    pub fn record_probes<'a>(&self, results: impl IntoIterator<Item = &'a ProbeResult>) {
        for r in results {
            let status = match r.status {
                ProbeStatus::Online => "online",
                ProbeStatus::Offline => "offline",
            };
            self.zamos_probes_total.with_label_values(&[status]).inc();
        }
    }

    pub fn inc_scrape_count(&self) {
        self.zamos_scrape_count_total.inc();
    }

    pub fn inc_collect_error(&self, collector: &str) {
        self.zamos_collect_errors_total
            .with_label_values(&[collector])
            .inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}
