use super::{now_unix_ms, SystemSnapshot};
use crate::config::MetricsConfig;
use crate::state::{DiskStat, NetCounters, NetStat};
use std::time::Instant;
use sysinfo::{ComponentExt, CpuExt, DiskExt, NetworkExt, NetworksExt, System, SystemExt};
use tracing::{debug, warn};

/// Host metrics source. Readings the host refuses to give (sandboxed
/// containers, missing sensors) come back as zeros, never as errors.
pub struct HostCollector {
    system: System,
    cfg: MetricsConfig,
    last_refresh: Option<Instant>,
}

impl HostCollector {
    /// Interfaces are enumerated once here. Each sysinfo network refresh
    /// moves the per-interface baseline, so `collect` must refresh exactly
    /// once for bytes-since-refresh to span the poll interval.
    pub fn new(cfg: MetricsConfig) -> Self {
        let mut system = System::new();
        system.refresh_networks_list();
        Self {
            system,
            cfg,
            last_refresh: Some(Instant::now()),
        }
    }

    pub fn collect(&mut self) -> SystemSnapshot {
        let system = &mut self.system;
        system.refresh_cpu();
        system.refresh_memory();
        system.refresh_disks_list();
        system.refresh_disks();
        system.refresh_networks();
        system.refresh_components_list();
        system.refresh_components();

        let now = Instant::now();
        let since_last = self
            .last_refresh
            .map(|prev| now.duration_since(prev).as_secs_f64());
        self.last_refresh = Some(now);

        let cpu_usage_percent = finite_or_zero(system.global_cpu_info().cpu_usage() as f64);
        let memory_total_bytes = system.total_memory();
        let memory_used_bytes = system.used_memory().min(memory_total_bytes);

        let disks: Vec<DiskStat> = system
            .disks()
            .iter()
            .map(|d| {
                let total = d.total_space();
                DiskStat {
                    mount: d.mount_point().to_string_lossy().to_string(),
                    used_bytes: total.saturating_sub(d.available_space()),
                    total_bytes: total,
                }
            })
            .collect();
        let disk = select_primary_disk(&disks, &self.cfg.primary_disk_mounts).cloned();
        if disk.is_none() {
            warn!("no disks reported by host, disk metrics default to zero");
        }

        let ifaces: Vec<NetStat> = system
            .networks()
            .iter()
            .map(|(iface, data)| NetStat {
                iface: iface.to_string(),
                rx_bytes_total: data.total_received(),
                tx_bytes_total: data.total_transmitted(),
                rx_bytes_since_refresh: data.received(),
                tx_bytes_since_refresh: data.transmitted(),
            })
            .collect();
        let net = sum_counters(&ifaces, self.cfg.include_loopback, since_last);

        let temperature_supported = system
            .components()
            .iter()
            .any(|c| c.temperature().is_finite() && c.temperature() > 0.0);

        debug!(
            cpu = cpu_usage_percent,
            disks = disks.len(),
            ifaces = ifaces.len(),
            "host metrics collected"
        );

        SystemSnapshot {
            host_name: system.host_name(),
            uptime_seconds: system.uptime(),
            cpu_usage_percent,
            memory_used_bytes,
            memory_total_bytes,
            disk,
            net,
            temperature_supported,
            collected_at_ms: now_unix_ms(),
        }
    }
}

/// First disk mounted at one of `preferred` (in preference order), else the
/// first disk the host lists.
pub fn select_primary_disk<'a>(
    disks: &'a [DiskStat],
    preferred: &[String],
) -> Option<&'a DiskStat> {
    preferred
        .iter()
        .find_map(|mount| disks.iter().find(|d| &d.mount == mount))
        .or_else(|| disks.first())
}

/// Totals across interfaces plus the provider's own rate over the last
/// refresh window, when one is known.
pub fn sum_counters(
    ifaces: &[NetStat],
    include_loopback: bool,
    window_secs: Option<f64>,
) -> NetCounters {
    let (rx_total, tx_total, rx_window, tx_window) = ifaces
        .iter()
        .filter(|n| include_loopback || !is_loopback(&n.iface))
        .fold((0_u64, 0_u64, 0_u64, 0_u64), |acc, n| {
            (
                acc.0.saturating_add(n.rx_bytes_total),
                acc.1.saturating_add(n.tx_bytes_total),
                acc.2.saturating_add(n.rx_bytes_since_refresh),
                acc.3.saturating_add(n.tx_bytes_since_refresh),
            )
        });

    let window = window_secs.filter(|w| *w > 0.0);
    NetCounters {
        rx_bytes_total: rx_total,
        tx_bytes_total: tx_total,
        rx_provider_rate: window.map(|w| rx_window as f64 / w),
        tx_provider_rate: window.map(|w| tx_window as f64 / w),
    }
}

fn is_loopback(iface: &str) -> bool {
    let name = iface.to_ascii_lowercase();
    name == "lo" || name.starts_with("lo0") || name.contains("loopback")
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(mount: &str) -> DiskStat {
        DiskStat {
            mount: mount.to_string(),
            used_bytes: 1,
            total_bytes: 2,
        }
    }

    fn iface(name: &str, rx: u64, tx: u64, rx_win: u64, tx_win: u64) -> NetStat {
        NetStat {
            iface: name.to_string(),
            rx_bytes_total: rx,
            tx_bytes_total: tx,
            rx_bytes_since_refresh: rx_win,
            tx_bytes_since_refresh: tx_win,
        }
    }

    #[test]
    fn primary_disk_follows_preference_order() {
        let disks = vec![disk("/boot"), disk("/app"), disk("/")];
        let preferred = vec!["/".to_string(), "/app".to_string()];
        assert_eq!(select_primary_disk(&disks, &preferred).unwrap().mount, "/");

        let disks = vec![disk("/boot"), disk("/app")];
        assert_eq!(select_primary_disk(&disks, &preferred).unwrap().mount, "/app");
    }

    #[test]
    fn primary_disk_falls_back_to_first_or_none() {
        let preferred = vec!["/".to_string()];
        let disks = vec![disk("C:\\"), disk("D:\\")];
        assert_eq!(select_primary_disk(&disks, &preferred).unwrap().mount, "C:\\");
        assert!(select_primary_disk(&[], &preferred).is_none());
    }

    #[test]
    fn counters_skip_loopback_by_default() {
        let ifaces = vec![
            iface("lo", 1000, 1000, 100, 100),
            iface("eth0", 500, 200, 50, 20),
            iface("wlan0", 300, 100, 30, 10),
        ];

        let net = sum_counters(&ifaces, false, Some(2.0));
        assert_eq!(net.rx_bytes_total, 800);
        assert_eq!(net.tx_bytes_total, 300);
        assert_eq!(net.rx_provider_rate, Some(40.0));
        assert_eq!(net.tx_provider_rate, Some(15.0));

        let with_lo = sum_counters(&ifaces, true, None);
        assert_eq!(with_lo.rx_bytes_total, 1800);
        assert_eq!(with_lo.rx_provider_rate, None);
    }

    #[test]
    fn no_interfaces_degrade_to_zero() {
        let net = sum_counters(&[], false, Some(0.0));
        assert_eq!(net, NetCounters::default());
    }

    #[test]
    fn collector_never_fails() {
        let mut collector = HostCollector::new(MetricsConfig::default());
        let first = collector.collect();
        let second = collector.collect();
        assert!(first.cpu_usage_percent.is_finite());
        assert!(second.memory_used_bytes <= second.memory_total_bytes);
        assert!(second.collected_at_ms >= first.collected_at_ms);
    }

    #[test]
    fn provider_rate_covers_traffic_between_collects() {
        use std::io::{Read, Write};
        use std::net::{TcpListener, TcpStream};

        const PAYLOAD: usize = 20 * 1024 * 1024;

        let mut collector = HostCollector::new(MetricsConfig {
            include_loopback: true,
            ..MetricsConfig::default()
        });
        let before = collector.collect();

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let reader = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().expect("accept");
            let mut sink = Vec::with_capacity(PAYLOAD);
            conn.read_to_end(&mut sink).expect("read");
            sink.len()
        });
        let mut client = TcpStream::connect(addr).expect("connect");
        client.write_all(&vec![7_u8; PAYLOAD]).expect("write");
        drop(client);
        assert_eq!(reader.join().expect("reader"), PAYLOAD);

        std::thread::sleep(std::time::Duration::from_millis(500));
        let after = collector.collect();

        assert!(after.net.rx_bytes_total > before.net.rx_bytes_total);
        let rate = after.net.rx_provider_rate.expect("provider rate");
        assert!(rate > 1000.0, "provider rx rate {rate}");
    }
}
