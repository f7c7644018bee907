use serde::Serialize;

const BYTE_UNITS: [&str; 6] = ["Bytes", "KB", "MB", "GB", "TB", "PB"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bitrate {
    pub value: f64,
    pub unit: &'static str,
}

/// "1d 2h 3m"; zero units are left out and anything under a minute is "0m".
pub fn humanize_duration(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let mins = (seconds % 3600) / 60;

    let mut parts = Vec::with_capacity(3);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if mins > 0 {
        parts.push(format!("{mins}m"));
    }

    if parts.is_empty() {
        "0m".to_string()
    } else {
        parts.join(" ")
    }
}

/// Base-1024 size with at most `decimals` fractional digits, trailing zeros
/// dropped: `1536` is "1.5 KB", `1 << 30` is "1 GB".
pub fn humanize_bytes(bytes: u64, decimals: usize) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut exp = 0_u32;
    while (exp as usize) < BYTE_UNITS.len() - 1 && bytes >= 1024_u64.pow(exp + 1) {
        exp += 1;
    }
    let value = bytes as f64 / 1024_u64.pow(exp) as f64;

    format!("{} {}", trim_fraction(&format!("{value:.decimals$}")), BYTE_UNITS[exp as usize])
}

pub fn humanize_bitrate(bytes_per_sec: f64) -> Bitrate {
    let bits = bytes_per_sec.max(0.0) * 8.0;
    let mbps = bits / (1024.0 * 1024.0);
    if mbps >= 1.0 {
        Bitrate {
            value: round2(mbps),
            unit: "Mbps",
        }
    } else {
        Bitrate {
            value: round2(bits / 1024.0),
            unit: "Kbps",
        }
    }
}

/// Megabits per second rounded to 2 decimals, as the network endpoint reports.
pub fn bytes_per_sec_to_mbps(bytes_per_sec: f64) -> f64 {
    round2(bytes_per_sec.max(0.0) * 8.0 / (1024.0 * 1024.0))
}

pub fn bytes_to_gb(bytes: u64, decimals: i32) -> f64 {
    let gb = bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    let factor = 10_f64.powi(decimals);
    (gb * factor).round() / factor
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}
