use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

pub const NET_RX: &str = "net.rx";
pub const NET_TX: &str = "net.tx";

/// One observation of a monotonic byte counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSample {
    pub cumulative_bytes: u64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy)]
struct CounterState {
    previous: RateSample,
    last_rate: Option<f64>,
}

/// Turns successive cumulative counter readings into bytes per second.
///
/// Holds the previous sample per counter id. Each call is a single
/// read-modify-write under the lock, so concurrent pollers of the same
/// counter never observe a half-updated pair.
#[derive(Debug, Default)]
pub struct RateSampler {
    counters: Mutex<HashMap<String, CounterState>>,
}

impl RateSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `cumulative_bytes` at `timestamp_ms` and returns the rate since
    /// the previous sample of `counter_id`.
    ///
    /// Without usable history (first sample, time not advancing) the result is
    /// `provider_rate`, then the last computed rate, then 0. A counter that
    /// went backwards is taken as a reset: the new reading becomes the
    /// baseline and the result is `provider_rate` or 0.
    pub fn sample(
        &self,
        counter_id: &str,
        cumulative_bytes: u64,
        timestamp_ms: i64,
        provider_rate: Option<f64>,
    ) -> f64 {
        let provider_rate = provider_rate.filter(|r| r.is_finite() && *r >= 0.0);
        let current = RateSample {
            cumulative_bytes,
            timestamp_ms,
        };

        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(state) = counters.get_mut(counter_id) else {
            counters.insert(
                counter_id.to_string(),
                CounterState {
                    previous: current,
                    last_rate: None,
                },
            );
            return provider_rate.unwrap_or(0.0);
        };

        let dt_ms = timestamp_ms
            .checked_sub(state.previous.timestamp_ms)
            .unwrap_or(0);
        let rate = if cumulative_bytes < state.previous.cumulative_bytes {
            debug!(
                counter = counter_id,
                previous = state.previous.cumulative_bytes,
                current = cumulative_bytes,
                "counter went backwards, resetting baseline"
            );
            provider_rate.unwrap_or(0.0)
        } else if dt_ms <= 0 {
            provider_rate.or(state.last_rate).unwrap_or(0.0)
        } else {
            let delta = (cumulative_bytes - state.previous.cumulative_bytes) as f64;
            let rate = delta / (dt_ms as f64 / 1000.0);
            state.last_rate = Some(rate);
            rate
        };

        state.previous = current;
        rate
    }

    #[cfg(test)]
    pub fn previous(&self, counter_id: &str) -> Option<RateSample> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(counter_id)
            .map(|s| s.previous)
    }
}
