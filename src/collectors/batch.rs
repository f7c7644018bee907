use super::now_unix_ms;
use super::probe::{ProbeResult, Prober, Transport};
use futures::future::join_all;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub results: Vec<ProbeResult>,
    /// Capture time of the whole batch in unix milliseconds.
    pub timestamp: i64,
}

impl BatchReport {
    pub fn online_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_online()).count()
    }
}

/// Probes every url concurrently on the current task.
///
/// Results keep the input order, duplicates included. Blank entries are
/// reported offline without touching the network.
pub async fn probe_batch<T: Transport>(prober: &Prober<T>, urls: &[String]) -> BatchReport {
    let timestamp = now_unix_ms();

    let results = join_all(urls.iter().map(|url| async move {
        if url.trim().is_empty() {
            ProbeResult::offline(url.as_str())
        } else {
            prober.probe(url).await
        }
    }))
    .await;

    let report = BatchReport { results, timestamp };
    debug!(
        total = report.results.len(),
        online = report.online_count(),
        "batch probe finished"
    );
    report
}
