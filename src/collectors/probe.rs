use crate::config::ProbeConfig;
use reqwest::{redirect, Client};
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub url: String,
    pub status: ProbeStatus,
    /// Round trip in milliseconds; always 0 when offline.
    #[serde(rename = "responseTime")]
    pub response_time_ms: u64,
}

impl ProbeResult {
    pub fn online(url: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            url: url.into(),
            status: ProbeStatus::Online,
            response_time_ms,
        }
    }

    pub fn offline(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: ProbeStatus::Offline,
            response_time_ms: 0,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == ProbeStatus::Online
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// A single GET against `url` resolving to the response status code.
pub trait Transport: Send + Sync {
    fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<u16, TransportError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(cfg: &ProbeConfig) -> Result<Self, reqwest::Error> {
        let policy = if cfg.follow_redirects {
            redirect::Policy::default()
        } else {
            redirect::Policy::none()
        };
        let client = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .redirect(policy)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<u16, TransportError> {
        let resp = self.client.get(url).timeout(timeout).send().await?;
        Ok(resp.status().as_u16())
    }
}

pub fn is_reachable(status_code: u16) -> bool {
    (200..=399).contains(&status_code)
}

#[derive(Debug, Clone)]
pub struct Prober<T = HttpTransport> {
    transport: T,
    timeout: Duration,
}

impl<T: Transport> Prober<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[cfg(test)]
    pub(crate) fn transport_ref(&self) -> &T {
        &self.transport
    }

    pub async fn probe(&self, url: &str) -> ProbeResult {
        self.probe_with_timeout(url, self.timeout).await
    }

    /// One attempt, no retry. Every failure mode folds into `Offline`.
    pub async fn probe_with_timeout(&self, url: &str, timeout: Duration) -> ProbeResult {
        let start = Instant::now();

        match time::timeout(timeout, self.transport.get(url, timeout)).await {
            Ok(Ok(code)) if is_reachable(code) => {
                ProbeResult::online(url, start.elapsed().as_millis() as u64)
            }
            Ok(Ok(code)) => {
                debug!(url = %url, status_code = code, "app answered with failure status");
                ProbeResult::offline(url)
            }
            Ok(Err(err)) => {
                warn!(url = %url, error = %err, "probe failed");
                ProbeResult::offline(url)
            }
            Err(_elapsed) => {
                warn!(url = %url, timeout_ms = timeout.as_millis() as u64, "probe timeout");
                ProbeResult::offline(url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_prober(timeout: Duration) -> Prober {
        let transport = HttpTransport::new(&ProbeConfig::default()).expect("client");
        Prober::new(transport, timeout)
    }

    async fn server_returning(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        server
    }

    struct Pending;

    impl Transport for Pending {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<u16, TransportError> {
            std::future::pending().await
        }
    }

    #[test]
    fn reachable_covers_success_and_redirect_classes() {
        assert!(is_reachable(200));
        assert!(is_reachable(204));
        assert!(is_reachable(301));
        assert!(is_reachable(399));
        assert!(!is_reachable(199));
        assert!(!is_reachable(400));
        assert!(!is_reachable(503));
    }

    #[tokio::test]
    async fn success_and_redirect_are_online() {
        for status in [200, 302] {
            let server = server_returning(status).await;
            let result = http_prober(Duration::from_secs(5))
                .probe(&format!("{}/", server.uri()))
                .await;
            assert_eq!(result.status, ProbeStatus::Online, "status {status}");
        }
    }

    #[tokio::test]
    async fn error_status_is_offline_with_zero_latency() {
        for status in [404, 500] {
            let server = server_returning(status).await;
            let result = http_prober(Duration::from_secs(5))
                .probe(&format!("{}/", server.uri()))
                .await;
            assert_eq!(result.status, ProbeStatus::Offline);
            assert_eq!(result.response_time_ms, 0);
        }
    }

    #[tokio::test]
    async fn sends_identifying_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "zamOS/1.0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let result = http_prober(Duration::from_secs(5)).probe(&server.uri()).await;
        assert!(result.is_online());
    }

    #[tokio::test]
    async fn refused_connection_is_offline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = http_prober(Duration::from_secs(5))
            .probe(&format!("http://127.0.0.1:{port}/"))
            .await;
        assert_eq!(result, ProbeResult::offline(format!("http://127.0.0.1:{port}/")));
    }

    #[tokio::test]
    async fn slow_response_times_out_as_offline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
            .mount(&server)
            .await;

        let prober = http_prober(Duration::from_secs(5));
        let result = prober
            .probe_with_timeout(&server.uri(), Duration::from_millis(100))
            .await;
        assert_eq!(result.status, ProbeStatus::Offline);
        assert_eq!(result.response_time_ms, 0);
    }

    #[tokio::test]
    async fn timeout_applies_even_if_transport_ignores_it() {
        let prober = Prober::new(Pending, Duration::from_millis(50));
        let result = prober.probe("http://stuck.invalid/").await;
        assert_eq!(result.status, ProbeStatus::Offline);
    }

    #[test]
    fn result_serializes_with_dashboard_field_names() {
        let value = serde_json::to_value(ProbeResult::online("http://a", 12)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"url": "http://a", "status": "online", "responseTime": 12})
        );
    }
}
