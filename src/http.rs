use crate::collectors::batch::{probe_batch, BatchReport};
use crate::collectors::probe::{ProbeResult, Prober};
use crate::collectors::{now_unix_ms, SystemSnapshot};
use crate::format::{
    bytes_per_sec_to_mbps, bytes_to_gb, humanize_bitrate, humanize_bytes, humanize_duration,
    Bitrate,
};
use crate::metrics::Metrics;
use crate::registry::{App, AppRegistry};
use crate::state::{NetworkRates, State as AgentState};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub state: Arc<RwLock<AgentState>>,
    pub registry: Arc<dyn AppRegistry>,
    pub prober: Arc<Prober>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        ApiError::BadRequest(format!("invalid JSON body: {}", value.body_text()))
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub result: ProbeResult,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetricsResponse {
    pub cpu: i64,
    pub ram_used: f64,
    pub ram_total: f64,
    pub disk_used: f64,
    pub disk_total: f64,
    /// "used / total" in display units, e.g. "1.5 GB / 8 GB".
    pub ram_label: String,
    pub disk_label: String,
    pub uptime: String,
    pub uptime_seconds: u64,
    pub temperature_supported: bool,
    pub timestamp: i64,
}

impl From<&SystemSnapshot> for SystemMetricsResponse {
    fn from(value: &SystemSnapshot) -> Self {
        let (disk_used, disk_total) = value
            .disk
            .as_ref()
            .map(|d| (d.used_bytes, d.total_bytes))
            .unwrap_or((0, 0));
        Self {
            cpu: value.cpu_usage_percent.round() as i64,
            ram_used: bytes_to_gb(value.memory_used_bytes, 1),
            ram_total: bytes_to_gb(value.memory_total_bytes, 1),
            disk_used: bytes_to_gb(disk_used, 0),
            disk_total: bytes_to_gb(disk_total, 0),
            ram_label: usage_label(value.memory_used_bytes, value.memory_total_bytes),
            disk_label: usage_label(disk_used, disk_total),
            uptime: humanize_duration(value.uptime_seconds),
            uptime_seconds: value.uptime_seconds,
            temperature_supported: value.temperature_supported,
            timestamp: now_unix_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetricsResponse {
    /// Mbps
    pub download_speed: f64,
    /// Mbps
    pub upload_speed: f64,
    pub download: Bitrate,
    pub upload: Bitrate,
    pub timestamp: i64,
}

impl From<&NetworkRates> for NetworkMetricsResponse {
    fn from(value: &NetworkRates) -> Self {
        Self {
            download_speed: bytes_per_sec_to_mbps(value.rx_bytes_per_sec),
            upload_speed: bytes_per_sec_to_mbps(value.tx_bytes_per_sec),
            download: humanize_bitrate(value.rx_bytes_per_sec),
            upload: humanize_bitrate(value.tx_bytes_per_sec),
            timestamp: now_unix_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiState {
    pub started_at_unix: i64,
    pub last_collect_timestamp_ms: i64,
    pub last_collect: Option<String>,
    pub collect_cycles: u64,
    pub system: SystemSnapshot,
    pub network: NetworkRates,
    pub apps: BatchReport,
}

impl From<&AgentState> for ApiState {
    fn from(value: &AgentState) -> Self {
        Self {
            started_at_unix: value.started_at_unix,
            last_collect_timestamp_ms: value.last_collect_timestamp_ms,
            last_collect: format_unix_ms(value.last_collect_timestamp_ms),
            collect_cycles: value.collect_cycles,
            system: value.system.clone(),
            network: value.network.clone(),
            apps: value.apps.clone(),
        }
    }
}

pub fn build_router(state: HttpAppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/state", get(state_handler))
        .route("/api/apps", get(apps_handler))
        .route("/api/apps/status", post(status_handler))
        .route("/api/apps/status/batch", post(batch_handler))
        .route("/api/metrics/system", get(system_metrics_handler))
        .route("/api/metrics/network", get(network_metrics_handler))
        .fallback(not_found)
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => {
            ApiError::Internal(format!("failed to encode metrics: {err}")).into_response()
        }
    }
}

async fn state_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let guard = state.state.read().await;
    Json(ApiState::from(&*guard))
}

async fn apps_handler(State(state): State<HttpAppState>) -> Json<Vec<App>> {
    Json(state.registry.list())
}

async fn status_handler(
    State(state): State<HttpAppState>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(req) = body?;
    let url = req
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("URL is required".to_string()))?;

    let result = state.prober.probe(&url).await;
    state.metrics.record_probes(std::slice::from_ref(&result));

    Ok(Json(StatusResponse {
        result,
        timestamp: now_unix_ms(),
    }))
}

async fn batch_handler(
    State(state): State<HttpAppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BatchReport>, ApiError> {
    let Json(body) = body?;
    let urls = parse_batch_urls(&body)?;
    debug!(count = urls.len(), "batch status request");

    let report = probe_batch(state.prober.as_ref(), &urls).await;
    state.metrics.record_probes(&report.results);
    Ok(Json(report))
}

fn parse_batch_urls(body: &Value) -> Result<Vec<String>, ApiError> {
    let items = body
        .get("urls")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::BadRequest("URLs array is required".to_string()))?;

    items
        .iter()
        .map(|item| match item {
            Value::String(url) => Ok(url.clone()),
            Value::Null => Ok(String::new()),
            _ => Err(ApiError::BadRequest(
                "URLs array must contain only strings".to_string(),
            )),
        })
        .collect()
}

async fn system_metrics_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let guard = state.state.read().await;
    Json(SystemMetricsResponse::from(&guard.system))
}

async fn network_metrics_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let guard = state.state.read().await;
    Json(NetworkMetricsResponse::from(&guard.network))
}

fn usage_label(used: u64, total: u64) -> String {
    format!("{} / {}", humanize_bytes(used, 2), humanize_bytes(total, 2))
}

fn format_unix_ms(ts_ms: i64) -> Option<String> {
    if ts_ms <= 0 {
        return None;
    }
    let st = UNIX_EPOCH + Duration::from_millis(ts_ms as u64);
    Some(humantime::format_rfc3339_seconds(st).to_string())
}
