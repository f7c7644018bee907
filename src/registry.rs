use crate::collectors::probe::{ProbeResult, ProbeStatus};
use crate::config::AppConfig;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    #[default]
    Running,
    Stopped,
    Error,
}

impl From<ProbeStatus> for AppStatus {
    fn from(value: ProbeStatus) -> Self {
        match value {
            ProbeStatus::Online => AppStatus::Running,
            ProbeStatus::Offline => AppStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub url: String,
    pub status: AppStatus,
    pub updated_at: i64,
}

/// Source of monitored apps and sink for their probed status.
///
/// Storage is someone else's concern; the poll loop only needs to read the
/// current list and write statuses back.
pub trait AppRegistry: Send + Sync {
    fn list(&self) -> Vec<App>;

    /// Returns `false` when no app has the given id.
    fn set_status(&self, id: u32, status: AppStatus, now_unix: i64) -> bool;
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    apps: RwLock<Vec<App>>,
}

impl MemoryRegistry {
    pub fn from_config(apps: &[AppConfig], now_unix: i64) -> Self {
        let apps = apps
            .iter()
            .zip(1_u32..)
            .map(|(cfg, id)| App {
                id,
                name: cfg.name.clone(),
                description: cfg.description.clone(),
                icon: cfg.icon.clone(),
                url: cfg.url.clone(),
                status: cfg.status,
                updated_at: now_unix,
            })
            .collect();
        Self {
            apps: RwLock::new(apps),
        }
    }
}

impl AppRegistry for MemoryRegistry {
    fn list(&self) -> Vec<App> {
        self.apps
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_status(&self, id: u32, status: AppStatus, now_unix: i64) -> bool {
        let mut apps = self
            .apps
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match apps.iter_mut().find(|app| app.id == id) {
            Some(app) => {
                if app.status != status {
                    app.status = status;
                    app.updated_at = now_unix;
                }
                true
            }
            None => false,
        }
    }
}

/// Writes probe outcomes back to the registry.
///
/// `apps` and `results` correlate positionally, as produced by probing the
/// apps' URLs in listing order. Apps without a URL keep their stored status.
pub fn write_back(
    registry: &dyn AppRegistry,
    apps: &[App],
    results: &[ProbeResult],
    now_unix: i64,
) -> usize {
    apps.iter()
        .zip(results)
        .filter(|(app, _)| !app.url.trim().is_empty())
        .filter(|(app, result)| registry.set_status(app.id, result.status.into(), now_unix))
        .count()
}
