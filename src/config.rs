use crate::registry::AppStatus;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: String,
    pub interval_secs: u64,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub apps: Vec<AppConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub follow_redirects: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_primary_disk_mounts")]
    pub primary_disk_mounts: Vec<String>,
    #[serde(default)]
    pub include_loopback: bool,
}

/// Seed entry for the in-memory app registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: AppStatus,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            follow_redirects: false,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            primary_disk_mounts: default_primary_disk_mounts(),
            include_loopback: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation("listen is required".to_string()));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a valid host:port socket address".to_string(),
            ));
        }
        if self.interval_secs < 1 {
            return Err(ConfigError::Validation(
                "interval_secs must be >= 1".to_string(),
            ));
        }

        validate_probe(&self.probe)?;
        validate_apps(&self.apps)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_probe(cfg: &ProbeConfig) -> Result<(), ConfigError> {
    if cfg.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "probe.timeout_ms must be > 0".to_string(),
        ));
    }
    if cfg.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "probe.user_agent must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_apps(apps: &[AppConfig]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for app in apps {
        if app.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "apps[*].name must not be empty".to_string(),
            ));
        }
        if !names.insert(app.name.clone()) {
            return Err(ConfigError::Validation(format!(
                "app name '{}' must be unique",
                app.name
            )));
        }
        // An empty url is allowed: the app is listed but never probed.
        if !app.url.trim().is_empty() && Url::parse(&app.url).is_err() {
            return Err(ConfigError::Validation(format!(
                "apps '{}' url '{}' is not an absolute URL",
                app.name, app.url
            )));
        }
    }
    Ok(())
}

const fn default_timeout_ms() -> u64 {
    5000
}

fn default_user_agent() -> String {
    "zamOS/1.0".to_string()
}

fn default_primary_disk_mounts() -> Vec<String> {
    vec!["/".to_string(), "/app".to_string()]
}
