use crate::error::StatsError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

pub const MIN_POLL_INTERVAL_SECS: u64 = 30;
pub const MAX_POLL_INTERVAL_SECS: u64 = 86_400;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

pub const CONF_POLL_INTERVAL: &str = "poll_interval_seconds";
/// Key used by the original options form, accepted as an alias.
pub const CONF_SCAN_INTERVAL: &str = "scan_interval";
pub const CONF_ENABLE_FUN_STATS: &str = "enable_fun_stats";
pub const CONF_ENABLE_HOST_TELEMETRY: &str = "enable_host_telemetry";

/// Per-entry coordinator options.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StatsOptions {
    #[serde(alias = "scan_interval")]
    pub poll_interval_seconds: u64,
    pub enable_fun_stats: bool,
    pub enable_host_telemetry: bool,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
            enable_fun_stats: true,
            enable_host_telemetry: true,
        }
    }
}

impl StatsOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn validate(&self) -> Result<(), StatsError> {
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&self.poll_interval_seconds) {
            return Err(StatsError::config_invalid(format!(
                "{CONF_POLL_INTERVAL} must be within [{MIN_POLL_INTERVAL_SECS}, {MAX_POLL_INTERVAL_SECS}], got {}",
                self.poll_interval_seconds
            )));
        }
        Ok(())
    }

    pub fn validated(self) -> Result<Self, StatsError> {
        self.validate()?;
        Ok(self)
    }

    /// Build options from an options-form payload layered over `self`.
    ///
    /// Missing keys keep their current value. The interval accepts integers
    /// and integer strings; toggles must be booleans.
    pub fn merge_json(&self, payload: &serde_json::Value) -> Result<Self, StatsError> {
        let map = payload
            .as_object()
            .ok_or_else(|| StatsError::config_invalid("options payload must be a JSON object"))?;
        let mut next = self.clone();

        let interval = map.get(CONF_POLL_INTERVAL).or_else(|| map.get(CONF_SCAN_INTERVAL));
        if let Some(value) = interval {
            next.poll_interval_seconds = coerce_interval(value)?;
        }
        if let Some(value) = map.get(CONF_ENABLE_FUN_STATS) {
            next.enable_fun_stats = expect_bool(CONF_ENABLE_FUN_STATS, value)?;
        }
        if let Some(value) = map.get(CONF_ENABLE_HOST_TELEMETRY) {
            next.enable_host_telemetry = expect_bool(CONF_ENABLE_HOST_TELEMETRY, value)?;
        }
        next.validated()
    }

    pub fn from_json(payload: &serde_json::Value) -> Result<Self, StatsError> {
        Self::default().merge_json(payload)
    }
}

fn coerce_interval(value: &serde_json::Value) -> Result<u64, StatsError> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        StatsError::config_invalid(format!("{CONF_POLL_INTERVAL} must be a positive integer, got {value}"))
    })
}

fn expect_bool(key: &str, value: &serde_json::Value) -> Result<bool, StatsError> {
    value
        .as_bool()
        .ok_or_else(|| StatsError::config_invalid(format!("{key} must be a boolean, got {value}")))
}

/// One configured integration entry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EntryConf {
    pub title: String,
    pub unique_id: Option<String>,
    #[serde(default)]
    pub options: StatsOptions,
}

impl Default for EntryConf {
    fn default() -> Self {
        Self {
            title: "VibeStats".into(),
            unique_id: Some("vibestats".into()),
            options: StatsOptions::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    /// Bind address of the dashboard view.
    pub listen: String,
    /// Registry export written by the host platform.
    pub registry_file: PathBuf,
    /// Path whose filesystem is reported as host disk usage.
    pub disk_path: PathBuf,
    /// Blocking workers shared by the expensive metric passes (at least 1).
    pub workers: usize,
    pub entries: Vec<EntryConf>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8099".into(),
            registry_file: PathBuf::from("./data/registry.json"),
            disk_path: PathBuf::from("/"),
            workers: 2,
            entries: vec![EntryConf::default()],
        }
    }
}

impl KernelConfig {
    /// Drop invalid entry options back to defaults and clamp the worker count.
    fn sanitized(mut self) -> Self {
        self.workers = self.workers.max(1);
        for entry in &mut self.entries {
            if let Err(e) = entry.options.validate() {
                warn!(entry = %entry.title, error = %e, "invalid entry options, using defaults");
                entry.options = StatsOptions::default();
            }
        }
        self
    }
}

/// Load the kernel configuration from `$VIBESTATS_CONFIG` (default `vibestats.yaml`).
///
/// A missing or invalid file falls back to defaults.
pub async fn load_config() -> KernelConfig {
    let path = std::env::var("VIBESTATS_CONFIG").unwrap_or_else(|_| "vibestats.yaml".into());
    load_config_from(Path::new(&path)).await
}

pub async fn load_config_from(path: &Path) -> KernelConfig {
    if !path.exists() {
        info!(path = %path.display(), "no config file, using defaults");
        return KernelConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    match serde_yaml::from_str::<KernelConfig>(&txt) {
        Ok(cfg) => cfg.sanitized(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid config, using defaults");
            KernelConfig::default()
        }
    }
}
