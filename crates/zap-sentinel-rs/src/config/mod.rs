use std::{env, fs, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub zap_base_url: String,
    pub zap_api_key: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub collector_base_url: String,
    pub request_timeout_secs: u64,
    pub telemetry_interval_secs: u64,
    pub scan_results_interval_secs: u64,
    pub status_interval_secs: u64,
    pub telemetry_enabled: bool,
    pub target_acquisition_enabled: bool,
    pub docker_type: u8,
    pub default_context: String,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var("ZAP_SENTINEL_CONFIG").unwrap_or_else(|_| "config.json".to_string());
        let file_cfg: Option<AppConfig> = fs::read_to_string(&path)
            .ok()
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .with_context(|| format!("failed to parse {path}"))?;

        let mut cfg = file_cfg.unwrap_or_default();
        cfg.apply_overrides(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies `ZS_*` overrides. Values that fail to parse leave the field untouched.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ZS_HOST") {
            self.host = v;
        }
        if let Some(v) = lookup("ZS_PORT") {
            self.port = v.parse().unwrap_or(self.port);
        }
        if let Some(v) = lookup("ZS_ZAP_BASE_URL") {
            self.zap_base_url = v;
        }
        if let Some(v) = lookup("ZS_ZAP_API_KEY") {
            self.zap_api_key = v;
        }
        if let Some(v) = lookup("ZS_DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("ZS_COLLECTOR_BASE_URL") {
            self.collector_base_url = v;
        }
        if let Some(v) = lookup("ZS_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = v.parse().unwrap_or(self.request_timeout_secs);
        }
        if let Some(v) = lookup("ZS_TELEMETRY_INTERVAL_SECS") {
            self.telemetry_interval_secs = v.parse().unwrap_or(self.telemetry_interval_secs);
        }
        if let Some(v) = lookup("ZS_SCAN_RESULTS_INTERVAL_SECS") {
            self.scan_results_interval_secs = v.parse().unwrap_or(self.scan_results_interval_secs);
        }
        if let Some(v) = lookup("ZS_STATUS_INTERVAL_SECS") {
            self.status_interval_secs = v.parse().unwrap_or(self.status_interval_secs);
        }
        if let Some(v) = lookup("ZS_TELEMETRY_ENABLED") {
            self.telemetry_enabled = v.parse().unwrap_or(self.telemetry_enabled);
        }
        if let Some(v) = lookup("ZS_TARGET_ACQUISITION_ENABLED") {
            self.target_acquisition_enabled = v.parse().unwrap_or(self.target_acquisition_enabled);
        }
        if let Some(v) = lookup("ZS_DOCKER_TYPE") {
            self.docker_type = v.parse().unwrap_or(self.docker_type);
        }
        if let Some(v) = lookup("ZS_DEFAULT_CONTEXT") {
            self.default_context = v;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.zap_base_url.trim().is_empty() {
            anyhow::bail!("zap_base_url must not be empty");
        }
        if self.collector_base_url.trim().is_empty() {
            anyhow::bail!("collector_base_url must not be empty");
        }
        if !self.database_url.starts_with("sqlite:") {
            anyhow::bail!("database_url must be a sqlite: URL, got {}", self.database_url);
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be positive");
        }
        for (name, secs) in [
            ("telemetry_interval_secs", self.telemetry_interval_secs),
            ("scan_results_interval_secs", self.scan_results_interval_secs),
            ("status_interval_secs", self.status_interval_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("{name} must be positive");
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5002,
            zap_base_url: "http://localhost:8080".to_string(),
            zap_api_key: String::new(),
            database_url: "sqlite://zap_results.db?mode=rwc".to_string(),
            db_max_connections: 5,
            collector_base_url: "https://panel.hunterbounter.com".to_string(),
            request_timeout_secs: 15,
            telemetry_interval_secs: 10,
            scan_results_interval_secs: 5,
            status_interval_secs: 5,
            telemetry_enabled: !cfg!(target_os = "macos"),
            target_acquisition_enabled: true,
            docker_type: 1,
            default_context: "Default Context".to_string(),
        }
    }
}
