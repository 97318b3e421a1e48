use std::{collections::BTreeMap, time::Duration};

use anyhow::Context;
use serde_json::Value;
use sysinfo::{Disks, Networks, System};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    adapters::ScanEngine,
    error::CollectorError,
    models::{ServerStats, Site, TargetRequest, TargetResponse},
    orchestrator,
};

const TELEMETRY_TYPE: &str = "zap";

/// Remote service that receives telemetry and hands out scan targets.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    async fn save_telemetry(&self, stats: &ServerStats) -> Result<(), CollectorError>;

    async fn save_scan_results(&self, results: &[Value]) -> Result<(), CollectorError>;

    async fn targets(&self, request: &TargetRequest) -> Result<Vec<String>, CollectorError>;
}

pub struct RemoteCollector {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteCollector {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("failed to build collector http client")?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        path: &'static str,
        body: &T,
    ) -> Result<reqwest::Response, CollectorError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|source| CollectorError::Transport { path, source })?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::Status {
                path,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Collector for RemoteCollector {
    async fn save_telemetry(&self, stats: &ServerStats) -> Result<(), CollectorError> {
        self.post("telemetry/save", stats).await.map(|_| ())
    }

    async fn save_scan_results(&self, results: &[Value]) -> Result<(), CollectorError> {
        self.post("scan_results/save", results).await.map(|_| ())
    }

    async fn targets(&self, request: &TargetRequest) -> Result<Vec<String>, CollectorError> {
        let response = self.post("target", request).await?;
        let parsed: TargetResponse = response.json().await.map_err(|e| CollectorError::Decode {
            path: "target",
            reason: e.to_string(),
        })?;
        Ok(parsed.into_targets())
    }
}

/// Host metrics sampler. Kept across cycles so CPU usage is a delta between samples.
pub struct HostProbe {
    system: System,
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self { system }
    }

    pub fn hostname() -> String {
        System::host_name().unwrap_or_else(|| "unknown".to_string())
    }

    fn ram_usage(&mut self) -> f32 {
        self.system.refresh_memory();
        percent(self.system.used_memory(), self.system.total_memory())
    }

    fn cpu_usage(&mut self) -> f32 {
        self.system.refresh_cpu_usage();
        self.system.global_cpu_usage()
    }

    fn disk_usage() -> f32 {
        let disks = Disks::new_with_refreshed_list();
        let root = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"));
        match root {
            Some(disk) => percent(
                disk.total_space().saturating_sub(disk.available_space()),
                disk.total_space(),
            ),
            None => {
                let (total, available) = disks.list().iter().fold((0, 0), |(t, a), d| {
                    (t + d.total_space(), a + d.available_space())
                });
                percent(total.saturating_sub(available), total)
            }
        }
    }

    /// First address of every interface; MAC when the interface has no IP.
    fn active_interfaces() -> BTreeMap<String, String> {
        let networks = Networks::new_with_refreshed_list();
        networks
            .list()
            .iter()
            .map(|(name, data)| {
                let address = data
                    .ip_networks()
                    .first()
                    .map(|net| net.addr.to_string())
                    .unwrap_or_else(|| data.mac_address().to_string());
                (name.clone(), address)
            })
            .collect()
    }
}

fn percent(used: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64 * 100.0) as f32
}

pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;
    format!("{days} days, {hours} hours, {minutes} minutes")
}

/// Socket table entries on Linux; zero where `/proc/net` is unavailable.
/// Kernel socket tables counted as connections, both TCP and UDP.
const SOCKET_TABLES: [&str; 4] = [
    "/proc/net/tcp",
    "/proc/net/tcp6",
    "/proc/net/udp",
    "/proc/net/udp6",
];

fn socket_table_entries(table: &str) -> usize {
    table.lines().skip(1).filter(|l| !l.trim().is_empty()).count()
}

fn active_connections() -> usize {
    SOCKET_TABLES
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|table| socket_table_entries(&table))
        .sum()
}

/// Prefixes `http://` when the target carries no scheme.
pub fn normalize_target(target: &str) -> String {
    let target = target.trim();
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("http://{target}")
    }
}

/// Builds one snapshot. Engine failures degrade to `offline` / 0 instead of aborting.
pub async fn collect_stats(engine: &dyn ScanEngine, probe: &mut HostProbe) -> ServerStats {
    let active_scan_count = match orchestrator::active_scans(engine).await {
        Ok(report) => report.count,
        Err(e) => {
            debug!(error = %e, "active scan count unavailable");
            0
        }
    };
    let zap_status = engine.is_online().await.label().to_string();

    ServerStats {
        hostname: HostProbe::hostname(),
        telemetry_type: TELEMETRY_TYPE.to_string(),
        active_scan_count,
        zap_status,
        active_interfaces: HostProbe::active_interfaces(),
        uptime: format_uptime(System::uptime()),
        ram_usage: probe.ram_usage(),
        cpu_usage: probe.cpu_usage(),
        disk_usage: HostProbe::disk_usage(),
        active_connections: active_connections(),
        current_time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

/// Asks the collector for targets and starts a scan for each one.
///
/// Returns how many scans the engine accepted. Cancelling `cancel` stops
/// between targets and aborts an in-flight start.
pub async fn acquire_targets(
    engine: &dyn ScanEngine,
    collector: &dyn Collector,
    request: TargetRequest,
    default_context: &str,
    cancel: &CancellationToken,
) -> Result<usize, CollectorError> {
    let targets = collector.targets(&request).await?;
    info!(count = targets.len(), "targets received");

    let mut started = 0;
    for target in targets {
        if cancel.is_cancelled() {
            info!("target acquisition cancelled");
            break;
        }
        let site = Site::new(normalize_target(&target), default_context);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = orchestrator::start_scan(engine, &site) => outcome,
        };
        if outcome.is_started() {
            started += 1;
        } else {
            warn!(url = %site.url, outcome = ?outcome, "target scan not started");
        }
    }
    Ok(started)
}

/// Forwards every engine alert, tagged with `machine_id`, to the collector.
/// Returns the number of alerts sent; an empty feed sends nothing.
pub async fn push_scan_results(
    engine: &dyn ScanEngine,
    collector: &dyn Collector,
    machine_id: &str,
) -> anyhow::Result<usize> {
    let mut results = orchestrator::all_alerts(engine).await?;
    if results.is_empty() {
        debug!("no scan results to push");
        return Ok(0);
    }
    for result in &mut results {
        if let Value::Object(fields) = result {
            fields.insert("machine_id".to_string(), Value::String(machine_id.to_string()));
        }
    }
    collector.save_scan_results(&results).await?;
    Ok(results.len())
}
