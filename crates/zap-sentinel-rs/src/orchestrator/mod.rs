use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::{
    adapters::ScanEngine,
    db,
    error::{ApiResult, ScannerError},
    models::{ActionEnvelope, ActiveScans, Alert, Site},
};

/// Scan-start attempts after the first that may follow a successful `add_site`.
pub const MAX_SCAN_START_RETRIES: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartScanOutcome {
    Started {
        scan_id: Option<String>,
        retries: usize,
    },
    AddSiteFailed {
        reason: String,
    },
    Rejected {
        reason: String,
    },
}

impl StartScanOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }

    pub fn into_envelope(self) -> ActionEnvelope {
        match self {
            Self::Started { scan_id, .. } => ActionEnvelope {
                success: true,
                message: "Scan successfully started".to_string(),
                scan_id,
            },
            Self::AddSiteFailed { reason } => {
                ActionEnvelope::failed(format!("Failed to add site to ZAP: {reason}"))
            }
            Self::Rejected { reason } => {
                ActionEnvelope::failed(format!("Failed to start scan: {reason}"))
            }
        }
    }
}

/// Starts an active scan. A rejected start registers the site and tries again,
/// at most [`MAX_SCAN_START_RETRIES`] times.
pub async fn start_scan(engine: &dyn ScanEngine, site: &Site) -> StartScanOutcome {
    let mut retries = 0;
    loop {
        let err = match engine.start_scan(&site.url).await {
            Ok(scan_id) => {
                info!(url = %site.url, scan_id = ?scan_id, retries, "scan started");
                return StartScanOutcome::Started { scan_id, retries };
            }
            Err(e) => e,
        };

        if retries >= MAX_SCAN_START_RETRIES {
            warn!(url = %site.url, error = %err, "scan start failed after retry");
            return StartScanOutcome::Rejected {
                reason: err.to_string(),
            };
        }

        warn!(url = %site.url, error = %err, "scan start rejected, adding site");
        if let Err(add_err) = engine.add_site(site).await {
            warn!(url = %site.url, error = %add_err, "add site failed");
            return StartScanOutcome::AddSiteFailed {
                reason: add_err.to_string(),
            };
        }
        retries += 1;
    }
}

pub async fn active_scans(engine: &dyn ScanEngine) -> Result<ActiveScans, ScannerError> {
    let scans: Vec<_> = engine
        .scans()
        .await?
        .into_iter()
        .filter(|s| !s.is_finished())
        .collect();
    Ok(ActiveScans {
        success: true,
        count: scans.len(),
        scans,
    })
}

/// Raw alert objects from an alert-feed reply; an absent list reads as empty.
pub fn alert_list(reply: &Value) -> Vec<Value> {
    reply
        .get("alerts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

pub async fn all_alerts(engine: &dyn ScanEngine) -> Result<Vec<Value>, ScannerError> {
    Ok(alert_list(&engine.alerts(None).await?))
}

/// Pulls the alerts for `url` from the engine and stores them. Returns the row count.
pub async fn persist_scan_results(
    engine: &dyn ScanEngine,
    pool: &SqlitePool,
    url: &str,
) -> ApiResult<u64> {
    let reply = engine.alerts(Some(url)).await?;
    let alerts = alert_list(&reply)
        .into_iter()
        .map(serde_json::from_value::<Alert>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ScannerError::Decode {
            endpoint: "alert/view/alerts",
            reason: e.to_string(),
        })?;
    let written = db::insert_alerts(pool, &alerts).await?;
    info!(url, written, "scan results saved");
    Ok(written)
}
