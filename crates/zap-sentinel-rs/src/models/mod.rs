use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scan target together with the engine context it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub url: String,
    pub context: String,
}

impl Site {
    pub fn new(url: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            context: context.into(),
        }
    }

    /// Regex registered in the context's inclusion rule.
    pub fn include_regex(&self) -> String {
        format!("{}.*", self.url)
    }
}

/// Request body for `/add_site` and `/start_scan`; `context` is optional on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteRequest {
    pub url: String,
    #[serde(default)]
    pub context: Option<String>,
}

impl SiteRequest {
    pub fn into_site(self, default_context: &str) -> Site {
        let context = self
            .context
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| default_context.to_string());
        Site::new(self.url, context)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
}

impl ActionEnvelope {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            scan_id: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            scan_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineStatus {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OnlineStatus {
    pub fn online(version: Option<String>) -> Self {
        Self {
            success: true,
            version,
            message: None,
        }
    }

    pub fn offline(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            version: None,
            message: Some(reason.into()),
        }
    }

    pub fn label(&self) -> &'static str {
        if self.success {
            "online"
        } else {
            "offline"
        }
    }
}

/// One entry of the engine's active-scan list; unknown fields are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineScan {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EngineScan {
    pub fn is_finished(&self) -> bool {
        self.progress.as_deref() == Some("100")
    }
}

/// Wire shape of `/active_scans_count`: the count travels under `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveScans {
    pub success: bool,
    #[serde(rename = "message")]
    pub count: usize,
    #[serde(rename = "data")]
    pub scans: Vec<EngineScan>,
}

/// Finding as reported by the engine's alert feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default, rename = "id")]
    pub alert_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub risk: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default, rename = "otherInfo", alias = "other")]
    pub other_info: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default, rename = "cweid")]
    pub cwe_id: Option<String>,
    #[serde(default, rename = "wascid")]
    pub wasc_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlertRecord {
    pub id: i64,
    pub alert_id: Option<String>,
    pub url: Option<String>,
    pub risk: Option<String>,
    pub description: Option<String>,
    pub solution: Option<String>,
    pub other_info: Option<String>,
    pub reference: Option<String>,
    pub cwe_id: Option<String>,
    pub wasc_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    pub hostname: String,
    pub telemetry_type: String,
    pub active_scan_count: usize,
    pub zap_status: String,
    pub active_interfaces: BTreeMap<String, String>,
    pub uptime: String,
    pub ram_usage: f32,
    pub cpu_usage: f32,
    pub disk_usage: f32,
    pub active_connections: usize,
    pub current_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRequest {
    pub total_running_scan_count: usize,
    pub docker_type: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<TargetData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetData {
    #[serde(default)]
    pub targets: Option<Vec<String>>,
}

impl TargetResponse {
    pub fn into_targets(self) -> Vec<String> {
        if !self.success {
            return vec![];
        }
        self.data.and_then(|d| d.targets).unwrap_or_default()
    }
}
