use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    error::ScannerError,
    models::{ActionEnvelope, EngineScan, OnlineStatus, Site},
};

#[cfg(test)]
pub(crate) mod fake_zap;
#[cfg(test)]
pub(crate) mod scripted;

/// Query/action surface of the external scanning engine.
///
/// Read operations return the engine's JSON verbatim. A non-200 answer or a
/// transport failure becomes a [`ScannerError`]. The two probes
/// (`is_online`, `create_context`) never fail; they collapse every problem
/// into their envelope instead.
#[async_trait::async_trait]
pub trait ScanEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn is_online(&self) -> OnlineStatus;

    async fn create_context(&self, name: &str) -> ActionEnvelope;

    async fn access_url(&self, url: &str) -> Result<(), ScannerError>;

    async fn include_in_context(&self, context: &str, regex: &str) -> Result<(), ScannerError>;

    /// Starts an active scan and yields the engine's scan id when it reports one.
    async fn start_scan(&self, url: &str) -> Result<Option<String>, ScannerError>;

    async fn scan_status(&self, scan_id: &str) -> Result<Value, ScannerError>;

    /// Alert feed, optionally narrowed to one base URL.
    async fn alerts(&self, base_url: Option<&str>) -> Result<Value, ScannerError>;

    async fn contexts(&self) -> Result<Value, ScannerError>;

    async fn delete_context(&self, name: &str) -> Result<(), ScannerError>;

    async fn scans(&self) -> Result<Vec<EngineScan>, ScannerError>;

    /// Ensures the context exists, marks the URL accessed and includes it in the context.
    async fn add_site(&self, site: &Site) -> Result<ActionEnvelope, ScannerError> {
        let created = self.create_context(&site.context).await;
        if !created.success {
            // Usually "already exists"; inclusion below decides the outcome.
            debug!(context = %site.context, message = %created.message, "context create skipped");
        }
        self.access_url(&site.url).await?;
        self.include_in_context(&site.context, &site.include_regex())
            .await?;
        info!(url = %site.url, context = %site.context, "site included in context");
        Ok(ActionEnvelope::ok(
            "Site successfully added to ZAP and included in context",
        ))
    }
}

pub struct ZapAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ZapAdapter {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("failed to build scanning engine http client")?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/JSON/{}/", self.base_url, endpoint)
    }

    async fn call(
        &self,
        endpoint: &'static str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, ScannerError> {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("apikey", self.api_key.as_str()));
        self.client
            .get(self.endpoint_url(endpoint))
            .query(&query)
            .send()
            .await
            .map_err(|source| ScannerError::Transport { endpoint, source })
    }

    async fn call_ok(
        &self,
        endpoint: &'static str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, ScannerError> {
        let response = self.call(endpoint, params).await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ScannerError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn call_json(
        &self,
        endpoint: &'static str,
        params: &[(&str, &str)],
    ) -> Result<Value, ScannerError> {
        self.call_ok(endpoint, params)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| ScannerError::Decode {
                endpoint,
                reason: e.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl ScanEngine for ZapAdapter {
    fn name(&self) -> &'static str {
        "zap"
    }

    async fn is_online(&self) -> OnlineStatus {
        let response = match self.call("core/view/version", &[]).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "failed to connect to scanning engine");
                return OnlineStatus::offline(e.to_string());
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            warn!(status = response.status().as_u16(), "unexpected status from scanning engine");
            return OnlineStatus::offline("Received unexpected status code");
        }
        let version = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("version").and_then(Value::as_str).map(str::to_string));
        debug!(version = ?version, "scanning engine online");
        OnlineStatus::online(version)
    }

    async fn create_context(&self, name: &str) -> ActionEnvelope {
        let created = async {
            let response = self
                .call_ok("context/action/newContext", &[("contextName", name)])
                .await?;
            response
                .json::<Value>()
                .await
                .map_err(|e| ScannerError::Decode {
                    endpoint: "context/action/newContext",
                    reason: e.to_string(),
                })
        }
        .await;

        match created {
            Ok(_) => ActionEnvelope::ok(format!("Context '{name}' successfully created")),
            Err(e) => {
                debug!(context = name, error = %e, "context create failed");
                ActionEnvelope::failed("Failed to create context")
            }
        }
    }

    async fn access_url(&self, url: &str) -> Result<(), ScannerError> {
        self.call_ok("core/action/accessUrl", &[("url", url)])
            .await
            .map(|_| ())
    }

    async fn include_in_context(&self, context: &str, regex: &str) -> Result<(), ScannerError> {
        self.call_ok(
            "context/action/includeInContext",
            &[("contextName", context), ("regex", regex)],
        )
        .await
        .map(|_| ())
    }

    async fn start_scan(&self, url: &str) -> Result<Option<String>, ScannerError> {
        let response = self.call("ascan/action/scan", &[("url", url)]).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScannerError::Status {
                endpoint: "ascan/action/scan",
                status: status.as_u16(),
            });
        }
        let scan_id = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("scan").and_then(Value::as_str).map(str::to_string));
        Ok(scan_id)
    }

    async fn scan_status(&self, scan_id: &str) -> Result<Value, ScannerError> {
        self.call_json("ascan/view/status", &[("scanId", scan_id)])
            .await
    }

    async fn alerts(&self, base_url: Option<&str>) -> Result<Value, ScannerError> {
        match base_url {
            Some(url) => self.call_json("alert/view/alerts", &[("baseurl", url)]).await,
            None => self.call_json("alert/view/alerts", &[]).await,
        }
    }

    async fn contexts(&self) -> Result<Value, ScannerError> {
        self.call_json("context/view/contexts", &[]).await
    }

    async fn delete_context(&self, name: &str) -> Result<(), ScannerError> {
        self.call_ok("context/action/removeContext", &[("contextName", name)])
            .await
            .map(|_| ())
    }

    async fn scans(&self) -> Result<Vec<EngineScan>, ScannerError> {
        let reply = self.call_json("ascan/view/scans", &[]).await?;
        match reply.get("scans") {
            None | Some(Value::Null) => Ok(vec![]),
            Some(list) => {
                serde_json::from_value(list.clone()).map_err(|e| ScannerError::Decode {
                    endpoint: "ascan/view/scans",
                    reason: e.to_string(),
                })
            }
        }
    }
}
