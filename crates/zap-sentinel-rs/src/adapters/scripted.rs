//! Scripted [`ScanEngine`] that counts calls, for exercising callers without HTTP.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use serde_json::{json, Value};

use super::ScanEngine;
use crate::{
    error::ScannerError,
    models::{ActionEnvelope, EngineScan, OnlineStatus},
};

#[derive(Debug, Default)]
pub struct ScriptedEngine {
    online: bool,
    start_failures: AtomicUsize,
    fail_access: bool,
    fail_reads: bool,
    scan_progress: Vec<String>,
    alerts: Vec<Value>,
    pub start_calls: AtomicUsize,
    pub access_calls: AtomicUsize,
    pub include_calls: AtomicUsize,
    pub started_urls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn online() -> Self {
        Self {
            online: true,
            ..Self::default()
        }
    }

    pub fn offline() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    /// The first `n` scan starts are rejected by the engine.
    pub fn with_start_failures(self, n: usize) -> Self {
        self.start_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_scan_progress(mut self, progress: &[&str]) -> Self {
        self.scan_progress = progress.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_alerts(mut self, alerts: Vec<Value>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn failing_access(mut self) -> Self {
        self.fail_access = true;
        self
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn started_urls(&self) -> Vec<String> {
        self.started_urls.lock().expect("lock").clone()
    }

    fn read_guard(&self, endpoint: &'static str) -> Result<(), ScannerError> {
        if self.fail_reads {
            return Err(ScannerError::Status {
                endpoint,
                status: 502,
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ScanEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn is_online(&self) -> OnlineStatus {
        if self.online {
            OnlineStatus::online(Some("2.15.0".to_string()))
        } else {
            OnlineStatus::offline("connection refused")
        }
    }

    async fn create_context(&self, name: &str) -> ActionEnvelope {
        ActionEnvelope::ok(format!("Context '{name}' successfully created"))
    }

    async fn access_url(&self, _url: &str) -> Result<(), ScannerError> {
        self.access_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_access {
            return Err(ScannerError::Status {
                endpoint: "core/action/accessUrl",
                status: 500,
            });
        }
        Ok(())
    }

    async fn include_in_context(&self, _context: &str, _regex: &str) -> Result<(), ScannerError> {
        self.include_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_scan(&self, url: &str) -> Result<Option<String>, ScannerError> {
        let call = self.start_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.start_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.start_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ScannerError::Status {
                endpoint: "ascan/action/scan",
                status: 400,
            });
        }
        self.started_urls.lock().expect("lock").push(url.to_string());
        Ok(Some(call.to_string()))
    }

    async fn scan_status(&self, _scan_id: &str) -> Result<Value, ScannerError> {
        self.read_guard("ascan/view/status")?;
        Ok(json!({ "status": "42" }))
    }

    async fn alerts(&self, _base_url: Option<&str>) -> Result<Value, ScannerError> {
        self.read_guard("alert/view/alerts")?;
        Ok(json!({ "alerts": self.alerts }))
    }

    async fn contexts(&self) -> Result<Value, ScannerError> {
        self.read_guard("context/view/contexts")?;
        Ok(json!({ "contextList": ["Default Context"] }))
    }

    async fn delete_context(&self, _name: &str) -> Result<(), ScannerError> {
        self.read_guard("context/action/removeContext")
    }

    async fn scans(&self) -> Result<Vec<EngineScan>, ScannerError> {
        self.read_guard("ascan/view/scans")?;
        Ok(self
            .scan_progress
            .iter()
            .enumerate()
            .map(|(i, p)| EngineScan {
                id: Some(i.to_string()),
                progress: Some(p.clone()),
                state: None,
                extra: Default::default(),
            })
            .collect())
    }
}
