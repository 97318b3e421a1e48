//! In-process stand-in for the engine's JSON API, bound to an ephemeral port.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;

type Params = Query<HashMap<String, String>>;
type Shared = State<Arc<Mutex<FakeZapState>>>;
type Reply = (StatusCode, Json<Value>);

#[derive(Debug, Default)]
pub struct FakeZapState {
    pub contexts: Vec<String>,
    pub context_create_calls: usize,
    pub accessed: Vec<String>,
    pub included: Vec<(String, String)>,
    pub reject_access: bool,
    pub reject_include: bool,
    /// Scan starts that hang past any client timeout before answering.
    pub stalled_scans: usize,
    pub scans: Vec<(String, String)>,
    pub alerts: Vec<Value>,
    pub last_api_key: Option<String>,
}

impl FakeZapState {
    pub fn set_scans(&mut self, progress: &[&str]) {
        self.scans = progress
            .iter()
            .enumerate()
            .map(|(i, p)| (i.to_string(), p.to_string()))
            .collect();
    }

    pub fn push_alert(&mut self, id: &str, url: &str) {
        self.alerts.push(json!({
            "id": id,
            "url": url,
            "risk": "Medium",
            "description": "Missing anti-clickjacking header",
            "solution": "Set X-Frame-Options",
            "other": "",
            "reference": "https://owasp.org",
            "cweid": "1021",
            "wascid": "15",
            "name": "Missing Anti-clickjacking Header"
        }));
    }

    fn is_included(&self, url: &str) -> bool {
        self.included
            .iter()
            .any(|(_, regex)| url.starts_with(regex.trim_end_matches(".*")))
    }
}

pub struct FakeZap {
    pub base_url: String,
    pub state: Arc<Mutex<FakeZapState>>,
}

impl FakeZap {
    pub async fn spawn() -> Self {
        let state = Arc::new(Mutex::new(FakeZapState::default()));
        let app = Router::new()
            .route("/JSON/core/view/version/", get(version))
            .route("/JSON/context/action/newContext/", get(new_context))
            .route("/JSON/core/action/accessUrl/", get(access_url))
            .route("/JSON/context/action/includeInContext/", get(include_in_context))
            .route("/JSON/ascan/action/scan/", get(scan))
            .route("/JSON/ascan/view/status/", get(status))
            .route("/JSON/ascan/view/scans/", get(scans))
            .route("/JSON/alert/view/alerts/", get(alerts))
            .route("/JSON/context/view/contexts/", get(contexts))
            .route("/JSON/context/action/removeContext/", get(remove_context))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake engine");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }
}

fn ok(body: Value) -> Reply {
    (StatusCode::OK, Json(body))
}

fn bad(code: &str) -> Reply {
    (StatusCode::BAD_REQUEST, Json(json!({ "code": code })))
}

async fn version(State(state): Shared, Query(q): Params) -> Reply {
    state.lock().await.last_api_key = q.get("apikey").cloned();
    ok(json!({ "version": "2.15.0" }))
}

async fn new_context(State(state): Shared, Query(q): Params) -> Reply {
    let mut s = state.lock().await;
    s.context_create_calls += 1;
    let name = q.get("contextName").cloned().unwrap_or_default();
    if s.contexts.contains(&name) {
        return bad("already_exists");
    }
    s.contexts.push(name);
    ok(json!({ "contextId": s.contexts.len().to_string() }))
}

async fn access_url(State(state): Shared, Query(q): Params) -> Reply {
    let mut s = state.lock().await;
    if s.reject_access {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "code": "internal_error" })));
    }
    s.accessed.push(q.get("url").cloned().unwrap_or_default());
    ok(json!({ "Result": "OK" }))
}

async fn include_in_context(State(state): Shared, Query(q): Params) -> Reply {
    let mut s = state.lock().await;
    if s.reject_include {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "code": "internal_error" })));
    }
    let context = q.get("contextName").cloned().unwrap_or_default();
    if !s.contexts.contains(&context) {
        return bad("context_not_found");
    }
    let regex = q.get("regex").cloned().unwrap_or_default();
    s.included.push((context, regex));
    ok(json!({ "Result": "OK" }))
}

async fn scan(State(state): Shared, Query(q): Params) -> Reply {
    let stall = {
        let mut s = state.lock().await;
        let stall = s.stalled_scans > 0;
        s.stalled_scans = s.stalled_scans.saturating_sub(1);
        stall
    };
    if stall {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
    let mut s = state.lock().await;
    let url = q.get("url").cloned().unwrap_or_default();
    if !s.is_included(&url) {
        return bad("url_not_found");
    }
    let id = s.scans.len().to_string();
    s.scans.push((id.clone(), "0".to_string()));
    ok(json!({ "scan": id }))
}

async fn status(State(state): Shared, Query(q): Params) -> Reply {
    let s = state.lock().await;
    let id = q.get("scanId").cloned().unwrap_or_default();
    match s.scans.iter().find(|(scan_id, _)| *scan_id == id) {
        Some((_, progress)) => ok(json!({ "status": progress })),
        None => bad("does_not_exist"),
    }
}

async fn scans(State(state): Shared) -> Reply {
    let s = state.lock().await;
    let list: Vec<Value> = s
        .scans
        .iter()
        .map(|(id, progress)| {
            let label = if progress == "100" { "FINISHED" } else { "RUNNING" };
            json!({ "id": id, "progress": progress, "state": label })
        })
        .collect();
    ok(json!({ "scans": list }))
}

async fn alerts(State(state): Shared, Query(q): Params) -> Reply {
    let s = state.lock().await;
    let list: Vec<Value> = match q.get("baseurl") {
        Some(base) => s
            .alerts
            .iter()
            .filter(|a| a["url"].as_str().is_some_and(|u| u.starts_with(base.as_str())))
            .cloned()
            .collect(),
        None => s.alerts.clone(),
    };
    ok(json!({ "alerts": list }))
}

async fn contexts(State(state): Shared) -> Reply {
    ok(json!({ "contextList": state.lock().await.contexts.clone() }))
}

async fn remove_context(State(state): Shared, Query(q): Params) -> Reply {
    let mut s = state.lock().await;
    let name = q.get("contextName").cloned().unwrap_or_default();
    match s.contexts.iter().position(|c| *c == name) {
        Some(pos) => {
            s.contexts.remove(pos);
            ok(json!({ "Result": "OK" }))
        }
        None => bad("context_not_found"),
    }
}
