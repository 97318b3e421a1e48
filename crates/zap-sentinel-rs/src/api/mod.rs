use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    db,
    error::{ApiError, ApiResult},
    models::{ActionEnvelope, ActiveScans, AlertRecord, Site, SiteRequest},
    orchestrator, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    context_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ScanIdQuery {
    scan_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    url: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "zap-sentinel-rs"}))
}

fn site_from(state: &AppState, req: SiteRequest) -> ApiResult<Site> {
    if req.url.trim().is_empty() {
        return Err(ApiError::bad_request("url must not be empty"));
    }
    Ok(req.into_site(&state.config.default_context))
}

pub async fn create_context(
    State(state): State<AppState>,
    Query(q): Query<ContextQuery>,
) -> Json<ActionEnvelope> {
    Json(state.engine.create_context(&q.context_name).await)
}

pub async fn add_site(
    State(state): State<AppState>,
    Json(req): Json<SiteRequest>,
) -> ApiResult<Json<ActionEnvelope>> {
    let site = site_from(&state, req)?;
    Ok(Json(state.engine.add_site(&site).await?))
}

pub async fn start_scan(
    State(state): State<AppState>,
    Json(req): Json<SiteRequest>,
) -> ApiResult<Json<ActionEnvelope>> {
    let site = site_from(&state, req)?;
    let outcome = orchestrator::start_scan(state.engine.as_ref(), &site).await;
    Ok(Json(outcome.into_envelope()))
}

pub async fn scan_status(
    State(state): State<AppState>,
    Query(q): Query<ScanIdQuery>,
) -> ApiResult<Json<Value>> {
    Ok(Json(state.engine.scan_status(&q.scan_id).await?))
}

pub async fn scan_results_db(
    State(state): State<AppState>,
    Query(q): Query<UrlQuery>,
) -> ApiResult<Json<Value>> {
    let saved = orchestrator::persist_scan_results(state.engine.as_ref(), &state.pool, &q.url).await?;
    Ok(Json(json!({
        "message": "Scan results saved to database",
        "saved": saved,
    })))
}

pub async fn scan_results(
    State(state): State<AppState>,
    Query(q): Query<UrlQuery>,
) -> ApiResult<Json<Value>> {
    Ok(Json(state.engine.alerts(Some(q.url.as_str())).await?))
}

pub async fn scan_results_all(State(state): State<AppState>) -> ApiResult<Json<Vec<Value>>> {
    Ok(Json(orchestrator::all_alerts(state.engine.as_ref()).await?))
}

pub async fn contexts(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(state.engine.contexts().await?))
}

pub async fn delete_context(
    State(state): State<AppState>,
    Query(q): Query<ContextQuery>,
) -> ApiResult<Json<Value>> {
    state.engine.delete_context(&q.context_name).await?;
    Ok(Json(json!({
        "message": format!("Context '{}' successfully deleted", q.context_name),
    })))
}

pub async fn db_results(State(state): State<AppState>) -> ApiResult<Json<Vec<AlertRecord>>> {
    Ok(Json(db::list_all(&state.pool).await?))
}

pub async fn delete_db_results(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let deleted = db::delete_all(&state.pool).await?;
    Ok(Json(json!({
        "message": "All scan results deleted from database",
        "deleted": deleted,
    })))
}

pub async fn active_scans_count(State(state): State<AppState>) -> ApiResult<Json<ActiveScans>> {
    Ok(Json(orchestrator::active_scans(state.engine.as_ref()).await?))
}
