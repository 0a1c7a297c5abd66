//! API route definitions.

use super::state::AppState;
use crate::analysis::compute_kpis;
use crate::analysis::report::render_report;
use crate::analysis::stats::{state_summary, SUMMARY_WINDOW_HOURS};
use crate::config::ConfigError;
use crate::detect::anomaly::scan_anomalies;
use crate::detect::events::NewManualStop;
use crate::detect::{alert_level, ClassificationRequest, ClassifyError};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::error;
use uuid::Uuid;

const DEFAULT_TIMELINE_LIMIT: usize = 50;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/kpis", get(kpis))
        .route("/anomalies", get(anomalies))
        .route("/detections/run", post(run_detection))
        .route("/detections/stats", get(detection_stats))
        .route("/stops/unclassified", get(unclassified))
        .route("/stops/{id}", get(get_stop))
        .route("/stops/{id}/classify", post(classify))
        .route("/stops/manual", get(list_manual).post(add_manual))
        .route("/stops/timeline", get(timeline))
        .route("/config", get(get_config))
        .route("/config/{key}", put(set_config))
        .route("/report", get(report))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(e) => {
                error!("request failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        let body = json!({
            "error": { "status": status.as_u16(), "message": message },
            "meta": meta(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl From<ClassifyError> for ApiError {
    fn from(e: ClassifyError) -> Self {
        match e {
            ClassifyError::NotFound(_) => ApiError::NotFound(e.to_string()),
            ClassifyError::AlreadyClassified(_) => ApiError::Conflict(e.to_string()),
            ClassifyError::Storage(inner) => ApiError::Internal(inner),
        }
    }
}

fn config_error(e: anyhow::Error) -> ApiError {
    let unknown_key = e
        .downcast_ref::<ConfigError>()
        .map(|c| matches!(c, ConfigError::UnknownKey(_)));
    match unknown_key {
        Some(true) => ApiError::NotFound(e.to_string()),
        Some(false) => ApiError::BadRequest(e.to_string()),
        None => ApiError::Internal(e),
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run synchronous storage work off the async runtime.
async fn blocking<T, E, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(Into::into)
}

fn meta() -> Value {
    json!({
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnomalyQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub multiplier: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SetConfigBody {
    pub value: Value,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

async fn status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let config = state.config_snapshot().await;
    let samples = state.samples();
    let events = state.events();
    let (latest, count, span, pending, recent) = blocking(move || -> anyhow::Result<_> {
        Ok((
            samples.latest()?,
            samples.count()?,
            samples.span()?,
            events.unclassified_events()?.len(),
            samples.recent(SUMMARY_WINDOW_HOURS)?,
        ))
    })
    .await?;

    let alert = latest.as_ref().map(|s| alert_level(s, &config));
    let magnitude = latest.as_ref().map(|s| s.magnitude());
    Ok(Json(json!({
        "data": {
            "latest": latest,
            "magnitude": magnitude,
            "alert_level": alert,
            "sample_count": count,
            "first_sample": span.map(|(first, _)| first),
            "last_sample": span.map(|(_, last)| last),
            "unclassified_stops": pending,
            "state_summary": state_summary(&recent),
            "auto_detection_enabled": config.auto_detection_enabled,
        },
        "meta": meta()
    })))
}

async fn kpis(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> ApiResult<Json<Value>> {
    let samples = state.samples();
    let (start, end) = (q.start, q.end);
    let window = blocking(move || samples.load(start, end)).await?;
    let map = compute_kpis(&window, None, None);
    Ok(Json(json!({
        "data": map,
        "meta": { "samples": window.len(), "start": start, "end": end }
    })))
}

async fn anomalies(
    State(state): State<AppState>,
    Query(q): Query<AnomalyQuery>,
) -> ApiResult<Json<Value>> {
    let config = state.config_snapshot().await;
    let multiplier = q.multiplier.unwrap_or(config.anomaly_multiplier);
    if !multiplier.is_finite() || multiplier < 0.0 {
        return Err(ApiError::BadRequest(format!("invalid multiplier {}", multiplier)));
    }

    let samples = state.samples();
    let (start, end) = (q.start, q.end);
    let window = blocking(move || samples.load(start, end)).await?;
    let mut found = scan_anomalies(&window, multiplier);
    let total = found.len();
    if let Some(limit) = q.limit {
        found.truncate(limit);
    }

    Ok(Json(json!({
        "data": found,
        "meta": { "total": total, "multiplier": multiplier, "samples": window.len() }
    })))
}

async fn run_detection(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let config = state.config_snapshot().await;
    let engine = state.engine();
    let run = blocking(move || engine.run_once(&config, Utc::now())).await?;
    Ok(Json(json!({ "data": run, "meta": meta() })))
}

async fn detection_stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let events = state.events();
    let (automatic, manual) = blocking(move || -> anyhow::Result<_> {
        Ok((events.detection_stats()?, events.manual_summary()?))
    })
    .await?;
    Ok(Json(json!({
        "data": { "automatic": automatic, "manual": manual },
        "meta": meta()
    })))
}

async fn unclassified(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let events = state.events();
    let pending = blocking(move || events.unclassified_events()).await?;
    Ok(Json(json!({ "data": pending, "meta": { "total": pending.len() } })))
}

async fn get_stop(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let events = state.events();
    let stop = blocking(move || events.get_automatic(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no automatic stop with id {}", id)))?;
    Ok(Json(json!({ "data": stop, "meta": meta() })))
}

async fn classify(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ClassificationRequest>,
) -> ApiResult<Json<Value>> {
    if request.operator.trim().is_empty() {
        return Err(ApiError::BadRequest("operator is required".to_string()));
    }
    let events = state.events();
    let stop = blocking(move || events.classify_event(id, request, Utc::now())).await?;
    Ok(Json(json!({ "data": stop, "meta": meta() })))
}

async fn list_manual(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let events = state.events();
    let stops = blocking(move || events.manual_stops(q.limit)).await?;
    Ok(Json(json!({ "data": stops, "meta": { "total": stops.len() } })))
}

async fn add_manual(
    State(state): State<AppState>,
    Json(stop): Json<NewManualStop>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if stop.duration_minutes < 1 {
        return Err(ApiError::BadRequest(
            "duration_minutes must be at least 1".to_string(),
        ));
    }
    let events = state.events();
    let stored = blocking(move || events.add_manual_stop(stop)).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "data": stored, "meta": meta() })),
    ))
}

async fn timeline(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let events = state.events();
    let limit = q.limit.unwrap_or(DEFAULT_TIMELINE_LIMIT);
    let entries = blocking(move || events.timeline(Some(limit))).await?;
    Ok(Json(json!({ "data": entries, "meta": { "total": entries.len(), "limit": limit } })))
}

async fn get_config(State(state): State<AppState>) -> Json<Value> {
    let store = state.config.lock().await;
    let entries: Map<String, Value> = store
        .entries()
        .into_iter()
        .map(|(k, v)| (k.as_str().to_string(), json!(v)))
        .collect();
    Json(json!({
        "data": entries,
        "meta": { "path": store.path().display().to_string() }
    }))
}

async fn set_config(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<SetConfigBody>,
) -> ApiResult<Json<Value>> {
    let raw = match body.value {
        Value::String(s) => s,
        other => other.to_string(),
    };
    let config = state.config.clone();
    let updated_key = key.clone();
    let value = tokio::task::spawn_blocking(move || config.blocking_lock().set(&key, &raw))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(config_error)?;

    Ok(Json(json!({
        "data": { "key": updated_key, "value": value },
        "meta": meta()
    })))
}

async fn report(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> ApiResult<Json<Value>> {
    let config = state.config_snapshot().await;
    let samples = state.samples();
    let all = blocking(move || samples.load(None, None)).await?;
    let text = render_report(&all, q.start, q.end, config.anomaly_multiplier, Utc::now());
    Ok(Json(json!({ "data": { "report": text }, "meta": meta() })))
}
