//! JSON routes the dashboard consumes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::domains::monitoring::errors::MonitorError;
use crate::domains::monitoring::models::MonitoringEvent;
use crate::domains::monitoring::pipeline::CrisisMonitor;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<CrisisMonitor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/events", get(recent_events))
        .route("/api/alerts", get(active_alerts))
        .route("/api/alerts/{id}/acknowledge", post(acknowledge_alert))
        .route("/api/alerts/{id}/resolve", post(resolve_alert))
        .route("/api/metrics", get(metrics))
        .route("/api/ingest", post(ingest))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    if state.monitor.is_healthy() {
        Json(serde_json::json!({"status": "healthy"})).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "unhealthy"})),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    limit: Option<i64>,
    since: Option<DateTime<Utc>>,
}

async fn recent_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Response {
    match state
        .monitor
        .recent_events(query.limit.unwrap_or(50), query.since)
        .await
    {
        Ok(events) => Json(events).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn active_alerts(State(state): State<AppState>) -> Response {
    match state.monitor.active_alerts().await {
        Ok(alerts) => Json(alerts).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize, Default)]
struct ActorBody {
    #[serde(default)]
    actor: Option<String>,
}

impl ActorBody {
    fn actor(&self) -> String {
        self.actor.clone().unwrap_or_else(|| "dashboard".to_string())
    }
}

async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActorBody>,
) -> Response {
    match state.monitor.acknowledge_alert(id, &body.actor()).await {
        Ok(alert) => Json(alert).into_response(),
        Err(e) => monitor_error_response(e),
    }
}

async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActorBody>,
) -> Response {
    match state.monitor.resolve_alert(id, &body.actor()).await {
        Ok(alert) => Json(alert).into_response(),
        Err(e) => monitor_error_response(e),
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    Json(state.monitor.get_metrics()).into_response()
}

/// Push/webhook ingestion. Shares the exact processing path with the poll
/// loop.
async fn ingest(
    State(state): State<AppState>,
    Json(events): Json<Vec<MonitoringEvent>>,
) -> Response {
    match state.monitor.process_events(events).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => internal_error(e),
    }
}

fn monitor_error_response(err: MonitorError) -> Response {
    let status = match &err {
        MonitorError::AlertNotFound { .. } => StatusCode::NOT_FOUND,
        MonitorError::InvalidTransition { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

fn internal_error(err: anyhow::Error) -> Response {
    tracing::error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "internal error"})),
    )
        .into_response()
}
