//! HTTP application assembly.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::routes::{self, AppState};
use crate::domains::monitoring::pipeline::CrisisMonitor;
use crate::kernel::sse::{self, SseState};

/// Build the full router: JSON reads/commands, push ingestion, SSE streams.
pub fn build_app(monitor: Arc<CrisisMonitor>) -> Router {
    let sse_state = SseState {
        hub: monitor.deps().hub.clone(),
    };

    Router::new()
        .merge(routes::router(AppState { monitor }))
        .merge(sse::router(sse_state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
