use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::orchestrator::{AnalysisRequest, Orchestrator};
use crate::store::{AnalysisRecord, AnalysisStore, EvidenceSummary, StoreStats};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<AnalysisStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/analyze", post(analyze))
        .route("/api/v1/history", get(history))
        .route("/api/v1/analyses/{analysis_id}", get(analysis_by_id))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/evidence", get(evidence))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize, Default)]
struct UserQuery {
    user_id: Option<String>,
}

/// Entry point for startup analysis: runs the full pipeline, persists the
/// record, and returns it. Pipeline failures surface as one 500 — no
/// partial record is ever persisted.
async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalysisRecord>, (StatusCode, String)> {
    let record = state
        .orchestrator
        .run(request)
        .await
        .map_err(internal_error)?;
    state.store.append(record.clone()).map_err(internal_error)?;
    Ok(Json(record))
}

async fn history(
    State(state): State<AppState>,
    Query(q): Query<UserQuery>,
) -> Json<Vec<AnalysisRecord>> {
    Json(state.store.all(q.user_id.as_deref()))
}

async fn analysis_by_id(
    State(state): State<AppState>,
    Path(analysis_id): Path<String>,
    Query(q): Query<UserQuery>,
) -> Result<Json<AnalysisRecord>, (StatusCode, String)> {
    state
        .store
        .by_id(&analysis_id, q.user_id.as_deref())
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Analysis not found".to_string()))
}

async fn stats(State(state): State<AppState>, Query(q): Query<UserQuery>) -> Json<StoreStats> {
    Json(state.store.stats(q.user_id.as_deref()))
}

async fn evidence(
    State(state): State<AppState>,
    Query(q): Query<UserQuery>,
) -> Json<Vec<EvidenceSummary>> {
    Json(state.store.evidence(q.user_id.as_deref()))
}

fn internal_error(e: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(error = ?e, "analysis request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
