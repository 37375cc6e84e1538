//! Health and statistics endpoints.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use filegate_metadata::StoreStats;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub upstream: &'static str,
    pub metadata: &'static str,
    pub cache_entries: usize,
}

/// GET /health
///
/// Probes the metadata store only; upstream reachability is checked at startup.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, metadata) = match state.metadata.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!(error = %e, "metadata health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    let body = HealthResponse {
        status: if status.is_success() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        upstream: state.upstream.backend_name(),
        metadata,
        cache_entries: state.cache.len(),
    };
    (status, Json(body))
}

/// GET /stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StoreStats>> {
    Ok(Json(state.metadata.stats().await?))
}
