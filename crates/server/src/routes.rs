//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::trace::trace_id_middleware;
use axum::Router;
use axum::middleware;
use axum::routing::{any, get};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Gateway routes accept every method; the dispatcher owns the allow-list.
    let gateway_routes = Router::new()
        .route("/", any(handlers::serve_by_query))
        .route("/stream", any(handlers::stream_by_query))
        .route("/stream/{token}", any(handlers::stream_by_path))
        .route("/download", any(handlers::download_by_query))
        .route("/dl/{token}", any(handlers::download_by_path))
        .fallback(handlers::unmatched);

    let ops_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats));

    let mut router = Router::new().merge(gateway_routes).merge(ops_routes);

    // Unauthenticated; mount only where scrapers need it.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
