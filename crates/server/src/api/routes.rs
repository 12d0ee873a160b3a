use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{files, handlers, middleware::metrics_middleware};
use crate::state::AppState;

const MIB: usize = 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config().server.max_upload_mb.saturating_mul(MIB);

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Capabilities
        .route("/formats", get(handlers::list_formats))
        .route("/engines", get(handlers::list_engines))
        .route("/notifications", get(handlers::list_notifications))
        // Files
        .route("/files", post(files::create_file).get(files::list_files))
        .route(
            "/files/{id}",
            get(files::get_file)
                .patch(files::update_file)
                .delete(files::delete_file),
        )
        .route("/files/{id}/convert", post(files::convert_file))
        .route("/files/{id}/cancel", post(files::cancel_file))
        .route("/files/{id}/download", get(files::download_file))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(upload_limit))
}
