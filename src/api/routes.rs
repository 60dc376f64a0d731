use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_size as usize;

    Router::new()
        // Upload destinations and raw bytes
        .route("/api/objects/upload", post(handlers::request_upload))
        .route("/api/upload/:object_id", put(handlers::receive_upload))
        .route("/api/files/:object_id", get(handlers::serve_file))
        .route("/objects/*path", get(handlers::serve_private_object))
        .route("/public-objects/*path", get(handlers::serve_public_object))
        // Models
        .route(
            "/api/models",
            get(handlers::list_models).post(handlers::create_model),
        )
        .route(
            "/api/models/:id",
            get(handlers::get_model).delete(handlers::delete_model),
        )
        // Images
        .route(
            "/api/images",
            get(handlers::list_images).post(handlers::create_image),
        )
        .route(
            "/api/images/:id",
            get(handlers::get_image).delete(handlers::delete_image),
        )
        // Legacy single-request upload
        .route(
            "/upload",
            post(handlers::legacy_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Internal
        .route("/_internal/health", get(handlers::health))
        .layer(cors_layer(&state.config.server.frontend_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// An empty allowlist admits any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}
