//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Headroom over the maximum chunk size for request bodies.
const CHUNK_UPLOAD_BUFFER: usize = 1024;

/// Prefix under which published artifacts are served.
pub const FILES_PREFIX: &str = "/files";

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.server.max_chunk_size)
        .unwrap_or(usize::MAX)
        .saturating_add(CHUNK_UPLOAD_BUFFER);

    let api_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/uploads/exists", get(handlers::check_exists))
        .route(
            "/v1/uploads/{fingerprint}/chunks/{index}",
            put(handlers::upload_chunk),
        )
        .route(
            "/v1/uploads/{fingerprint}/merge",
            post(handlers::merge_upload),
        )
        .route("/v1/uploads/{fingerprint}", delete(handlers::cancel_upload))
        .layer(DefaultBodyLimit::max(body_limit));

    let files = ServeDir::new(&state.config.storage.publish_root);
    let mut router = Router::new()
        .merge(api_routes)
        .nest_service(FILES_PREFIX, files);

    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(hide_unpublished_files))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// In-progress artifacts are dot-prefixed temp files in the publish root;
/// never serve them.
async fn hide_unpublished_files(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if let Some(rest) = path.strip_prefix(FILES_PREFIX)
        && rest.split('/').any(|segment| {
            segment.starts_with('.') || segment.to_ascii_lowercase().starts_with("%2e")
        })
    {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}
