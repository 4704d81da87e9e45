//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // Namespaces
        .route(
            "/namespaces/:name",
            get(handlers::get_namespace).put(handlers::put_namespace),
        )
        // Certificate requests
        .route(
            "/certificaterequests",
            get(handlers::list_requests).post(handlers::create_request),
        )
        .route(
            "/certificaterequests/:namespace/:name",
            get(handlers::get_request)
                .put(handlers::update_request)
                .delete(handlers::delete_request),
        )
        .route(
            "/certificaterequests/:namespace/:name/deny",
            post(handlers::deny_request),
        )
        // Events
        .route("/events", get(handlers::get_events))
        .route("/events/stream", get(handlers::stream_events));

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
