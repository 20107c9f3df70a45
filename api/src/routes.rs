use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = state.settings.server.max_upload_bytes;

    let api_routes = Router::new()
        .route("/api/status", get(handlers::status::get_status))
        .route(
            "/api/config",
            get(handlers::config::get_config)
                .put(handlers::config::update_config)
                .post(handlers::config::update_config),
        )
        .route("/api/run", post(handlers::run::run_now))
        .route(
            "/api/upload",
            post(handlers::upload::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/wecom/callback",
            get(handlers::callback::verify_callback),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics_handler))
        .merge(api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
