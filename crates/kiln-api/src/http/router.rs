//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`. Middleware: CORS, tracing.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/projects",
            get(handlers::project::list_projects).post(handlers::project::create_project),
        )
        .route("/projects/{id}", get(handlers::project::get_project))
        .route(
            "/projects/{id}/messages",
            get(handlers::message::list_messages).post(handlers::message::create_message),
        )
        .route("/fragments/{id}", get(handlers::fragment::get_fragment))
        .route(
            "/fragments/{id}/tree",
            get(handlers::fragment::get_fragment_tree),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness plus a database round trip (no user required).
async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    let database = state.db_pool.ping().await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        axum::Json(serde_json::json!({
            "status": if database { "ok" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
