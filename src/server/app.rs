//! Application router (spec §6 EXTERNAL INTERFACES), grounged in the
//! reference monorepo's `server/app.rs` layering: routes, then
//! `Extension(state)`, CORS, and `TraceLayer`, applied last-added-runs-first.

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::routing::{get, post};
use axum::{middleware, Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::server::middleware::extract_client_ip;
use crate::server::routes::{
    health::health_handler,
    trigger::{openapi_workflow_run_handler, webhook_run_handler},
    webhook_admin::{
        webhook_config_handler, webhook_disable_handler, webhook_enable_handler,
        webhook_history_handler, webhook_reset_handler, webhook_update_handler,
    },
};
use crate::server::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/v1/openapi/webhook/:webhook_id/run",
            post(webhook_run_handler),
        )
        .route("/v1/openapi/workflow/run", post(openapi_workflow_run_handler))
        .route("/v1/webhook/enable", post(webhook_enable_handler))
        .route("/v1/webhook/disable", post(webhook_disable_handler))
        .route("/v1/webhook/reset", post(webhook_reset_handler))
        .route("/v1/webhook/update", post(webhook_update_handler))
        .route("/v1/webhook/config", get(webhook_config_handler))
        .route("/v1/webhook/history", get(webhook_history_handler))
        .layer(middleware::from_fn(extract_client_ip))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(120)))
}
