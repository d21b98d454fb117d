//! Database + Redis connectivity check (SPEC_FULL.md "Health and readiness
//! endpoint"), grounded in the reference monorepo's `health_handler`: a
//! timed `SELECT 1` plus pool stats, 200 if healthy else 503.

use crate::server::state::AppState;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: ComponentHealth,
    redis: ComponentHealth,
    connection_pool: ConnectionPoolHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectionPoolHealth {
    size: u32,
    idle_connections: usize,
    max_connections: u32,
}

pub async fn health_handler(Extension(state): Extension<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        sqlx::query("SELECT 1").execute(&state.pool),
    )
    .await
    {
        Ok(Ok(_)) => ok(),
        Ok(Err(e)) => err(format!("query failed: {e}")),
        Err(_) => err("query timeout (>5s)".to_string()),
    };

    let redis = match tokio::time::timeout(std::time::Duration::from_secs(5), {
        let mut conn = state.redis.clone();
        async move { redis::cmd("PING").query_async::<String>(&mut conn).await }
    })
    .await
    {
        Ok(Ok(_)) => ok(),
        Ok(Err(e)) => err(format!("ping failed: {e}")),
        Err(_) => err("ping timeout (>5s)".to_string()),
    };

    let pool_options = state.pool.options();
    let pool_health = ConnectionPoolHealth {
        size: state.pool.size(),
        idle_connections: state.pool.num_idle(),
        max_connections: pool_options.get_max_connections(),
    };

    let is_healthy = database.status == "ok" && redis.status == "ok";
    let status_code = if is_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            database,
            redis,
            connection_pool: pool_health,
        }),
    )
}

fn ok() -> ComponentHealth {
    ComponentHealth { status: "ok".to_string(), error: None }
}

fn err(message: String) -> ComponentHealth {
    ComponentHealth { status: "error".to_string(), error: Some(message) }
}
