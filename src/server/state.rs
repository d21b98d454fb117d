//! Shared application state handed to every route via `Extension<AppState>`,
//! the same pattern the reference monorepo's `server/app.rs` uses.

use crate::audit::ApiCallTracker;
use crate::config::AppConfig;
use crate::execution::{ExecutionRecordProjector, ScaleboxService};
use crate::external::CanvasLookup;
use crate::ingress::ApiKeyValidator;
use crate::schedule::ScheduleEngine;
use crate::variables::StaticFileLookup;
use crate::webhook::WebhookService;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis: ConnectionManager,
    pub config: Arc<AppConfig>,
    pub api_key_validator: Arc<dyn ApiKeyValidator>,
    pub canvas: Arc<dyn CanvasLookup>,
    pub files: Arc<dyn StaticFileLookup>,
    pub webhooks: Arc<WebhookService>,
    pub audit: Arc<ApiCallTracker>,
    pub projector: Arc<ExecutionRecordProjector>,
    pub scalebox: Arc<ScaleboxService>,
    pub schedule_engine: Arc<ScheduleEngine>,
}
