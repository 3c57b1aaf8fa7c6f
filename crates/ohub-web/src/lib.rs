//! JSON HTTP surface over the sync pipeline.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ohub_adapters::FetchFilters;
use ohub_storage::StoreError;
use ohub_sync::{SyncConfig, SyncPipeline};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info};

pub const CRATE_NAME: &str = "ohub-web";

/// Upper bound on records returned by `action=fetch`.
pub const FETCH_LIMIT: usize = 500;

const CORS_ALLOW_METHODS: &str = "GET,POST,PUT,DELETE,OPTIONS";
const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Client-Info, Apikey";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SyncPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<SyncPipeline>) -> Self {
        Self { pipeline }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid action")]
    InvalidAction,
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidAction | ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(err) => {
                error!(error = %err, "opportunities request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Fetch,
    Sync,
    Status,
    Test,
}

impl FromStr for Action {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch" => Ok(Self::Fetch),
            "sync" => Ok(Self::Sync),
            "status" => Ok(Self::Status),
            "test" => Ok(Self::Test),
            _ => Err(ApiError::InvalidAction),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpportunitiesQuery {
    action: Option<String>,
    location: Option<String>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    property_type: Option<String>,
}

impl OpportunitiesQuery {
    fn filters(&self) -> FetchFilters {
        FetchFilters {
            location: self.location.clone(),
            min_price: self.min_price,
            max_price: self.max_price,
            property_type: self.property_type.clone(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/opportunities",
            get(opportunities_handler)
                .post(opportunities_handler)
                .options(preflight_handler),
        )
        .route("/health", get(health_handler))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(CORS_ALLOW_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        ))
        .with_state(Arc::new(state))
}

pub async fn serve(config: SyncConfig) -> anyhow::Result<()> {
    let pipeline = Arc::new(SyncPipeline::from_config(&config).await?);
    let listener = TcpListener::bind(("0.0.0.0", config.web_port)).await?;
    info!(port = config.web_port, "serving opportunities api");
    axum::serve(listener, app(AppState::new(pipeline))).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(SyncConfig::from_env()?).await
}

async fn opportunities_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<OpportunitiesQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::InvalidQuery(rejection.body_text()))?;
    let action = query
        .action
        .as_deref()
        .ok_or(ApiError::InvalidAction)?
        .parse::<Action>()?;
    let pipeline = &state.pipeline;

    let body = match action {
        Action::Fetch => {
            let opportunities = pipeline.list_active(FETCH_LIMIT).await?;
            json!({
                "success": true,
                "count": opportunities.len(),
                "opportunities": opportunities,
            })
        }
        Action::Sync => {
            let summary = pipeline.ingest(&query.filters()).await;
            let report = summary.report;
            json!({
                "success": true,
                "message": format!(
                    "Sync completed: {} added, {} updated, {} skipped",
                    report.added, report.updated, report.skipped
                ),
                "added": report.added,
                "updated": report.updated,
                "skipped": report.skipped,
                "total": report.total,
            })
        }
        Action::Status => json!({
            "success": true,
            "sources": pipeline.statuses(),
        }),
        Action::Test => json!({
            "success": true,
            "connections": pipeline.test_connections().await,
        }),
    };
    Ok(Json(body).into_response())
}

async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

async fn health_handler() -> &'static str {
    "ok"
}
