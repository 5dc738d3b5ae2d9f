//! JSON API exposing the query façade over HTTP

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::model::TimeWindow;
use crate::query::QueryService;
use crate::RoomwatchError;

/// Dashboard application state
#[derive(Clone)]
pub struct DashboardState {
    pub queries: Arc<QueryService>,
}

/// Build the dashboard axum router
pub fn build_router(queries: Arc<QueryService>) -> Router {
    let dashboard_state = DashboardState { queries };

    Router::new()
        .route("/api/overview", get(overview_handler))
        .route("/api/buildings", get(directory_handler))
        .route("/api/buildings/{id}/sensors", get(building_sensors_handler))
        .route("/api/buildings/{id}/dashboard", get(building_dashboard_handler))
        .route("/api/buildings/{id}/stats", get(stats_handler))
        .route("/api/sensors/{id}/series", get(series_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(dashboard_state)
}

/// Error returned by API handlers, rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    Query(RoomwatchError),
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Query(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Query(RoomwatchError::StoreUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Query(RoomwatchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RoomwatchError> for ApiError {
    fn from(e: RoomwatchError) -> Self {
        ApiError::Query(e)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Query(e) => e.to_string(),
            ApiError::BadRequest(msg) => msg,
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult = std::result::Result<Response, ApiError>;

#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    #[serde(default)]
    pub sensor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WindowParams {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<WindowParams> for TimeWindow {
    fn from(params: WindowParams) -> Self {
        TimeWindow::new(params.start, params.end)
    }
}

async fn overview_handler(State(dashboard): State<DashboardState>) -> ApiResult {
    Ok(Json(dashboard.queries.overview().await?).into_response())
}

async fn directory_handler(State(dashboard): State<DashboardState>) -> ApiResult {
    Ok(Json(dashboard.queries.directory().await?).into_response())
}

async fn building_sensors_handler(
    State(dashboard): State<DashboardState>,
    Path(building_id): Path<String>,
) -> ApiResult {
    Ok(Json(dashboard.queries.building_sensors(&building_id).await?).into_response())
}

async fn building_dashboard_handler(
    State(dashboard): State<DashboardState>,
    Path(building_id): Path<String>,
    params: std::result::Result<Query<DashboardParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params?;
    // The page submits an empty selection as `sensor=`
    let sensor = params.sensor.as_deref().filter(|s| !s.is_empty());
    Ok(Json(
        dashboard
            .queries
            .building_dashboard(&building_id, sensor)
            .await?,
    )
    .into_response())
}

async fn stats_handler(
    State(dashboard): State<DashboardState>,
    Path(building_id): Path<String>,
    params: std::result::Result<Query<WindowParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params?;
    Ok(Json(dashboard.queries.stats(&building_id, params.into()).await?).into_response())
}

async fn series_handler(
    State(dashboard): State<DashboardState>,
    Path(sensor_id): Path<String>,
    params: std::result::Result<Query<WindowParams>, QueryRejection>,
) -> ApiResult {
    let Query(params) = params?;
    Ok(Json(dashboard.queries.series(&sensor_id, params.into()).await?).into_response())
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}
