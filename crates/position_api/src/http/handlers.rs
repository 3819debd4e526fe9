//! Vehicle position query routes
//!
//! - `GET /health`
//! - `GET /vehicles/:vehicle_id/location` latest stored report
//! - `GET /vehicles/:vehicle_id/history?start=<secs>&end=<secs>` inclusive range, newest first

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use common::domain::{PositionQueryRepository, PositionReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

type ApiState = Arc<dyn PositionQueryRepository>;

/// Build the query router over a position store
pub fn build_router(repository: Arc<dyn PositionQueryRepository>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/vehicles/:vehicle_id/location", get(vehicle_location))
        .route("/vehicles/:vehicle_id/history", get(vehicle_history))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(repository)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LocationResponse {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: i64,
}

impl From<PositionReport> for LocationResponse {
    fn from(report: PositionReport) -> Self {
        Self {
            vehicle_id: report.vehicle_id,
            latitude: report.latitude,
            longitude: report.longitude,
            timestamp: report.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub data: Vec<LocationResponse>,
}

/// Raw query bounds; parsed by hand so missing and malformed values get distinct messages
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: &'static str,
}

/// Error response rendered as `{"message": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    fn bad_request(message: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn not_found(message: &'static str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "error querying database",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn vehicle_location(
    State(repository): State<ApiState>,
    Path(vehicle_id): Path<String>,
) -> Result<Json<LocationResponse>, ApiError> {
    match repository.latest_position(&vehicle_id).await {
        Ok(Some(report)) => Ok(Json(report.into())),
        Ok(None) => Err(ApiError::not_found("vehicle's location not found")),
        Err(e) => {
            error!(vehicle_id = %vehicle_id, error = %e, "failed to query vehicle location");
            Err(ApiError::internal())
        }
    }
}

async fn vehicle_history(
    State(repository): State<ApiState>,
    Path(vehicle_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let (start, end) = parse_bounds(&params)?;

    let reports = repository
        .position_history(&vehicle_id, start, end)
        .await
        .map_err(|e| {
            error!(vehicle_id = %vehicle_id, error = %e, "failed to query vehicle history");
            ApiError::internal()
        })?;

    if reports.is_empty() {
        return Err(ApiError::not_found("no history found"));
    }

    debug!(vehicle_id = %vehicle_id, rows = reports.len(), "served vehicle history");
    Ok(Json(HistoryResponse {
        data: reports.into_iter().map(LocationResponse::from).collect(),
    }))
}

fn parse_bounds(params: &HistoryParams) -> Result<(i64, i64), ApiError> {
    let present = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());

    let (Some(start), Some(end)) = (present(&params.start), present(&params.end)) else {
        return Err(ApiError::bad_request(
            "start and end query parameters are required",
        ));
    };

    let start = start
        .parse::<i64>()
        .map_err(|_| ApiError::bad_request("invalid start timestamp"))?;
    let end = end
        .parse::<i64>()
        .map_err(|_| ApiError::bad_request("invalid end timestamp"))?;

    Ok((start, end))
}
