//! Health check handler

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use utoipa::ToSchema;

use super::super::state::AppState;
use super::super::types::ApiResponse;

/// Health check response data
#[derive(serde::Serialize, ToSchema)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_i64)]
    pub timestamp_ms: i64,
    /// Storage backend in use
    #[schema(example = "postgres")]
    pub storage: &'static str,
}

/// Health check endpoint
///
/// Pings PostgreSQL when that backend is configured. Internal details are
/// never exposed in the response.
///
/// - Healthy: 200 OK + {code: 0, data: {timestamp_ms, storage}}
/// - Unhealthy: 503 Service Unavailable + {code: 503, msg: "unavailable"}
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Service unavailable")
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let now_ms = chrono::Utc::now().timestamp_millis();

    let (healthy, storage) = match &state.pg_db {
        Some(db) => match db.health_check().await {
            Ok(()) => (true, "postgres"),
            Err(e) => {
                tracing::error!("[HEALTH] PostgreSQL ping failed: {}", e);
                (false, "postgres")
            }
        },
        None => (true, "memory"),
    };

    if healthy {
        (
            StatusCode::OK,
            Json(ApiResponse::success(HealthResponse {
                timestamp_ms: now_ms,
                storage,
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                code: 503,
                msg: "unavailable".to_string(),
                data: None,
            }),
        )
    }
}
