use axum::{extract::State, Json};
use chrono::Utc;

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::{QueryRequest, QueryResponse};

/// Evaluate a batch of queries over one time range
///
/// Per-query failures are returned inside the response; only a malformed
/// request is rejected as a whole.
pub async fn execute_queries(
    State(state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if payload.queries.is_empty() {
        return Err(AppError::Validation("At least one query is required".to_string()));
    }
    if payload.queries.iter().any(|q| q.ref_id.trim().is_empty()) {
        return Err(AppError::Validation("Every query needs a refId".to_string()));
    }

    let range = payload
        .time_range(Utc::now())
        .map_err(|e| AppError::Validation(format!("Invalid time range: {}", e)))?;

    tracing::info!(
        "Executing {} queries from {} to {}",
        payload.queries.len(),
        payload.from,
        payload.to
    );

    let response = state.query_service.run_queries(payload.queries, &range).await;

    Ok(Json(response))
}

/// Check that the configured data source accepts connections
pub async fn test_datasource(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let executor = state.query_service.executor();
    executor
        .test_connection()
        .await
        .map_err(|e| AppError::Connection(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "OK",
        "database": executor.database_type().as_str(),
    })))
}
