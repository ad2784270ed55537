use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::handlers::{query, AppState};
use crate::api::middleware::request_id;
use crate::services::QueryService;

/// Create router with application state
pub fn create_router(query_service: Arc<QueryService>) -> Router {
    let state = AppState { query_service };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/tsdb/query", post(query::execute_queries))
        .route("/api/tsdb/test", get(query::test_datasource))
        .layer(middleware::from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::REQUEST_ID_HEADER;
    use crate::config::QueryConfig;
    use crate::error::QueryError;
    use crate::models::DatabaseType;
    use crate::services::query_service::tests::{bucketed_metric, FakeExecutor, T13_00};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(executor: FakeExecutor) -> Router {
        let config = QueryConfig {
            timeout_secs: 5,
            max_concurrency: 2,
            series_separator: " ".to_string(),
        };
        create_router(Arc::new(QueryService::new(Arc::new(executor), &config)))
    }

    fn metric_app() -> Router {
        app(FakeExecutor::new(DatabaseType::MsSql, |_| Ok(bucketed_metric())))
    }

    async fn post_query(app: Router, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/tsdb/query")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = metric_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_query_endpoint_returns_filled_series() {
        let (status, body) = post_query(
            metric_app(),
            json!({
                "from": T13_00.to_string(),
                "to": (T13_00 + 34 * 60_000).to_string(),
                "queries": [{
                    "refId": "A",
                    "rawSql": "SELECT $__timeGroup(time, '5m', NULL) AS time, avg(value) AS value FROM metric GROUP BY 1",
                    "format": "time_series"
                }]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let points = body["results"]["A"]["series"][0]["points"].as_array().unwrap();
        assert_eq!(points.len(), 7);
        assert_eq!(points[3]["value"], Value::Null);
        assert_eq!(points[0]["value"], json!(15.0));
        assert_eq!(body["results"]["A"]["meta"]["rowCount"], json!(6));
    }

    #[tokio::test]
    async fn test_query_endpoint_isolates_failures() {
        let (status, body) = post_query(
            metric_app(),
            json!({
                "from": "2018-03-15T13:00:00Z",
                "to": "2018-03-15T13:34:00Z",
                "queries": [
                    {"refId": "A", "rawSql": "SELECT time, value FROM metric", "format": "table"},
                    {"refId": "B", "rawSql": "SELECT $__timeGroup(time) FROM metric"}
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"]["A"]["tables"][0]["rows"].as_array().unwrap().len(), 6);
        assert!(body["results"]["A"].get("error").is_none());
        assert!(body["results"]["B"]["error"]
            .as_str()
            .unwrap()
            .contains("$__timeGroup(time)"));
    }

    #[tokio::test]
    async fn test_query_endpoint_rejects_bad_requests() {
        let (status, body) = post_query(
            metric_app(),
            json!({"from": "now-1h", "to": "now", "queries": []}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _) = post_query(
            metric_app(),
            json!({
                "from": "now",
                "to": "now-1h",
                "queries": [{"refId": "A", "rawSql": "SELECT 1"}]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_datasource_check() {
        let response = metric_app()
            .oneshot(Request::builder().uri("/api/tsdb/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["database"], "mssql");
    }

    #[tokio::test]
    async fn test_executor_errors_are_reported_per_query() {
        let failing = FakeExecutor::new(DatabaseType::MySQL, |_| {
            Err(QueryError::Connection("refused".to_string()))
        });
        let (status, body) = post_query(
            app(failing),
            json!({
                "from": "now-1h",
                "to": "now",
                "queries": [{"refId": "A", "rawSql": "SELECT 1", "format": "table"}]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"]["A"]["error"], "Connection error: refused");
    }
}
