use serde::Serialize;
use std::collections::HashMap;

use super::value::NormalizedValue;
use crate::error::QueryError;

/// Tabular result: engine row order, engine column order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<NormalizedValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    /// Epoch milliseconds
    pub timestamp: f64,
    pub value: NormalizedValue,
}

impl Point {
    pub fn new(timestamp: f64, value: NormalizedValue) -> Self {
        Self { timestamp, value }
    }
}

/// A named series whose points are sorted by ascending timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<Point>,
}

impl Series {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: Vec::new(),
        }
    }
}

/// Execution details attached to a result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMeta {
    /// The expanded SQL handed to the executor
    pub sql: String,
    pub row_count: usize,
}

/// Result of one query, keyed by its refId in [`QueryResponse`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub ref_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<Table>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<Vec<Series>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<QueryMeta>,
}

impl QueryResult {
    pub fn new(ref_id: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            ..Default::default()
        }
    }

    pub fn with_tables(mut self, tables: Vec<Table>) -> Self {
        self.tables = Some(tables);
        self
    }

    pub fn with_series(mut self, series: Vec<Series>) -> Self {
        self.series = Some(series);
        self
    }

    pub fn with_meta(mut self, meta: QueryMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn failed(ref_id: impl Into<String>, error: &QueryError) -> Self {
        Self {
            ref_id: ref_id.into(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// All results of one request, keyed by refId
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResponse {
    pub results: HashMap<String, QueryResult>,
}

impl QueryResponse {
    pub fn get(&self, ref_id: &str) -> Option<&QueryResult> {
        self.results.get(ref_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_result_serialization() {
        let err = QueryError::Execution("boom".to_string());
        let result = QueryResult::failed("A", &err);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({ "refId": "A", "error": "boom" }));
    }

    #[test]
    fn test_series_result_serialization() {
        let mut series = Series::new("cpu");
        series.points.push(Point::new(1000.0, NormalizedValue::Float64(1.5)));
        series.points.push(Point::new(2000.0, NormalizedValue::Null));
        let result = QueryResult::new("B")
            .with_series(vec![series])
            .with_meta(QueryMeta { sql: "SELECT 1".to_string(), row_count: 2 });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["series"][0]["name"], "cpu");
        assert_eq!(json["series"][0]["points"][1]["value"], serde_json::Value::Null);
        assert_eq!(json["meta"]["rowCount"], 2);
        assert!(json.get("tables").is_none());
    }
}
