use serde::{Deserialize, Serialize};

use super::time_range::TimeRange;

/// Requested output shape of a query
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryFormat {
    Table,
    #[default]
    TimeSeries,
}

/// One logical query of a request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub ref_id: String,
    /// SQL text, possibly embedding `$__name(...)` macros
    pub raw_sql: String,
    #[serde(default)]
    pub format: QueryFormat,
}

impl Query {
    pub fn new(ref_id: impl Into<String>, raw_sql: impl Into<String>, format: QueryFormat) -> Self {
        Self {
            ref_id: ref_id.into(),
            raw_sql: raw_sql.into(),
            format,
        }
    }

    pub fn table(ref_id: impl Into<String>, raw_sql: impl Into<String>) -> Self {
        Self::new(ref_id, raw_sql, QueryFormat::Table)
    }

    pub fn time_series(ref_id: impl Into<String>, raw_sql: impl Into<String>) -> Self {
        Self::new(ref_id, raw_sql, QueryFormat::TimeSeries)
    }
}

/// Request body accepted by the query endpoint
///
/// `from` and `to` use the formats accepted by [`TimeRange::parse`].
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub from: String,
    pub to: String,
    pub queries: Vec<Query>,
}

impl QueryRequest {
    pub fn time_range(&self, now: chrono::DateTime<chrono::Utc>) -> Result<TimeRange, String> {
        TimeRange::parse(&self.from, &self.to, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_deserialization() {
        let body = serde_json::json!({
            "from": "1521117000000",
            "to": "1521122100000",
            "queries": [
                { "refId": "A", "rawSql": "SELECT 1", "format": "table" },
                { "refId": "B", "rawSql": "SELECT $__timeEpoch(time), value FROM metric" }
            ]
        });
        let request: QueryRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.queries.len(), 2);
        assert_eq!(request.queries[0].format, QueryFormat::Table);
        assert_eq!(request.queries[1].format, QueryFormat::TimeSeries);
        assert_eq!(request.queries[1].ref_id, "B");
    }

    #[test]
    fn test_format_wire_names() {
        assert_eq!(serde_json::to_value(QueryFormat::TimeSeries).unwrap(), "time_series");
        assert_eq!(serde_json::to_value(QueryFormat::Table).unwrap(), "table");
    }
}
