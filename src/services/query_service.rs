use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::QueryConfig;
use crate::error::{QueryError, Result};
use crate::models::{Query, QueryMeta, QueryResponse, QueryResult, TimeRange};
use crate::services::assembler::{Assembled, ResultAssembler};
use crate::services::database::QueryExecutor;
use crate::services::macros::MacroEngine;

/// Runs batches of queries: expand macros, execute, coerce and assemble.
///
/// Each query is evaluated independently and its outcome is stored under its
/// refId; a failing query never affects the others in the batch.
pub struct QueryService {
    executor: Arc<dyn QueryExecutor>,
    engine: MacroEngine,
    assembler: ResultAssembler,
    timeout_secs: u64,
    max_concurrency: usize,
}

impl QueryService {
    pub fn new(executor: Arc<dyn QueryExecutor>, config: &QueryConfig) -> Self {
        Self {
            engine: MacroEngine::for_database(executor.database_type()),
            executor,
            assembler: ResultAssembler::new(config.series_separator.clone()),
            timeout_secs: config.timeout_secs,
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    pub fn executor(&self) -> &dyn QueryExecutor {
        self.executor.as_ref()
    }

    /// Evaluate every query of a batch against `range`
    ///
    /// Queries run concurrently up to the configured limit. When a refId
    /// repeats, only its first occurrence is evaluated.
    pub async fn run_queries(&self, queries: Vec<Query>, range: &TimeRange) -> QueryResponse {
        let mut seen = HashSet::new();
        let unique: Vec<Query> = queries
            .into_iter()
            .filter(|q| {
                let first = seen.insert(q.ref_id.clone());
                if !first {
                    tracing::warn!("Skipping duplicate refId {}", q.ref_id);
                }
                first
            })
            .collect();

        tracing::info!(
            "Running {} queries on {} for range {} - {}",
            unique.len(),
            self.engine.dialect().dialect_name(),
            range.from,
            range.to
        );

        let results: Vec<QueryResult> = stream::iter(unique)
            .map(|query| self.run_query(query, range))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        QueryResponse {
            results: results
                .into_iter()
                .map(|result| (result.ref_id.clone(), result))
                .collect(),
        }
    }

    /// Evaluate one query; failures are captured in the returned result
    pub async fn run_query(&self, query: Query, range: &TimeRange) -> QueryResult {
        match self.evaluate(&query, range).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Query {} failed ({}): {}", query.ref_id, e.code(), e);
                QueryResult::failed(query.ref_id, &e)
            }
        }
    }

    async fn evaluate(&self, query: &Query, range: &TimeRange) -> Result<QueryResult> {
        let start_time = Instant::now();

        let expanded = self.engine.expand(&query.raw_sql, range)?;
        tracing::debug!("Expanded SQL for {}: {}", query.ref_id, expanded.sql);

        let raw = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.executor.execute(&expanded.sql, self.timeout_secs),
        )
        .await
        .map_err(|_| QueryError::Execution(format!("Query timeout after {} seconds", self.timeout_secs)))??;

        let row_count = raw.rows.len();
        let assembled = self.assembler.assemble(query.format, raw, &expanded, range)?;

        tracing::info!(
            "Query {} returned {} rows in {} ms",
            query.ref_id,
            row_count,
            start_time.elapsed().as_millis()
        );

        let result = QueryResult::new(query.ref_id.clone()).with_meta(QueryMeta {
            sql: expanded.sql,
            row_count,
        });

        Ok(match assembled {
            Assembled::Table(table) => result.with_tables(vec![table]),
            Assembled::Series(series) => result.with_series(series),
        })
    }
}
