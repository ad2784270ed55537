// Query executor trait: the only boundary between this service and a database
use crate::error::Result;
use crate::models::{DatabaseType, RawResultSet};

/// Runs dialect SQL and returns the driver-native result set.
///
/// Implementations report driver failures as [`QueryError::Execution`] with
/// the driver's own message, and must honor `timeout_secs`.
///
/// [`QueryError::Execution`]: crate::error::QueryError::Execution
#[async_trait::async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str, timeout_secs: u64) -> Result<RawResultSet>;

    fn database_type(&self) -> DatabaseType;

    /// Check that a connection can be obtained
    async fn test_connection(&self) -> Result<()>;
}
