// Query executors for the supported databases
pub mod executor;
pub mod mysql;
pub mod postgresql;

pub use executor::QueryExecutor;
pub use mysql::MySQLExecutor;
pub use postgresql::PostgreSQLExecutor;

use crate::error::{QueryError, Result};
use crate::models::DatabaseType;
use crate::services::ConnectionPoolManager;
use std::sync::Arc;

/// Factory function to create the executor for a data source
/// PostgreSQL executors draw from the shared pool manager
pub async fn create_executor(
    db_type: DatabaseType,
    connection_url: &str,
    pool_manager: Arc<ConnectionPoolManager>,
) -> Result<Arc<dyn QueryExecutor>> {
    match db_type {
        DatabaseType::PostgreSQL => {
            let pool = pool_manager.get_or_create_pool(connection_url).await?;
            Ok(Arc::new(PostgreSQLExecutor::new(pool, connection_url)?))
        }
        DatabaseType::MySQL => Ok(Arc::new(MySQLExecutor::new(connection_url)?)),
        DatabaseType::MsSql => Err(QueryError::Connection(
            "no SQL Server driver is built in; supply a QueryExecutor for mssql".to_string(),
        )),
    }
}
