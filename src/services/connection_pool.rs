use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::NoTls;

use crate::error::{QueryError, Result};

/// Connection pool manager for PostgreSQL data sources
/// Each connection URL gets its own pool, created on first use
pub struct ConnectionPoolManager {
    pools: Arc<RwLock<HashMap<String, Pool>>>,
    max_pool_size: usize,
}

impl ConnectionPoolManager {
    pub fn new() -> Self {
        Self::with_max_size(16)
    }

    pub fn with_max_size(max_pool_size: usize) -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
            max_pool_size,
        }
    }

    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    /// Get or create a connection pool for the given connection URL
    /// This method is safe to call concurrently from multiple tasks
    pub async fn get_or_create_pool(&self, connection_url: &str) -> Result<Pool> {
        // Fast path: check if pool already exists (read lock)
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(connection_url) {
                tracing::debug!("Using existing connection pool for: {}", mask_credentials(connection_url));
                return Ok(pool.clone());
            }
        }

        let mut pools = self.pools.write().await;

        // Another task may have created the pool while we waited for the write lock
        if let Some(pool) = pools.get(connection_url) {
            return Ok(pool.clone());
        }

        tracing::info!(
            "Creating new connection pool for: {} (max_size: {})",
            mask_credentials(connection_url),
            self.max_pool_size
        );

        let mut cfg = PoolConfig::new();
        cfg.url = Some(connection_url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)
            .map_err(|e| {
                tracing::error!("Failed to create connection pool: {}", e);
                QueryError::Connection(format!("Failed to create connection pool: {}", e))
            })?;
        pool.resize(self.max_pool_size);

        pools.insert(connection_url.to_string(), pool.clone());
        Ok(pool)
    }

    pub async fn pool_count(&self) -> usize {
        self.pools.read().await.len()
    }
}

impl Default for ConnectionPoolManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Mask credentials in connection URL for safe logging
pub fn mask_credentials(url: &str) -> String {
    if let Ok(parsed_url) = url::Url::parse(url) {
        let mut masked = parsed_url.clone();
        if parsed_url.password().is_some() {
            let _ = masked.set_password(Some("***"));
        }
        masked.to_string()
    } else {
        "[invalid-url]".to_string()
    }
}
