// SQL dialects for macro rendering
//
// Defines the trait and implementations that render time macros into
// database-specific SQL (SQL Server, PostgreSQL, MySQL).

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

use crate::models::DatabaseType;

/// Rendering policy for the dialect-specific parts of macro expansion
///
/// Range predicates built from epoch seconds are dialect neutral and are
/// rendered by the engine itself.
pub trait SqlDialect: Send + Sync {
    /// Get the name of this dialect (e.g., "PostgreSQL", "MySQL")
    fn dialect_name(&self) -> &str;

    fn database_type(&self) -> DatabaseType;

    /// Expression rounding `column` down to the start of its epoch-anchored
    /// bucket of `interval_secs`, in epoch milliseconds
    fn time_group(&self, column: &str, interval_secs: i64) -> String;

    /// Expression selecting `column` as epoch milliseconds, aliased `time`
    fn time_epoch(&self, column: &str) -> String;

    /// `column` aliased as the time column
    fn time_column(&self, column: &str) -> String;

    /// Literal for an instant, comparable against native datetime columns
    fn datetime_literal(&self, instant: &DateTime<Utc>) -> String;
}

/// SQL Server dialect
pub struct MsSqlDialect;

impl MsSqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MsSqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for MsSqlDialect {
    fn dialect_name(&self) -> &str {
        "SQL Server"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MsSql
    }

    fn time_group(&self, column: &str, interval_secs: i64) -> String {
        // DATEDIFF returns int; widen before scaling to milliseconds
        format!(
            "CAST(FLOOR(DATEDIFF(second, '1970-01-01', {})/{}.0) AS bigint)*{}",
            column,
            interval_secs,
            interval_secs * 1000
        )
    }

    fn time_epoch(&self, column: &str) -> String {
        format!(
            "CAST(DATEDIFF(second, '1970-01-01', {}) AS bigint)*1000 AS time",
            column
        )
    }

    fn time_column(&self, column: &str) -> String {
        format!("{} AS time", column)
    }

    fn datetime_literal(&self, instant: &DateTime<Utc>) -> String {
        format!("'{}'", instant.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// PostgreSQL dialect
pub struct PostgreSqlDialect;

impl PostgreSqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PostgreSqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for PostgreSqlDialect {
    fn dialect_name(&self) -> &str {
        "PostgreSQL"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn time_group(&self, column: &str, interval_secs: i64) -> String {
        format!(
            "floor(extract(epoch from {})/{})*{}",
            column,
            interval_secs,
            interval_secs * 1000
        )
    }

    fn time_epoch(&self, column: &str) -> String {
        format!("floor(extract(epoch from {})*1000) AS \"time\"", column)
    }

    fn time_column(&self, column: &str) -> String {
        format!("{} AS \"time\"", column)
    }

    fn datetime_literal(&self, instant: &DateTime<Utc>) -> String {
        format!("'{}'", instant.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

/// MySQL dialect
pub struct MySqlDialect;

impl MySqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MySqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for MySqlDialect {
    fn dialect_name(&self) -> &str {
        "MySQL"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn time_group(&self, column: &str, interval_secs: i64) -> String {
        format!(
            "FLOOR(UNIX_TIMESTAMP({})/{})*{}",
            column,
            interval_secs,
            interval_secs * 1000
        )
    }

    fn time_epoch(&self, column: &str) -> String {
        format!("FLOOR(UNIX_TIMESTAMP({})*1000) AS time", column)
    }

    fn time_column(&self, column: &str) -> String {
        format!("{} AS time", column)
    }

    fn datetime_literal(&self, instant: &DateTime<Utc>) -> String {
        // MySQL rejects the `Z` suffix, so go through epoch seconds
        let millis = instant.timestamp_subsec_millis();
        if millis == 0 {
            format!("FROM_UNIXTIME({})", instant.timestamp())
        } else {
            format!("FROM_UNIXTIME({}.{:03})", instant.timestamp(), millis)
        }
    }
}

/// Rendering policy for a database type
pub fn dialect_for(db_type: DatabaseType) -> Arc<dyn SqlDialect> {
    match db_type {
        DatabaseType::MsSql => Arc::new(MsSqlDialect::new()),
        DatabaseType::PostgreSQL => Arc::new(PostgreSqlDialect::new()),
        DatabaseType::MySQL => Arc::new(MySqlDialect::new()),
    }
}
