// MySQL executor using connection pooling
use crate::error::{QueryError, Result};
use crate::models::{ColumnMeta, DatabaseType, NativeValue, RawResultSet};
use crate::services::connection_pool::mask_credentials;
use crate::services::database::executor::QueryExecutor;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mysql_async::consts::ColumnType;
use mysql_async::{prelude::*, Column, Conn, Opts, Pool, Row, Value as MySqlValue};
use std::time::Instant;
use url::Url;

/// Character set id MySQL reports for binary strings and blobs
const BINARY_CHARSET: u16 = 63;

pub struct MySQLExecutor {
    pool: Pool,
}

impl MySQLExecutor {
    pub fn new(connection_url: &str) -> Result<Self> {
        let url = Url::parse(connection_url)
            .map_err(|e| QueryError::Connection(format!("Invalid MySQL URL: {}", e)))?;

        if url.scheme() != "mysql" && url.scheme() != "mariadb" {
            return Err(QueryError::Connection(
                "URL must use mysql:// or mariadb:// scheme".to_string(),
            ));
        }

        // The driver only understands the mysql scheme
        let normalized = connection_url.replacen("mariadb://", "mysql://", 1);
        let opts = Opts::from_url(&normalized)
            .map_err(|e| QueryError::Connection(format!("Invalid MySQL URL: {}", e)))?;

        tracing::info!("Creating MySQL pool for: {}", mask_credentials(connection_url));

        Ok(Self {
            pool: Pool::new(opts),
        })
    }

    async fn get_conn(&self) -> Result<Conn> {
        self.pool.get_conn().await.map_err(|e| {
            QueryError::Connection(format!("Failed to get MySQL connection from pool: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl QueryExecutor for MySQLExecutor {
    async fn execute(&self, sql: &str, timeout_secs: u64) -> Result<RawResultSet> {
        let mut conn = self.get_conn().await?;

        let start_time = Instant::now();

        let query = async {
            let mut result = conn.query_iter(sql).await?;
            let columns = result.columns();
            let rows: Vec<Row> = result.collect().await?;
            // Discard any further result sets of a multi-statement batch
            result.drop_result().await?;
            Ok::<_, mysql_async::Error>((columns, rows))
        };

        let (columns, rows) = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), query)
            .await
            .map_err(|_| QueryError::Execution(format!("Query timeout after {} seconds", timeout_secs)))?
            .map_err(execution_error)?;

        let columns: Vec<ColumnMeta> = columns
            .map(|cols| {
                cols.iter()
                    .map(|c| ColumnMeta::new(c.name_str(), column_type_name(c)))
                    .collect()
            })
            .unwrap_or_default();

        let raw_rows: Vec<Vec<NativeValue>> = rows
            .into_iter()
            .map(|mut row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        let value = row.take::<MySqlValue, _>(idx).unwrap_or(MySqlValue::NULL);
                        native_value(value, &column.type_name)
                    })
                    .collect()
            })
            .collect();

        tracing::debug!(
            "MySQL query returned {} rows in {} ms",
            raw_rows.len(),
            start_time.elapsed().as_millis()
        );

        Ok(RawResultSet::new(columns, raw_rows))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn test_connection(&self) -> Result<()> {
        let _conn = self.get_conn().await?;
        Ok(())
    }
}

fn execution_error(e: mysql_async::Error) -> QueryError {
    match e {
        mysql_async::Error::Server(server) => QueryError::Execution(server.message),
        other => QueryError::Execution(other.to_string()),
    }
}

/// Native type name for a result column, as used by value coercion
fn column_type_name(column: &Column) -> &'static str {
    let binary = column.character_set() == BINARY_CHARSET;
    match column.column_type() {
        ColumnType::MYSQL_TYPE_TINY => "tinyint",
        ColumnType::MYSQL_TYPE_SHORT => "smallint",
        ColumnType::MYSQL_TYPE_INT24 => "mediumint",
        ColumnType::MYSQL_TYPE_LONG => "int",
        ColumnType::MYSQL_TYPE_LONGLONG => "bigint",
        ColumnType::MYSQL_TYPE_YEAR => "year",
        ColumnType::MYSQL_TYPE_FLOAT => "float",
        ColumnType::MYSQL_TYPE_DOUBLE => "double",
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => "decimal",
        ColumnType::MYSQL_TYPE_BIT => "bit",
        ColumnType::MYSQL_TYPE_TIMESTAMP | ColumnType::MYSQL_TYPE_TIMESTAMP2 => "timestamp",
        ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_DATETIME2 => "datetime",
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => "date",
        ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => "time",
        ColumnType::MYSQL_TYPE_ENUM => "enum",
        ColumnType::MYSQL_TYPE_SET => "set",
        ColumnType::MYSQL_TYPE_JSON => "json",
        ColumnType::MYSQL_TYPE_GEOMETRY => "geometry",
        ColumnType::MYSQL_TYPE_VARCHAR | ColumnType::MYSQL_TYPE_VAR_STRING if binary => "varbinary",
        ColumnType::MYSQL_TYPE_VARCHAR | ColumnType::MYSQL_TYPE_VAR_STRING => "varchar",
        ColumnType::MYSQL_TYPE_STRING if binary => "binary",
        ColumnType::MYSQL_TYPE_STRING => "char",
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB
            if binary =>
        {
            "blob"
        }
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB => "text",
        _ => "unknown",
    }
}

/// Convert a driver value into a native cell. The text protocol sends most
/// values as bytes, so those are parsed according to the column type.
fn native_value(value: MySqlValue, type_name: &str) -> NativeValue {
    match value {
        MySqlValue::NULL => NativeValue::Null,
        MySqlValue::Int(i) => NativeValue::Int64(i),
        MySqlValue::UInt(u) => match i64::try_from(u) {
            Ok(i) => NativeValue::Int64(i),
            Err(_) => NativeValue::Decimal {
                mantissa: u as i128,
                scale: 0,
            },
        },
        MySqlValue::Float(f) => NativeValue::Float32(f),
        MySqlValue::Double(d) => NativeValue::Float64(d),
        MySqlValue::Date(y, m, d, h, min, s, micros) => {
            let date = NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32);
            match (type_name, date) {
                ("date", Some(date)) => NativeValue::Date(date),
                (_, Some(date)) => date
                    .and_hms_micro_opt(h as u32, min as u32, s as u32, micros)
                    .map(NativeValue::DateTime)
                    .unwrap_or_else(|| opaque(type_name)),
                (_, None) => opaque(type_name),
            }
        }
        MySqlValue::Time(is_neg, days, h, m, s, micros) => {
            if !is_neg && days == 0 {
                NaiveTime::from_hms_micro_opt(h as u32, m as u32, s as u32, micros)
                    .map(NativeValue::Time)
                    .unwrap_or_else(|| opaque(type_name))
            } else {
                // Durations outside a single day have no time-of-day form
                let sign = if is_neg { "-" } else { "" };
                NativeValue::Text(format!("{}{}:{:02}:{:02}", sign, days * 24 + h as u32, m, s))
            }
        }
        MySqlValue::Bytes(bytes) => parse_text_cell(bytes, type_name),
    }
}

fn opaque(type_name: &str) -> NativeValue {
    NativeValue::Opaque {
        type_name: type_name.to_string(),
    }
}

fn parse_text_cell(bytes: Vec<u8>, type_name: &str) -> NativeValue {
    if matches!(type_name, "bit" | "blob" | "binary" | "varbinary") {
        return NativeValue::Bytes(bytes);
    }
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => return NativeValue::Bytes(e.into_bytes()),
    };

    let parsed = match type_name {
        "tinyint" | "smallint" | "mediumint" | "int" | "bigint" | "year" => text
            .parse::<i64>()
            .ok()
            .map(NativeValue::Int64)
            .or_else(|| NativeValue::decimal_from_str(&text)),
        "float" => text.parse::<f32>().ok().map(NativeValue::Float32),
        "double" => text.parse::<f64>().ok().map(NativeValue::Float64),
        "decimal" => NativeValue::decimal_from_str(&text),
        "datetime" | "timestamp" => NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(NativeValue::DateTime),
        "date" => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .ok()
            .map(NativeValue::Date),
        "time" => NaiveTime::parse_from_str(&text, "%H:%M:%S%.f")
            .ok()
            .map(NativeValue::Time),
        _ => None,
    };

    parsed.unwrap_or(NativeValue::Text(text))
}
