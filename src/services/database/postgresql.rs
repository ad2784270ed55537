// PostgreSQL executor using connection pooling
use crate::error::{QueryError, Result};
use crate::models::{ColumnMeta, DatabaseType, NativeValue, RawResultSet};
use crate::services::database::executor::QueryExecutor;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::Pool;
use std::error::Error as StdError;
use std::time::Instant;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::Row;
use url::Url;

type FromSqlResult<T> = std::result::Result<T, Box<dyn StdError + Sync + Send>>;

pub struct PostgreSQLExecutor {
    pool: Pool,
}

impl PostgreSQLExecutor {
    pub fn new(pool: Pool, connection_url: &str) -> Result<Self> {
        let url = Url::parse(connection_url)
            .map_err(|e| QueryError::Connection(format!("Invalid PostgreSQL URL: {}", e)))?;

        if url.scheme() != "postgresql" && url.scheme() != "postgres" {
            return Err(QueryError::Connection(
                "URL must use postgresql:// or postgres:// scheme".to_string(),
            ));
        }

        Ok(Self { pool })
    }
}

fn execution_error(e: tokio_postgres::Error) -> QueryError {
    match e.as_db_error() {
        Some(db_error) => QueryError::Execution(db_error.message().to_string()),
        None => QueryError::Execution(e.to_string()),
    }
}

#[async_trait::async_trait]
impl QueryExecutor for PostgreSQLExecutor {
    async fn execute(&self, sql: &str, timeout_secs: u64) -> Result<RawResultSet> {
        let client = self.pool.get().await.map_err(|e| {
            QueryError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;

        let start_time = Instant::now();

        let query = async {
            // Prepare first so column metadata is known even for empty results
            let statement = client.prepare(sql).await?;
            let rows = client.query(&statement, &[]).await?;
            Ok::<_, tokio_postgres::Error>((statement, rows))
        };

        let (statement, rows) = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), query)
            .await
            .map_err(|_| QueryError::Execution(format!("Query timeout after {} seconds", timeout_secs)))?
            .map_err(execution_error)?;

        let columns: Vec<ColumnMeta> = statement
            .columns()
            .iter()
            .map(|c| ColumnMeta::new(c.name(), c.type_().name()))
            .collect();

        let mut raw_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, column) in statement.columns().iter().enumerate() {
                values.push(read_cell(row, idx, column.type_()).map_err(execution_error)?);
            }
            raw_rows.push(values);
        }

        tracing::debug!(
            "PostgreSQL query returned {} rows in {} ms",
            raw_rows.len(),
            start_time.elapsed().as_millis()
        );

        Ok(RawResultSet::new(columns, raw_rows))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    async fn test_connection(&self) -> Result<()> {
        let _client = self.pool.get().await.map_err(|e| {
            QueryError::Connection(format!("Connection test failed: {}", e))
        })?;
        Ok(())
    }
}

fn read_cell(row: &Row, idx: usize, ty: &Type) -> std::result::Result<NativeValue, tokio_postgres::Error> {
    fn opt<T>(value: Option<T>, f: impl FnOnce(T) -> NativeValue) -> NativeValue {
        value.map(f).unwrap_or(NativeValue::Null)
    }

    let value = match *ty {
        Type::BOOL => opt(row.try_get::<_, Option<bool>>(idx)?, NativeValue::Bool),
        Type::INT2 => opt(row.try_get::<_, Option<i16>>(idx)?, NativeValue::Int16),
        Type::INT4 => opt(row.try_get::<_, Option<i32>>(idx)?, NativeValue::Int32),
        Type::INT8 => opt(row.try_get::<_, Option<i64>>(idx)?, NativeValue::Int64),
        Type::OID => opt(row.try_get::<_, Option<u32>>(idx)?, |v| NativeValue::Int64(v as i64)),
        Type::FLOAT4 => opt(row.try_get::<_, Option<f32>>(idx)?, NativeValue::Float32),
        Type::FLOAT8 => opt(row.try_get::<_, Option<f64>>(idx)?, NativeValue::Float64),
        Type::NUMERIC => opt(row.try_get::<_, Option<PgNumeric>>(idx)?, |n| n.0),
        Type::MONEY => opt(row.try_get::<_, Option<PgMoney>>(idx)?, |m| NativeValue::Decimal {
            mantissa: m.0 as i128,
            scale: 2,
        }),
        Type::TIMESTAMP => opt(row.try_get::<_, Option<NaiveDateTime>>(idx)?, NativeValue::DateTime),
        Type::TIMESTAMPTZ => opt(row.try_get::<_, Option<DateTime<Utc>>>(idx)?, |v| {
            NativeValue::DateTimeOffset(v.into())
        }),
        Type::DATE => opt(row.try_get::<_, Option<NaiveDate>>(idx)?, NativeValue::Date),
        Type::TIME => opt(row.try_get::<_, Option<NaiveTime>>(idx)?, NativeValue::Time),
        Type::BYTEA => opt(row.try_get::<_, Option<Vec<u8>>>(idx)?, NativeValue::Bytes),
        Type::UUID => opt(row.try_get::<_, Option<uuid::Uuid>>(idx)?, |v| {
            NativeValue::Text(v.to_string())
        }),
        Type::JSON | Type::JSONB => opt(row.try_get::<_, Option<serde_json::Value>>(idx)?, |v| {
            NativeValue::Text(v.to_string())
        }),
        Type::INET | Type::CIDR => opt(row.try_get::<_, Option<PgInet>>(idx)?, |v| NativeValue::Text(v.0)),
        Type::INTERVAL => opt(row.try_get::<_, Option<PgInterval>>(idx)?, |v| NativeValue::Text(v.0)),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(value) => opt(value, NativeValue::Text),
            // Types without a text mapping in the driver (geometry, arrays, ...)
            Err(_) => NativeValue::Opaque {
                type_name: ty.name().to_string(),
            },
        },
    };
    Ok(value)
}

/// Binary NUMERIC decoded without going through f64
struct PgNumeric(NativeValue);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> FromSqlResult<Self> {
        decode_numeric(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// MONEY is an int8 count of cents on the wire
struct PgMoney(i64);

impl<'a> FromSql<'a> for PgMoney {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> FromSqlResult<Self> {
        let bytes: [u8; 8] = raw.try_into().map_err(|_| "invalid money length")?;
        Ok(PgMoney(i64::from_be_bytes(bytes)))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::MONEY
    }
}

/// INET/CIDR rendered the way the server prints them
struct PgInet(String);

impl<'a> FromSql<'a> for PgInet {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> FromSqlResult<Self> {
        decode_inet(raw).map(PgInet)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INET || *ty == Type::CIDR
    }
}

/// Wire layout: family, mask bits, is_cidr, address length, address bytes
fn decode_inet(raw: &[u8]) -> FromSqlResult<String> {
    if raw.len() < 4 {
        return Err("inet value truncated".into());
    }
    let (header, address) = raw.split_at(4);
    let (bits, is_cidr, len) = (header[1], header[2] != 0, header[3] as usize);
    if address.len() != len {
        return Err("inet address length mismatch".into());
    }

    let (text, full) = match len {
        4 => {
            let octets: [u8; 4] = address.try_into().map_err(|_| "invalid inet address")?;
            (std::net::Ipv4Addr::from(octets).to_string(), 32)
        }
        16 => {
            let octets: [u8; 16] = address.try_into().map_err(|_| "invalid inet address")?;
            (std::net::Ipv6Addr::from(octets).to_string(), 128)
        }
        _ => return Err("unsupported inet address family".into()),
    };

    Ok(if is_cidr || bits != full {
        format!("{}/{}", text, bits)
    } else {
        text
    })
}

/// INTERVAL rendered in the server's default `postgres` style
struct PgInterval(String);

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> FromSqlResult<Self> {
        let bytes: [u8; 16] = raw.try_into().map_err(|_| "invalid interval length")?;
        let micros = i64::from_be_bytes(bytes[0..8].try_into()?);
        let days = i32::from_be_bytes(bytes[8..12].try_into()?);
        let months = i32::from_be_bytes(bytes[12..16].try_into()?);
        Ok(PgInterval(format_interval(months, days, micros)))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

fn format_interval(months: i32, days: i32, micros: i64) -> String {
    fn unit(value: i32, singular: &str, plural: &str) -> Option<String> {
        match value {
            0 => None,
            1 | -1 => Some(format!("{} {}", value, singular)),
            _ => Some(format!("{} {}", value, plural)),
        }
    }

    let mut parts: Vec<String> = [
        unit(months / 12, "year", "years"),
        unit(months % 12, "mon", "mons"),
        unit(days, "day", "days"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let total = micros.unsigned_abs();
        let secs = total / 1_000_000;
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let fraction = total % 1_000_000;
        if fraction != 0 {
            clock.push_str(format!(".{:06}", fraction).trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Decode the binary NUMERIC layout: ndigits, weight, sign, dscale, then
/// `ndigits` base-10000 digits, all big-endian 16-bit
fn decode_numeric(raw: &[u8]) -> FromSqlResult<NativeValue> {
    let word = |i: usize| -> FromSqlResult<u16> {
        raw.get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "numeric value truncated".into())
    };

    let ndigits = word(0)? as usize;
    let weight = word(1)? as i16 as i32;
    let sign = word(2)?;
    let dscale = word(3)? as u32;

    match sign {
        NUMERIC_NAN => return Ok(NativeValue::Float64(f64::NAN)),
        NUMERIC_PINF => return Ok(NativeValue::Float64(f64::INFINITY)),
        NUMERIC_NINF => return Ok(NativeValue::Float64(f64::NEG_INFINITY)),
        _ => {}
    }

    let mut mantissa: i128 = 0;
    for i in 0..ndigits {
        let digit = word(4 + i)? as i128;
        let exponent = 4 * (weight - i as i32) + dscale as i32;
        let term = if exponent >= 0 {
            10i128
                .checked_pow(exponent as u32)
                .and_then(|p| digit.checked_mul(p))
        } else {
            // Digits past dscale are trailing zeros of the last group
            10i128.checked_pow((-exponent) as u32).map(|p| digit / p)
        };
        mantissa = term
            .and_then(|t| mantissa.checked_add(t))
            .ok_or("numeric value out of range")?;
    }

    if sign == NUMERIC_NEG {
        mantissa = -mantissa;
    }

    Ok(NativeValue::Decimal {
        mantissa,
        scale: dscale,
    })
}
