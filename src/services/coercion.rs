// Value coercion
//
// Maps driver-native cells onto NormalizedValue. Dispatch goes through one
// table from native type identifier to CoercionRule, so supporting a new
// native type is a single entry in COERCION_TABLE.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{QueryError, Result};
use crate::models::{ColumnMeta, NativeValue, NormalizedValue};

/// Numeric epoch values with a magnitude below this are read as seconds,
/// anything at or above it as milliseconds. 1e11 seconds is year 5138 while
/// 1e11 milliseconds is March 1973, so both ranges in practical use are covered.
pub const EPOCH_SECONDS_LIMIT: f64 = 1e11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionRule {
    Boolean,
    Integer,
    Float,
    /// Fixed-point and currency types
    Decimal,
    /// Character types; fixed-width padding is preserved
    Text,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
    /// No specific rule: textual representation
    Fallback,
}

impl CoercionRule {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            CoercionRule::Integer | CoercionRule::Float | CoercionRule::Decimal
        )
    }
}

/// How a column is used by the result assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Value,
    /// Normalized to epoch milliseconds; numbers below
    /// [`EPOCH_SECONDS_LIMIT`] are read as seconds
    Time,
    /// Already epoch milliseconds; only instants are converted
    EpochMillis,
}

/// Native type identifier (lowercase base name) → rule
const COERCION_TABLE: &[(&str, CoercionRule)] = &[
    // SQL Server
    ("bit", CoercionRule::Boolean),
    ("tinyint", CoercionRule::Integer),
    ("smallint", CoercionRule::Integer),
    ("int", CoercionRule::Integer),
    ("bigint", CoercionRule::Integer),
    ("real", CoercionRule::Float),
    ("float", CoercionRule::Float),
    ("decimal", CoercionRule::Decimal),
    ("numeric", CoercionRule::Decimal),
    ("money", CoercionRule::Decimal),
    ("smallmoney", CoercionRule::Decimal),
    ("char", CoercionRule::Text),
    ("varchar", CoercionRule::Text),
    ("text", CoercionRule::Text),
    ("nchar", CoercionRule::Text),
    ("nvarchar", CoercionRule::Text),
    ("ntext", CoercionRule::Text),
    ("datetime", CoercionRule::DateTime),
    ("datetime2", CoercionRule::DateTime),
    ("smalldatetime", CoercionRule::DateTime),
    ("date", CoercionRule::Date),
    ("time", CoercionRule::Time),
    ("datetimeoffset", CoercionRule::DateTimeOffset),
    // PostgreSQL
    ("bool", CoercionRule::Boolean),
    ("int2", CoercionRule::Integer),
    ("int4", CoercionRule::Integer),
    ("int8", CoercionRule::Integer),
    ("float4", CoercionRule::Float),
    ("float8", CoercionRule::Float),
    ("bpchar", CoercionRule::Text),
    ("name", CoercionRule::Text),
    ("timestamp", CoercionRule::DateTime),
    ("timestamptz", CoercionRule::DateTimeOffset),
    // MySQL
    ("boolean", CoercionRule::Boolean),
    ("mediumint", CoercionRule::Integer),
    ("integer", CoercionRule::Integer),
    ("year", CoercionRule::Integer),
    ("double", CoercionRule::Float),
    ("tinytext", CoercionRule::Text),
    ("mediumtext", CoercionRule::Text),
    ("longtext", CoercionRule::Text),
    ("enum", CoercionRule::Text),
];

/// Look up the rule for a native type name such as `decimal(10,2)` or `INT UNSIGNED`
pub fn rule_for(type_name: &str) -> CoercionRule {
    let lowered = type_name.trim().to_ascii_lowercase();
    let base = lowered.split('(').next().unwrap_or_default().trim();
    let first_word = base.split_whitespace().next().unwrap_or_default();

    [base, first_word]
        .iter()
        .find_map(|candidate| {
            COERCION_TABLE
                .iter()
                .find(|(name, _)| name == candidate)
                .map(|(_, rule)| *rule)
        })
        .unwrap_or(CoercionRule::Fallback)
}

/// Coerce one cell. `row` is only used to report failures.
pub fn coerce_value(column: &ColumnMeta, row: usize, value: NativeValue) -> Result<NormalizedValue> {
    if value.is_null() {
        return Ok(NormalizedValue::Null);
    }

    let rule = rule_for(&column.type_name);
    let coerced = match rule {
        CoercionRule::Boolean => to_bool(&value),
        CoercionRule::Integer => to_integer(&value),
        CoercionRule::Float | CoercionRule::Decimal => to_float(&value),
        CoercionRule::Text => value.to_text().map(NormalizedValue::String),
        CoercionRule::DateTime | CoercionRule::DateTimeOffset => None,
        CoercionRule::Date => to_date(&value),
        CoercionRule::Time => to_time_of_day(&value),
        CoercionRule::Fallback => value.to_text().map(NormalizedValue::String),
    };

    coerced
        .or_else(|| natural(&value))
        .ok_or_else(|| QueryError::TypeCoercion {
            column: column.name.clone(),
            native_type: column.type_name.clone(),
            row,
        })
}

/// Coerce one cell for the given role
pub fn coerce_cell(
    column: &ColumnMeta,
    row: usize,
    value: NativeValue,
    role: ColumnRole,
) -> Result<NormalizedValue> {
    let value = coerce_value(column, row, value)?;
    Ok(match role {
        ColumnRole::Value => value,
        ColumnRole::Time => normalize_time_value(value),
        ColumnRole::EpochMillis => match value {
            NormalizedValue::Instant(instant) => {
                NormalizedValue::Float64(instant.timestamp_millis() as f64)
            }
            other => other,
        },
    })
}

/// Normalize a time-column value to epoch milliseconds.
///
/// Instants become Float64 milliseconds. Numbers keep their variant and are
/// scaled from seconds when below [`EPOCH_SECONDS_LIMIT`]. Null and anything
/// else pass through unchanged.
pub fn normalize_time_value(value: NormalizedValue) -> NormalizedValue {
    match value {
        NormalizedValue::Instant(instant) => NormalizedValue::Float64(instant.timestamp_millis() as f64),
        NormalizedValue::Int64(v) => NormalizedValue::Int64(epoch_int_to_millis(v)),
        NormalizedValue::Float64(v) => NormalizedValue::Float64(epoch_float_to_millis(v)),
        other => other,
    }
}

pub fn epoch_float_to_millis(v: f64) -> f64 {
    if v.abs() < EPOCH_SECONDS_LIMIT {
        v * 1000.0
    } else {
        v
    }
}

pub fn epoch_int_to_millis(v: i64) -> i64 {
    if (v as f64).abs() < EPOCH_SECONDS_LIMIT {
        v * 1000
    } else {
        v
    }
}

fn instant_from_naive(naive: &NaiveDateTime) -> DateTime<FixedOffset> {
    Utc.from_utc_datetime(naive).into()
}

fn as_i64(value: &NativeValue) -> Option<i64> {
    match value {
        NativeValue::UInt8(v) => Some(*v as i64),
        NativeValue::Int16(v) => Some(*v as i64),
        NativeValue::Int32(v) => Some(*v as i64),
        NativeValue::Int64(v) => Some(*v),
        _ => None,
    }
}

fn text_of(value: &NativeValue) -> Option<&str> {
    match value {
        NativeValue::Text(v) => Some(v.as_str()),
        NativeValue::Bytes(v) => std::str::from_utf8(v).ok(),
        _ => None,
    }
}

fn decimal_to_f64(mantissa: i128, scale: u32) -> f64 {
    // Single division, so 200001500 at scale 4 lands on the double nearest 20000.15
    mantissa as f64 / 10f64.powi(scale as i32)
}

fn to_bool(value: &NativeValue) -> Option<NormalizedValue> {
    match value {
        NativeValue::Bool(v) => Some(NormalizedValue::Bool(*v)),
        NativeValue::Bytes(bytes) if bytes.len() == 1 && bytes[0] <= 1 => {
            Some(NormalizedValue::Bool(bytes[0] == 1))
        }
        _ => {
            if let Some(v) = as_i64(value) {
                return Some(NormalizedValue::Bool(v != 0));
            }
            match text_of(value)?.trim() {
                "1" | "true" | "TRUE" => Some(NormalizedValue::Bool(true)),
                "0" | "false" | "FALSE" => Some(NormalizedValue::Bool(false)),
                _ => None,
            }
        }
    }
}

fn to_integer(value: &NativeValue) -> Option<NormalizedValue> {
    if let Some(v) = as_i64(value) {
        return Some(NormalizedValue::Int64(v));
    }
    match value {
        NativeValue::Decimal { mantissa, scale: 0 } => i64::try_from(*mantissa).ok().map(NormalizedValue::Int64),
        _ => text_of(value)?.trim().parse::<i64>().ok().map(NormalizedValue::Int64),
    }
}

fn to_float(value: &NativeValue) -> Option<NormalizedValue> {
    if let Some(v) = as_i64(value) {
        return Some(NormalizedValue::Float64(v as f64));
    }
    match value {
        NativeValue::Float32(v) => Some(NormalizedValue::Float64(*v as f64)),
        NativeValue::Float64(v) => Some(NormalizedValue::Float64(*v)),
        NativeValue::Decimal { mantissa, scale } => Some(NormalizedValue::Float64(decimal_to_f64(*mantissa, *scale))),
        _ => {
            let text = text_of(value)?;
            match NativeValue::decimal_from_str(text) {
                Some(NativeValue::Decimal { mantissa, scale }) => {
                    Some(NormalizedValue::Float64(decimal_to_f64(mantissa, scale)))
                }
                _ => text.trim().parse::<f64>().ok().map(NormalizedValue::Float64),
            }
        }
    }
}

fn to_date(value: &NativeValue) -> Option<NormalizedValue> {
    let date = match value {
        NativeValue::Date(d) => *d,
        NativeValue::DateTime(dt) => dt.date(),
        _ => return None,
    };
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| NormalizedValue::Instant(instant_from_naive(&midnight)))
}

fn to_time_of_day(value: &NativeValue) -> Option<NormalizedValue> {
    match value {
        NativeValue::Time(t) => NaiveDate::from_ymd_opt(1, 1, 1)
            .map(|d| NormalizedValue::Instant(instant_from_naive(&d.and_time(*t)))),
        _ => None,
    }
}

/// Mapping by the shape of the native value alone
fn natural(value: &NativeValue) -> Option<NormalizedValue> {
    let normalized = match value {
        NativeValue::Null => NormalizedValue::Null,
        NativeValue::Bool(v) => NormalizedValue::Bool(*v),
        NativeValue::UInt8(_) | NativeValue::Int16(_) | NativeValue::Int32(_) | NativeValue::Int64(_) => {
            NormalizedValue::Int64(as_i64(value)?)
        }
        NativeValue::Float32(v) => NormalizedValue::Float64(*v as f64),
        NativeValue::Float64(v) => NormalizedValue::Float64(*v),
        NativeValue::Decimal { mantissa, scale } => NormalizedValue::Float64(decimal_to_f64(*mantissa, *scale)),
        NativeValue::Text(v) => NormalizedValue::String(v.clone()),
        NativeValue::Bytes(v) => NormalizedValue::String(String::from_utf8(v.clone()).ok()?),
        NativeValue::DateTime(v) => NormalizedValue::Instant(instant_from_naive(v)),
        NativeValue::DateTimeOffset(v) => NormalizedValue::Instant(*v),
        NativeValue::Date(_) => return to_date(value),
        NativeValue::Time(_) => return to_time_of_day(value),
        NativeValue::Opaque { .. } => return None,
    };
    Some(normalized)
}
