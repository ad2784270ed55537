// Cell value models
//
// NativeValue is what a query executor hands over: the driver's own
// representation of a cell. NormalizedValue is the closed set of variants the
// rest of the pipeline works with.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat};
use serde::{Serialize, Serializer};
use std::fmt;

/// Column metadata as reported by the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    /// Driver-native type identifier, e.g. `int4`, `nchar`, `datetimeoffset`
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Driver-native cell value
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    UInt8(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Fixed-point value `mantissa * 10^-scale`
    Decimal { mantissa: i128, scale: u32 },
    Text(String),
    Bytes(Vec<u8>),
    /// Date and time without zone information
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// A value the driver could not decode into any of the above
    Opaque { type_name: String },
}

impl NativeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, NativeValue::Null)
    }

    /// Parse a decimal literal such as `-12345.12000` without going through f64
    pub fn decimal_from_str(text: &str) -> Option<Self> {
        let text = text.trim();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let mut mantissa: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            mantissa = mantissa.checked_mul(10)?.checked_add((b - b'0') as i128)?;
        }
        if negative {
            mantissa = -mantissa;
        }
        Some(NativeValue::Decimal {
            mantissa,
            scale: frac_part.len() as u32,
        })
    }

    /// The driver's default textual rendering, if one exists
    pub fn to_text(&self) -> Option<String> {
        match self {
            NativeValue::Null | NativeValue::Opaque { .. } => None,
            NativeValue::Bool(v) => Some(v.to_string()),
            NativeValue::UInt8(v) => Some(v.to_string()),
            NativeValue::Int16(v) => Some(v.to_string()),
            NativeValue::Int32(v) => Some(v.to_string()),
            NativeValue::Int64(v) => Some(v.to_string()),
            NativeValue::Float32(v) => Some(v.to_string()),
            NativeValue::Float64(v) => Some(v.to_string()),
            NativeValue::Decimal { mantissa, scale } => Some(format_decimal(*mantissa, *scale)),
            NativeValue::Text(v) => Some(v.clone()),
            NativeValue::Bytes(v) => String::from_utf8(v.clone()).ok(),
            NativeValue::DateTime(v) => Some(v.to_string()),
            NativeValue::DateTimeOffset(v) => Some(v.to_rfc3339()),
            NativeValue::Date(v) => Some(v.to_string()),
            NativeValue::Time(v) => Some(v.to_string()),
        }
    }
}

fn format_decimal(mantissa: i128, scale: u32) -> String {
    if scale == 0 {
        return mantissa.to_string();
    }
    let digits = mantissa.unsigned_abs().to_string();
    let scale = scale as usize;
    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    let sign = if mantissa < 0 { "-" } else { "" };
    format!("{}{}.{}", sign, int_part, frac_part)
}

/// Normalized cell value
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    /// An instant, kept in the offset it was reported in
    Instant(DateTime<FixedOffset>),
}

impl NormalizedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, NormalizedValue::Null)
    }

    /// Numeric view used by series assembly
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NormalizedValue::Int64(v) => Some(*v as f64),
            NormalizedValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_instant(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            NormalizedValue::Instant(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedValue::Null => write!(f, "NULL"),
            NormalizedValue::Bool(v) => write!(f, "{}", v),
            NormalizedValue::Int64(v) => write!(f, "{}", v),
            NormalizedValue::Float64(v) => write!(f, "{}", v),
            NormalizedValue::String(v) => write!(f, "{}", v),
            NormalizedValue::Instant(v) => {
                write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl Serialize for NormalizedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NormalizedValue::Null => serializer.serialize_none(),
            NormalizedValue::Bool(v) => serializer.serialize_bool(*v),
            NormalizedValue::Int64(v) => serializer.serialize_i64(*v),
            NormalizedValue::Float64(v) => serializer.serialize_f64(*v),
            NormalizedValue::String(v) => serializer.serialize_str(v),
            NormalizedValue::Instant(v) => {
                serializer.serialize_str(&v.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

/// Raw result of executing one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResultSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<NativeValue>>,
}

impl RawResultSet {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<NativeValue>>) -> Self {
        Self { columns, rows }
    }
}
