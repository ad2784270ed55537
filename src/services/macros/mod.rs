// Macro expansion engine
//
// Rewrites portable `$__name(args)` placeholders in raw SQL into dialect SQL
// for a given time range. Expansion is a single left-to-right textual pass;
// the engine never executes SQL and knows nothing about the schema.

pub mod dialect;
pub mod scanner;

pub use dialect::{dialect_for, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SqlDialect};

use std::sync::Arc;

use crate::error::{QueryError, Result};
use crate::models::{DatabaseType, Interval, NormalizedValue, TimeRange};
use scanner::{MacroCall, Segment};

/// Value synthesized for buckets with no underlying rows
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillValue {
    Null,
    Value(f64),
}

impl FillValue {
    pub fn to_normalized(self) -> NormalizedValue {
        match self {
            FillValue::Null => NormalizedValue::Null,
            FillValue::Value(v) => NormalizedValue::Float64(v),
        }
    }
}

/// Gap-filling request recorded by a `$__timeGroup` fill argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapFill {
    pub interval: Interval,
    pub value: FillValue,
}

/// Output of expanding one query
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedSql {
    pub sql: String,
    pub fill: Option<GapFill>,
    /// `$__timeGroup` or `$__timeEpoch` produced the time column, so its
    /// values are epoch milliseconds whatever their magnitude
    pub epoch_millis_time: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MacroKind {
    TimeGroup,
    TimeEpoch,
    Time,
    TimeFilter,
    TimeFrom,
    TimeTo,
    UnixEpochFilter,
    UnixEpochFrom,
    UnixEpochTo,
}

impl MacroKind {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "timegroup" => Some(MacroKind::TimeGroup),
            "timeepoch" => Some(MacroKind::TimeEpoch),
            "time" => Some(MacroKind::Time),
            "timefilter" => Some(MacroKind::TimeFilter),
            "timefrom" => Some(MacroKind::TimeFrom),
            "timeto" => Some(MacroKind::TimeTo),
            "unixepochfilter" => Some(MacroKind::UnixEpochFilter),
            "unixepochfrom" => Some(MacroKind::UnixEpochFrom),
            "unixepochto" => Some(MacroKind::UnixEpochTo),
            _ => None,
        }
    }

    /// Accepted argument counts (inclusive)
    fn arity(self) -> (usize, usize) {
        match self {
            MacroKind::TimeGroup => (2, 3),
            MacroKind::TimeEpoch
            | MacroKind::Time
            | MacroKind::TimeFilter
            | MacroKind::UnixEpochFilter => (1, 1),
            MacroKind::TimeFrom
            | MacroKind::TimeTo
            | MacroKind::UnixEpochFrom
            | MacroKind::UnixEpochTo => (0, 0),
        }
    }
}

/// Start of the epoch-anchored bucket of `interval` containing `ts_ms`
pub fn bucket_start(ts_ms: i64, interval: Interval) -> i64 {
    let size = interval.as_millis();
    ts_ms.div_euclid(size) * size
}

pub struct MacroEngine {
    dialect: Arc<dyn SqlDialect>,
}

impl MacroEngine {
    pub fn new(dialect: Arc<dyn SqlDialect>) -> Self {
        Self { dialect }
    }

    pub fn for_database(db_type: DatabaseType) -> Self {
        Self::new(dialect_for(db_type))
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// Expand every macro in `raw_sql` against `range`
    pub fn expand(&self, raw_sql: &str, range: &TimeRange) -> Result<ExpandedSql> {
        let mut expanded = ExpandedSql {
            sql: String::with_capacity(raw_sql.len()),
            fill: None,
            epoch_millis_time: false,
        };

        for segment in scanner::scan(raw_sql)? {
            match segment {
                Segment::Text(text) => expanded.sql.push_str(text),
                Segment::Macro(call) => {
                    let expansion = self.expand_call(&call, range, &mut expanded)?;
                    expanded.sql.push_str(&expansion);
                }
            }
        }

        Ok(expanded)
    }

    fn expand_call(
        &self,
        call: &MacroCall<'_>,
        range: &TimeRange,
        expanded: &mut ExpandedSql,
    ) -> Result<String> {
        let kind = MacroKind::from_name(call.name).ok_or_else(|| {
            QueryError::macro_parse(call.text, format!("unknown macro `$__{}`", call.name))
        })?;
        validate_arguments(kind, call)?;

        let expansion = match kind {
            MacroKind::TimeGroup => {
                let column = call.args[0];
                let interval = Interval::parse(call.args[1])
                    .map_err(|e| QueryError::macro_argument(call.text, e))?;
                let interval_secs = interval.whole_secs().ok_or_else(|| {
                    QueryError::macro_argument(
                        call.text,
                        format!("interval `{}` must be a whole number of seconds", interval),
                    )
                })?;
                if let Some(raw_fill) = call.args.get(2) {
                    let value = parse_fill(raw_fill).map_err(|e| QueryError::macro_argument(call.text, e))?;
                    record_fill(&mut expanded.fill, GapFill { interval, value }, call.text)?;
                }
                expanded.epoch_millis_time = true;
                self.dialect.time_group(column, interval_secs)
            }
            MacroKind::TimeEpoch => {
                expanded.epoch_millis_time = true;
                self.dialect.time_epoch(call.args[0])
            }
            MacroKind::Time => self.dialect.time_column(call.args[0]),
            MacroKind::TimeFilter => format!(
                "{} BETWEEN {} AND {}",
                call.args[0],
                self.dialect.datetime_literal(&range.from),
                self.dialect.datetime_literal(&range.to)
            ),
            MacroKind::TimeFrom => self.dialect.datetime_literal(&range.from),
            MacroKind::TimeTo => self.dialect.datetime_literal(&range.to),
            MacroKind::UnixEpochFilter => format!(
                "{} BETWEEN {} AND {}",
                call.args[0],
                range.from_epoch_secs_floor(),
                range.to_epoch_secs_ceil()
            ),
            MacroKind::UnixEpochFrom => range.from_epoch_secs_floor().to_string(),
            MacroKind::UnixEpochTo => range.to_epoch_secs_floor().to_string(),
        };

        Ok(expansion)
    }
}

fn validate_arguments(kind: MacroKind, call: &MacroCall<'_>) -> Result<()> {
    let (min, max) = kind.arity();
    let count = call.args.len();
    if count < min || count > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(QueryError::macro_argument(
            call.text,
            format!("expected {} argument(s), got {}", expected, count),
        ));
    }
    if let Some(position) = call.args.iter().position(|arg| arg.is_empty()) {
        return Err(QueryError::macro_argument(
            call.text,
            format!("argument {} is empty", position + 1),
        ));
    }
    // Expansions are never re-scanned, so a macro inside an argument would leak
    if call.args.iter().any(|arg| scanner::contains_macro(arg)) {
        return Err(QueryError::macro_argument(
            call.text,
            "nested macro invocations are not supported",
        ));
    }
    Ok(())
}

fn parse_fill(raw: &str) -> std::result::Result<FillValue, String> {
    if raw.eq_ignore_ascii_case("null") {
        return Ok(FillValue::Null);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(FillValue::Value(v)),
        _ => Err(format!("fill value `{}` must be NULL or a number", raw)),
    }
}

fn record_fill(current: &mut Option<GapFill>, declared: GapFill, macro_text: &str) -> Result<()> {
    match current {
        Some(existing) if *existing != declared => Err(QueryError::macro_argument(
            macro_text,
            format!(
                "conflicting fill declaration: {} / {:?} was already declared",
                existing.interval, existing.value
            ),
        )),
        Some(_) => Ok(()),
        None => {
            *current = Some(declared);
            Ok(())
        }
    }
}
