// Result assembly
//
// Shapes a coerced result set into the requested format: a pass-through
// Table, or named time series with optional gap filling.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::{QueryError, Result};
use crate::models::{
    ColumnMeta, NativeValue, NormalizedValue, Point, QueryFormat, RawResultSet, Series, Table,
    TimeRange,
};
use crate::services::coercion::{coerce_cell, coerce_value, rule_for, ColumnRole};
use crate::services::macros::{ExpandedSql, GapFill};

/// Upper bound on buckets walked while gap filling one series
pub const MAX_FILL_POINTS: i64 = 1_000_000;

pub const DEFAULT_SERIES_SEPARATOR: &str = " ";

const TIME_COLUMN: &str = "time";
const METRIC_COLUMN: &str = "metric";

/// Assembled output for one query
#[derive(Debug, Clone, PartialEq)]
pub enum Assembled {
    Table(Table),
    Series(Vec<Series>),
}

impl Assembled {
    pub fn row_count(&self) -> usize {
        match self {
            Assembled::Table(table) => table.rows.len(),
            Assembled::Series(series) => series.iter().map(|s| s.points.len()).sum(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultAssembler {
    separator: String,
}

impl Default for ResultAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_SEPARATOR)
    }
}

impl ResultAssembler {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    pub fn assemble(
        &self,
        format: QueryFormat,
        raw: RawResultSet,
        expanded: &ExpandedSql,
        range: &TimeRange,
    ) -> Result<Assembled> {
        let time_role = if expanded.epoch_millis_time {
            ColumnRole::EpochMillis
        } else {
            ColumnRole::Time
        };
        match format {
            QueryFormat::Table => self.table(raw, time_role).map(Assembled::Table),
            QueryFormat::TimeSeries => self
                .time_series(raw, expanded.fill, time_role, range)
                .map(Assembled::Series),
        }
    }

    /// Rows pass through in engine order. A column named `time` is normalized
    /// to epoch milliseconds according to `time_role` so annotation queries
    /// get comparable timestamps.
    pub fn table(&self, raw: RawResultSet, time_role: ColumnRole) -> Result<Table> {
        let RawResultSet { columns, rows } = raw;
        let roles: Vec<ColumnRole> = columns
            .iter()
            .map(|c| {
                if c.name.eq_ignore_ascii_case(TIME_COLUMN) {
                    time_role
                } else {
                    ColumnRole::Value
                }
            })
            .collect();

        let mut table_rows = Vec::with_capacity(rows.len());
        for (row_idx, row) in rows.into_iter().enumerate() {
            check_width(&columns, row_idx, row.len())?;
            let values = columns
                .iter()
                .zip(&roles)
                .zip(row)
                .map(|((column, role), value)| coerce_cell(column, row_idx, value, *role))
                .collect::<Result<Vec<_>>>()?;
            table_rows.push(values);
        }

        Ok(Table {
            columns: columns.into_iter().map(|c| c.name).collect(),
            rows: table_rows,
        })
    }

    pub fn time_series(
        &self,
        raw: RawResultSet,
        fill: Option<GapFill>,
        time_role: ColumnRole,
        range: &TimeRange,
    ) -> Result<Vec<Series>> {
        let RawResultSet { columns, rows } = raw;
        let layout = SeriesLayout::from_columns(&columns)?;

        let mut series: Vec<Series> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (row_idx, mut row) in rows.into_iter().enumerate() {
            check_width(&columns, row_idx, row.len())?;

            let time_column = &columns[layout.time];
            let time_value = std::mem::replace(&mut row[layout.time], NativeValue::Null);
            let timestamp = match coerce_cell(time_column, row_idx, time_value, time_role)? {
                NormalizedValue::Null => {
                    debug!("Skipping row {} with null time", row_idx);
                    continue;
                }
                value => value.as_f64().ok_or_else(|| {
                    QueryError::Assembly(format!(
                        "column `{}` at row {} is not a timestamp: {}",
                        time_column.name, row_idx, value
                    ))
                })?,
            };

            let mut identity = Vec::with_capacity(layout.identities.len());
            for &i in &layout.identities {
                let value = std::mem::replace(&mut row[i], NativeValue::Null);
                identity.push(identity_text(&coerce_value(&columns[i], row_idx, value)?));
            }
            let identity = identity.join(&self.separator);

            for &i in &layout.values {
                let value = std::mem::replace(&mut row[i], NativeValue::Null);
                let value = match coerce_value(&columns[i], row_idx, value)? {
                    NormalizedValue::Null => NormalizedValue::Null,
                    other => NormalizedValue::Float64(other.as_f64().ok_or_else(|| {
                        QueryError::Assembly(format!(
                            "column `{}` at row {} is not numeric: {}",
                            columns[i].name, row_idx, other
                        ))
                    })?),
                };

                let name = self.series_name(&layout, &identity, &columns[i].name);
                let slot = match index.get(&name) {
                    Some(&slot) => slot,
                    None => {
                        index.insert(name.clone(), series.len());
                        series.push(Series::new(name));
                        series.len() - 1
                    }
                };
                series[slot].points.push(Point::new(timestamp, value));
            }
        }

        if series.is_empty() && layout.identities.is_empty() && fill.is_some() {
            series = layout
                .values
                .iter()
                .map(|&i| Series::new(columns[i].name.clone()))
                .collect();
        }

        for s in &mut series {
            sort_points(s);
            if let Some(fill) = &fill {
                fill_gaps(s, fill, range)?;
            }
        }

        Ok(series)
    }

    fn series_name(&self, layout: &SeriesLayout, identity: &str, label: &str) -> String {
        if layout.identities.is_empty() {
            label.to_string()
        } else if layout.values.len() > 1 {
            format!("{}{}{}", identity, self.separator, label)
        } else {
            identity.to_string()
        }
    }
}

/// Column roles for time series assembly
struct SeriesLayout {
    time: usize,
    identities: Vec<usize>,
    values: Vec<usize>,
}

impl SeriesLayout {
    fn from_columns(columns: &[ColumnMeta]) -> Result<Self> {
        if columns.is_empty() {
            return Err(QueryError::Assembly("result set has no columns".to_string()));
        }
        let time = columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(TIME_COLUMN))
            .unwrap_or(0);

        let mut identities = Vec::new();
        let mut values = Vec::new();
        for (i, column) in columns.iter().enumerate() {
            if i == time {
                continue;
            }
            if column.name.eq_ignore_ascii_case(METRIC_COLUMN) || !rule_for(&column.type_name).is_numeric() {
                identities.push(i);
            } else {
                values.push(i);
            }
        }

        if values.is_empty() {
            return Err(QueryError::Assembly(
                "time series results need at least one numeric value column".to_string(),
            ));
        }

        Ok(Self { time, identities, values })
    }
}

fn check_width(columns: &[ColumnMeta], row_idx: usize, width: usize) -> Result<()> {
    if width != columns.len() {
        return Err(QueryError::Assembly(format!(
            "row {} has {} values but {} columns were reported",
            row_idx,
            width,
            columns.len()
        )));
    }
    Ok(())
}

fn identity_text(value: &NormalizedValue) -> String {
    match value {
        NormalizedValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn sort_points(series: &mut Series) {
    series.points.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
}

/// Insert `fill.value` at every bucket boundary in `range` that has no point.
/// Existing points are never altered.
pub fn fill_gaps(series: &mut Series, fill: &GapFill, range: &TimeRange) -> Result<()> {
    let step = fill.interval.as_millis();
    let from = range.from_epoch_millis();

    let mut start = from.div_euclid(step) * step;
    if start < from {
        start += step;
    }
    let end = range.to_epoch_millis().div_euclid(step) * step;
    if end < start {
        return Ok(());
    }

    let buckets = (end - start) / step + 1;
    if buckets > MAX_FILL_POINTS {
        return Err(QueryError::Assembly(format!(
            "gap filling `{}` at {} would produce {} points, limit is {}",
            series.name, fill.interval, buckets, MAX_FILL_POINTS
        )));
    }

    let existing: HashSet<i64> = series
        .points
        .iter()
        .filter(|p| p.timestamp.fract() == 0.0)
        .map(|p| p.timestamp as i64)
        .collect();

    let before = series.points.len();
    let mut bucket = start;
    while bucket <= end {
        if !existing.contains(&bucket) {
            series
                .points
                .push(Point::new(bucket as f64, fill.value.to_normalized()));
        }
        bucket += step;
    }

    if series.points.len() != before {
        sort_points(series);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interval;
    use crate::services::macros::FillValue;
    use chrono::NaiveDate;

    const T13_00: i64 = 1_521_118_800_000;
    const MINUTE: i64 = 60_000;

    fn col(name: &str, type_name: &str) -> ColumnMeta {
        ColumnMeta::new(name, type_name)
    }

    fn five_minute_fill(value: FillValue) -> GapFill {
        GapFill {
            interval: Interval::parse("5m").unwrap(),
            value,
        }
    }

    fn timestamps(series: &Series) -> Vec<f64> {
        series.points.iter().map(|p| p.timestamp).collect()
    }

    /// 13:00..13:30 with no row at 13:15, as produced by a grouped query
    fn bucketed_rows() -> RawResultSet {
        let mut rows = Vec::new();
        for minute in [0, 5, 10] {
            rows.push(vec![NativeValue::Int64(T13_00 + minute * MINUTE), NativeValue::Int32(15)]);
        }
        for minute in [20, 25, 30] {
            rows.push(vec![NativeValue::Int64(T13_00 + minute * MINUTE), NativeValue::Int32(20)]);
        }
        RawResultSet::new(vec![col("time", "bigint"), col("value", "int")], rows)
    }

    #[test]
    fn test_null_fill_inserts_missing_bucket() {
        let range = TimeRange::from_millis(T13_00, T13_00 + 34 * MINUTE).unwrap();
        let series = ResultAssembler::default()
            .time_series(
                bucketed_rows(),
                Some(five_minute_fill(FillValue::Null)),
                ColumnRole::Time,
                &range,
            )
            .unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name, "value");
        let points = &series[0].points;
        assert_eq!(points.len(), 7);
        for p in &points[0..3] {
            assert_eq!(p.value, NormalizedValue::Float64(15.0));
        }
        assert_eq!(points[3].timestamp, (T13_00 + 15 * MINUTE) as f64);
        assert_eq!(points[3].value, NormalizedValue::Null);
        for p in &points[4..7] {
            assert_eq!(p.value, NormalizedValue::Float64(20.0));
        }
    }

    #[test]
    fn test_macro_buckets_near_epoch_are_not_rescaled() {
        // 1970-01-01 00:00..00:30, buckets at 0 and 5 minutes
        let range = TimeRange::from_millis(0, 30 * MINUTE).unwrap();
        let raw = RawResultSet::new(
            vec![col("time", "bigint"), col("value", "int")],
            vec![
                vec![NativeValue::Int64(0), NativeValue::Int32(1)],
                vec![NativeValue::Int64(5 * MINUTE), NativeValue::Int32(2)],
            ],
        );
        let series = ResultAssembler::default()
            .time_series(
                raw,
                Some(five_minute_fill(FillValue::Null)),
                ColumnRole::EpochMillis,
                &range,
            )
            .unwrap();

        let points = &series[0].points;
        assert_eq!(
            timestamps(&series[0]),
            (0..=6).map(|i| (i * 5 * MINUTE) as f64).collect::<Vec<_>>()
        );
        assert_eq!(points[0].value, NormalizedValue::Float64(1.0));
        assert_eq!(points[1].value, NormalizedValue::Float64(2.0));
        assert!(points[2..].iter().all(|p| p.value.is_null()));
    }

    #[test]
    fn test_numeric_fill_value() {
        let range = TimeRange::from_millis(T13_00, T13_00 + 34 * MINUTE).unwrap();
        let series = ResultAssembler::default()
            .time_series(
                bucketed_rows(),
                Some(five_minute_fill(FillValue::Value(1.5))),
                ColumnRole::Time,
                &range,
            )
            .unwrap();
        assert_eq!(series[0].points[3].value, NormalizedValue::Float64(1.5));
    }

    #[test]
    fn test_without_fill_points_are_untouched() {
        let range = TimeRange::from_millis(T13_00, T13_00 + 34 * MINUTE).unwrap();
        let series = ResultAssembler::default()
            .time_series(bucketed_rows(), None, ColumnRole::Time, &range)
            .unwrap();
        assert_eq!(series[0].points.len(), 6);
    }

    #[test]
    fn test_fill_walks_only_buckets_inside_range() {
        // from sits mid-bucket, so the first boundary is 13:05
        let range = TimeRange::from_millis(T13_00 + MINUTE, T13_00 + 14 * MINUTE).unwrap();
        let mut series = Series::new("s");
        fill_gaps(&mut series, &five_minute_fill(FillValue::Null), &range).unwrap();
        assert_eq!(
            timestamps(&series),
            vec![(T13_00 + 5 * MINUTE) as f64, (T13_00 + 10 * MINUTE) as f64]
        );
    }

    #[test]
    fn test_fill_keeps_off_boundary_points() {
        let range = TimeRange::from_millis(T13_00, T13_00 + 10 * MINUTE).unwrap();
        let mut series = Series::new("s");
        series.points.push(Point::new((T13_00 + 7 * MINUTE) as f64, NormalizedValue::Float64(3.0)));
        fill_gaps(&mut series, &five_minute_fill(FillValue::Value(0.0)), &range).unwrap();
        assert_eq!(series.points.len(), 4);
        assert_eq!(series.points[2].value, NormalizedValue::Float64(3.0));
        assert!(series.points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_fill_limit() {
        let range = TimeRange::from_millis(0, 2_000_000_000).unwrap();
        let fill = GapFill {
            interval: Interval::from_secs(1).unwrap(),
            value: FillValue::Null,
        };
        let err = fill_gaps(&mut Series::new("s"), &fill, &range).unwrap_err();
        assert!(matches!(err, QueryError::Assembly(_)));
    }

    #[test]
    fn test_empty_result_is_fully_filled() {
        let range = TimeRange::from_millis(T13_00, T13_00 + 10 * MINUTE).unwrap();
        let raw = RawResultSet::new(vec![col("time", "bigint"), col("value", "float")], vec![]);
        let series = ResultAssembler::default()
            .time_series(
                raw,
                Some(five_minute_fill(FillValue::Null)),
                ColumnRole::Time,
                &range,
            )
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].points.len(), 3);
        assert!(series[0].points.iter().all(|p| p.value.is_null()));

        let raw = RawResultSet::new(vec![col("time", "bigint"), col("value", "float")], vec![]);
        let series = ResultAssembler::default()
            .time_series(raw, None, ColumnRole::Time, &range)
            .unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn test_identity_grouping() {
        let dt = |minute: u32| {
            NativeValue::DateTime(
                NaiveDate::from_ymd_opt(2018, 3, 15)
                    .unwrap()
                    .and_hms_opt(13, minute, 0)
                    .unwrap(),
            )
        };
        let raw = RawResultSet::new(
            vec![col("time", "datetime"), col("metric", "varchar"), col("value", "int")],
            vec![
                vec![dt(10), NativeValue::Text("Metric B".into()), NativeValue::Int32(3)],
                vec![dt(5), NativeValue::Text("Metric A".into()), NativeValue::Int32(2)],
                vec![dt(0), NativeValue::Text("Metric A".into()), NativeValue::Int32(1)],
                vec![dt(0), NativeValue::Text("Metric B".into()), NativeValue::Null],
            ],
        );
        let range = TimeRange::from_millis(T13_00, T13_00 + 10 * MINUTE).unwrap();
        let series = ResultAssembler::default()
            .time_series(raw, None, ColumnRole::Time, &range)
            .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].name, "Metric B");
        assert_eq!(series[1].name, "Metric A");
        assert_eq!(
            timestamps(&series[0]),
            vec![T13_00 as f64, (T13_00 + 10 * MINUTE) as f64]
        );
        assert_eq!(series[0].points[0].value, NormalizedValue::Null);
        assert_eq!(
            timestamps(&series[1]),
            vec![T13_00 as f64, (T13_00 + 5 * MINUTE) as f64]
        );
    }

    #[test]
    fn test_multiple_value_columns() {
        let raw = RawResultSet::new(
            vec![
                col("time", "bigint"),
                col("measurement", "nvarchar"),
                col("valueOne", "int"),
                col("valueTwo", "decimal(10,2)"),
            ],
            vec![vec![
                NativeValue::Int64(T13_00 / 1000),
                NativeValue::Text("Metric A".into()),
                NativeValue::Int32(1),
                NativeValue::Decimal { mantissa: 250, scale: 2 },
            ]],
        );
        let range = TimeRange::from_millis(T13_00, T13_00 + MINUTE).unwrap();
        let series = ResultAssembler::new(" - ")
            .time_series(raw, None, ColumnRole::Time, &range)
            .unwrap();

        let names: Vec<&str> = series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Metric A - valueOne", "Metric A - valueTwo"]);
        assert_eq!(series[0].points[0].timestamp, T13_00 as f64);
        assert_eq!(series[1].points[0].value, NormalizedValue::Float64(2.5));
    }

    #[test]
    fn test_value_columns_without_identity() {
        let raw = RawResultSet::new(
            vec![col("time", "bigint"), col("valueOne", "int"), col("valueTwo", "float")],
            vec![vec![NativeValue::Int64(T13_00), NativeValue::Int32(1), NativeValue::Float64(2.0)]],
        );
        let range = TimeRange::from_millis(T13_00, T13_00 + MINUTE).unwrap();
        let series = ResultAssembler::default()
            .time_series(raw, None, ColumnRole::Time, &range)
            .unwrap();
        let names: Vec<&str> = series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["valueOne", "valueTwo"]);
    }

    #[test]
    fn test_first_column_is_time_when_none_is_named() {
        let raw = RawResultSet::new(
            vec![col("ts", "int"), col("v", "float")],
            vec![vec![NativeValue::Int32(1_521_118_800), NativeValue::Float64(1.0)]],
        );
        let range = TimeRange::from_millis(T13_00, T13_00 + MINUTE).unwrap();
        let series = ResultAssembler::default()
            .time_series(raw, None, ColumnRole::Time, &range)
            .unwrap();
        assert_eq!(series[0].name, "v");
        assert_eq!(series[0].points[0].timestamp, T13_00 as f64);
    }

    #[test]
    fn test_null_time_rows_are_skipped() {
        let raw = RawResultSet::new(
            vec![col("time", "bigint"), col("value", "int")],
            vec![
                vec![NativeValue::Null, NativeValue::Int32(1)],
                vec![NativeValue::Int64(T13_00), NativeValue::Int32(2)],
            ],
        );
        let range = TimeRange::from_millis(T13_00, T13_00 + MINUTE).unwrap();
        let series = ResultAssembler::default()
            .time_series(raw, None, ColumnRole::Time, &range)
            .unwrap();
        assert_eq!(series[0].points.len(), 1);
    }

    #[test]
    fn test_time_series_errors() {
        let range = TimeRange::from_millis(T13_00, T13_00 + MINUTE).unwrap();
        let assembler = ResultAssembler::default();

        let no_values = RawResultSet::new(vec![col("time", "bigint"), col("host", "varchar")], vec![]);
        assert!(matches!(
            assembler.time_series(no_values, None, ColumnRole::Time, &range),
            Err(QueryError::Assembly(_))
        ));

        let text_time = RawResultSet::new(
            vec![col("time", "varchar"), col("value", "int")],
            vec![vec![NativeValue::Text("yesterday".into()), NativeValue::Int32(1)]],
        );
        assert!(matches!(
            assembler.time_series(text_time, None, ColumnRole::Time, &range),
            Err(QueryError::Assembly(_))
        ));

        let no_columns = RawResultSet::default();
        assert!(assembler.time_series(no_columns, None, ColumnRole::Time, &range).is_err());
    }

    #[test]
    fn test_table_reports_failing_cell() {
        let raw = RawResultSet::new(
            vec![col("g", "geometry")],
            vec![
                vec![NativeValue::Text("POINT(1 1)".into())],
                vec![NativeValue::Opaque { type_name: "geometry".into() }],
            ],
        );
        match ResultAssembler::default().table(raw, ColumnRole::Time) {
            Err(QueryError::TypeCoercion { row, column, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "g");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let ragged = RawResultSet::new(
            vec![col("a", "int"), col("b", "int")],
            vec![vec![NativeValue::Int32(1)]],
        );
        assert!(matches!(
            ResultAssembler::default().table(ragged, ColumnRole::Time),
            Err(QueryError::Assembly(_))
        ));
    }

    #[test]
    fn test_table_passes_rows_through() {
        let raw = RawResultSet::new(
            vec![col("c_char", "char(10)"), col("c_int", "int")],
            vec![
                vec![NativeValue::Text("char10    ".into()), NativeValue::Int32(2)],
                vec![NativeValue::Null, NativeValue::Int32(1)],
            ],
        );
        let table = ResultAssembler::default().table(raw, ColumnRole::Time).unwrap();
        assert_eq!(table.columns, vec!["c_char", "c_int"]);
        assert_eq!(
            table.rows,
            vec![
                vec![NormalizedValue::String("char10    ".into()), NormalizedValue::Int64(2)],
                vec![NormalizedValue::Null, NormalizedValue::Int64(1)],
            ]
        );
    }

    #[test]
    fn test_annotation_time_is_normalized() {
        let secs: i64 = 1_521_118_800;
        let dt = NaiveDate::from_ymd_opt(2018, 3, 15)
            .unwrap()
            .and_hms_opt(13, 0, 0)
            .unwrap();

        let cases = [
            (col("time", "datetime"), NativeValue::DateTime(dt), NormalizedValue::Float64((secs * 1000) as f64)),
            (col("time", "int"), NativeValue::Int32(secs as i32), NormalizedValue::Int64(secs * 1000)),
            (
                col("TIME", "bigint"),
                NativeValue::Int64(secs * 1000),
                NormalizedValue::Int64(secs * 1000),
            ),
            (
                col("time", "numeric"),
                NativeValue::Decimal { mantissa: (secs * 1000) as i128, scale: 0 },
                NormalizedValue::Float64((secs * 1000) as f64),
            ),
            (col("time", "datetime"), NativeValue::Null, NormalizedValue::Null),
        ];

        for (column, value, expected) in cases {
            let raw = RawResultSet::new(
                vec![column, col("text", "nvarchar")],
                vec![vec![value, NativeValue::Text("deploy".into())]],
            );
            let table = ResultAssembler::default().table(raw, ColumnRole::Time).unwrap();
            assert_eq!(table.rows[0][0], expected);
            assert_eq!(table.rows[0][1], NormalizedValue::String("deploy".into()));
        }
    }

    #[test]
    fn test_assemble_dispatches_on_format() {
        let range = TimeRange::from_millis(T13_00, T13_00 + 34 * MINUTE).unwrap();
        let assembler = ResultAssembler::default();
        let expanded = ExpandedSql {
            sql: String::new(),
            fill: None,
            epoch_millis_time: true,
        };

        let table = assembler
            .assemble(QueryFormat::Table, bucketed_rows(), &expanded, &range)
            .unwrap();
        assert!(matches!(table, Assembled::Table(_)));
        assert_eq!(table.row_count(), 6);

        let series = assembler
            .assemble(QueryFormat::TimeSeries, bucketed_rows(), &expanded, &range)
            .unwrap();
        assert!(matches!(series, Assembled::Series(_)));
    }
}
