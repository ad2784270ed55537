use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::interval::Interval;

/// Inclusive query time range, fixed for the duration of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Build a range from epoch milliseconds
    pub fn from_millis(from_ms: i64, to_ms: i64) -> Option<Self> {
        let from = Utc.timestamp_millis_opt(from_ms).single()?;
        let to = Utc.timestamp_millis_opt(to_ms).single()?;
        Some(Self { from, to })
    }

    /// Parse a range the way dashboards send it. Each bound may be epoch
    /// milliseconds (`1521117000000`), an RFC 3339 instant, `now`, or
    /// `now-<interval>` (`now-6h`).
    pub fn parse(from: &str, to: &str, now: DateTime<Utc>) -> Result<Self, String> {
        let from = parse_bound(from, now)?;
        let to = parse_bound(to, now)?;
        if from > to {
            return Err(format!(
                "Invalid time range: from {} is after to {}",
                from.to_rfc3339(),
                to.to_rfc3339()
            ));
        }
        Ok(Self { from, to })
    }

    pub fn from_epoch_millis(&self) -> i64 {
        self.from.timestamp_millis()
    }

    pub fn to_epoch_millis(&self) -> i64 {
        self.to.timestamp_millis()
    }

    /// `from` in whole seconds, rounded down
    pub fn from_epoch_secs_floor(&self) -> i64 {
        self.from.timestamp()
    }

    /// `to` in whole seconds, rounded down
    pub fn to_epoch_secs_floor(&self) -> i64 {
        self.to.timestamp()
    }

    /// `to` in whole seconds, rounded up
    pub fn to_epoch_secs_ceil(&self) -> i64 {
        let secs = self.to.timestamp();
        if self.to.timestamp_subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

fn parse_bound(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();

    if raw == "now" {
        return Ok(now);
    }

    if let Some(offset) = raw.strip_prefix("now-") {
        let interval = Interval::parse(offset)?;
        return Ok(now - interval.as_chrono());
    }

    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        let millis: i64 = raw
            .parse()
            .map_err(|_| format!("Invalid epoch timestamp: {}", raw))?;
        return Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| format!("Epoch timestamp out of range: {}", raw));
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("Invalid time range bound: {}", raw))
}
