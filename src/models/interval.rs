use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A positive, fixed-width duration such as `5m` or `1h`, stored in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    millis: i64,
}

impl Interval {
    pub fn from_millis(millis: i64) -> Option<Self> {
        (millis > 0).then_some(Self { millis })
    }

    pub fn from_secs(secs: i64) -> Option<Self> {
        secs.checked_mul(1000).and_then(Self::from_millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.millis
    }

    /// Whole seconds, if the interval is a multiple of one second
    pub fn whole_secs(&self) -> Option<i64> {
        (self.millis % 1000 == 0).then_some(self.millis / 1000)
    }

    pub fn as_chrono(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.millis)
    }

    /// Parse `<integer><unit>` where unit is one of `ms`, `s`, `m`, `h`, `d`, `w`.
    /// Surrounding single or double quotes are accepted, so a SQL string literal
    /// like `'5m'` parses the same as `5m`.
    pub fn parse(literal: &str) -> Result<Self, String> {
        let text = unquote(literal.trim());
        if text.is_empty() {
            return Err("empty interval".to_string());
        }

        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("interval `{}` is missing a unit", text))?;
        let (amount, unit) = text.split_at(split);

        if amount.is_empty() {
            return Err(format!("interval `{}` is missing an amount", text));
        }
        let amount: i64 = amount
            .parse()
            .map_err(|_| format!("interval `{}` has an invalid amount", text))?;

        let unit_millis: i64 = match unit {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            "w" => 604_800_000,
            other => return Err(format!("interval `{}` has unknown unit `{}`", text, other)),
        };

        amount
            .checked_mul(unit_millis)
            .and_then(Self::from_millis)
            .ok_or_else(|| format!("interval `{}` must be positive and in range", text))
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(i64, &str); 5] = [
            (604_800_000, "w"),
            (86_400_000, "d"),
            (3_600_000, "h"),
            (60_000, "m"),
            (1_000, "s"),
        ];
        for (size, unit) in UNITS {
            if self.millis % size == 0 {
                return write!(f, "{}{}", self.millis / size, unit);
            }
        }
        write!(f, "{}ms", self.millis)
    }
}

fn unquote(text: &str) -> &str {
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}
