//! Canonical time grains
//!
//! The date-truncation units every engine spec maps to a dialect-specific
//! expression template with a `{col}` hole.

use serde::{Deserialize, Serialize};

/// Canonical ordinal of date-truncation units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeGrain {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeGrain {
    pub const ALL: [TimeGrain; 8] = [
        TimeGrain::Second,
        TimeGrain::Minute,
        TimeGrain::Hour,
        TimeGrain::Day,
        TimeGrain::Week,
        TimeGrain::Month,
        TimeGrain::Quarter,
        TimeGrain::Year,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeGrain::Second => "SECOND",
            TimeGrain::Minute => "MINUTE",
            TimeGrain::Hour => "HOUR",
            TimeGrain::Day => "DAY",
            TimeGrain::Week => "WEEK",
            TimeGrain::Month => "MONTH",
            TimeGrain::Quarter => "QUARTER",
            TimeGrain::Year => "YEAR",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "SECOND" => Some(TimeGrain::Second),
            "MINUTE" => Some(TimeGrain::Minute),
            "HOUR" => Some(TimeGrain::Hour),
            "DAY" => Some(TimeGrain::Day),
            "WEEK" => Some(TimeGrain::Week),
            "MONTH" => Some(TimeGrain::Month),
            "QUARTER" => Some(TimeGrain::Quarter),
            "YEAR" => Some(TimeGrain::Year),
            _ => None,
        }
    }
}

impl std::fmt::Display for TimeGrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substitute the `{col}` hole in a grain expression template.
pub fn fill_template(template: &str, col: &str) -> String {
    template.replace("{col}", col)
}
