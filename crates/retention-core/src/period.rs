//! Retention periods: `type|expression` values such as `year|5` or
//! `yearend|1`, and the date arithmetic that turns an anchor into an as-of
//! date.

use crate::error::{Result, RetentionError};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodType {
    None,
    Immediately,
    Day,
    Week,
    Month,
    Quarter,
    Year,
    MonthEnd,
    QuarterEnd,
    YearEnd,
}

impl PeriodType {
    pub fn all() -> &'static [PeriodType] {
        &[
            PeriodType::None,
            PeriodType::Immediately,
            PeriodType::Day,
            PeriodType::Week,
            PeriodType::Month,
            PeriodType::Quarter,
            PeriodType::Year,
            PeriodType::MonthEnd,
            PeriodType::QuarterEnd,
            PeriodType::YearEnd,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::None => "none",
            PeriodType::Immediately => "immediately",
            PeriodType::Day => "day",
            PeriodType::Week => "week",
            PeriodType::Month => "month",
            PeriodType::Quarter => "quarter",
            PeriodType::Year => "year",
            PeriodType::MonthEnd => "monthend",
            PeriodType::QuarterEnd => "quarterend",
            PeriodType::YearEnd => "yearend",
        }
    }

    pub fn display_label(self) -> &'static str {
        match self {
            PeriodType::None => "None",
            PeriodType::Immediately => "Immediately",
            PeriodType::Day => "Day",
            PeriodType::Week => "Week",
            PeriodType::Month => "Month",
            PeriodType::Quarter => "Quarter",
            PeriodType::Year => "Year",
            PeriodType::MonthEnd => "End Of Month",
            PeriodType::QuarterEnd => "End Of Quarter",
            PeriodType::YearEnd => "End Of Year",
        }
    }

    /// Whether the type takes a count (`day|5`) or stands alone (`none`).
    pub fn takes_count(self) -> bool {
        !matches!(self, PeriodType::None | PeriodType::Immediately)
    }
}

/// A retention or review period in its `type|count` string form.
///
/// `next_date` is pure: the same period and anchor always produce the same
/// instant, and the `none` period never produces one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    pub period_type: PeriodType,
    pub count: i32,
}

impl Period {
    pub const NONE: Period = Period {
        period_type: PeriodType::None,
        count: 0,
    };

    pub const IMMEDIATELY: Period = Period {
        period_type: PeriodType::Immediately,
        count: 0,
    };

    pub fn new(period_type: PeriodType, count: i32) -> Self {
        let count = if period_type.takes_count() { count } else { 0 };
        Period { period_type, count }
    }

    pub fn is_none(&self) -> bool {
        self.period_type == PeriodType::None
    }

    /// The instant this period ends when started at `anchor`. `None` for the
    /// `none` period, and for results outside the representable calendar.
    pub fn next_date(&self, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let n = self.count;
        match self.period_type {
            PeriodType::None => None,
            PeriodType::Immediately => Some(anchor),
            PeriodType::Day => anchor.checked_add_signed(Duration::try_days(i64::from(n))?),
            PeriodType::Week => anchor.checked_add_signed(Duration::try_weeks(i64::from(n))?),
            PeriodType::Month => add_months(anchor, i64::from(n)),
            PeriodType::Quarter => add_months(anchor, i64::from(n) * 3),
            PeriodType::Year => add_months(anchor, i64::from(n) * 12),
            PeriodType::MonthEnd => {
                let index = month_index(anchor) + i64::from(n) - 1;
                end_of_month_index(index)
            }
            PeriodType::QuarterEnd => {
                let mut quarter = month_index(anchor).div_euclid(3);
                // An anchor already on the quarter's closing instant rolls into
                // the next quarter.
                if end_of_month_index(quarter * 3 + 2)? <= anchor {
                    quarter += 1;
                }
                end_of_month_index((quarter + i64::from(n) - 1) * 3 + 2)
            }
            PeriodType::YearEnd => {
                let year = i64::from(anchor.year()) + i64::from(n) - 1;
                end_of_month_index(year * 12 + 11)
            }
        }
    }
}

fn add_months(anchor: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        anchor.checked_add_months(magnitude)
    } else {
        anchor.checked_sub_months(magnitude)
    }
}

/// Months since year 0, January = 0.
fn month_index(date: DateTime<Utc>) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

/// 23:59:59.999 on the last day of the month at `index`.
fn end_of_month_index(index: i64) -> Option<DateTime<Utc>> {
    let next = index + 1;
    let year = i32::try_from(next.div_euclid(12)).ok()?;
    let month = u32::try_from(next.rem_euclid(12)).ok()? + 1;
    let last_day = NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()?;
    let time = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?;
    Some(Utc.from_utc_datetime(&last_day.and_time(time)))
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.period_type.takes_count() {
            write!(f, "{}|{}", self.period_type.as_str(), self.count)
        } else {
            f.write_str(self.period_type.as_str())
        }
    }
}

impl FromStr for Period {
    type Err = RetentionError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RetentionError::InvalidPeriod(s.to_string());
        let (kind, expression) = match s.trim().split_once('|') {
            Some((kind, expr)) => (kind.trim(), Some(expr.trim())),
            None => (s.trim(), None),
        };
        let period_type = PeriodType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == kind)
            .ok_or_else(invalid)?;
        let count = match expression {
            Some(expr) if period_type.takes_count() && !expr.is_empty() => {
                expr.parse::<i32>().map_err(|_| invalid())?
            }
            _ => 1,
        };
        Ok(Period::new(period_type, count))
    }
}

impl TryFrom<String> for Period {
    type Error = RetentionError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
