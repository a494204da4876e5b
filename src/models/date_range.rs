use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reasons a requested date range is rejected before any lookups start
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("both a start and an end date are required")]
    Missing,

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    BadFormat(String),

    #[error("start date {from} is after end date {to}")]
    StartAfterEnd { from: NaiveDate, to: NaiveDate },
}

/// Inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    /// Create a range; the start may equal but not follow the end
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, RangeError> {
        if from > to {
            return Err(RangeError::StartAfterEnd { from, to });
        }
        Ok(Self { from, to })
    }

    /// Parse two `YYYY-MM-DD` strings
    pub fn parse(from: &str, to: &str) -> Result<Self, RangeError> {
        let from = parse_date(from)?;
        let to = parse_date(to)?;
        Self::new(from, to)
    }

    /// `(dateFrom, dateTo)` query values for the matches API
    pub fn query_params(&self) -> (String, String) {
        (
            self.from.format(DATE_FORMAT).to_string(),
            self.to.format(DATE_FORMAT).to_string(),
        )
    }

    /// First and last second of the range in UTC
    pub fn utc_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.from.and_time(NaiveTime::MIN).and_utc();
        let end = self
            .to
            .and_hms_opt(23, 59, 59)
            .unwrap_or_else(|| self.to.and_time(NaiveTime::MIN))
            .and_utc();
        (start, end)
    }

    /// Whether a kick-off time falls inside the range
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let (start, end) = self.utc_bounds();
        at >= start && at <= end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.from.format(DATE_FORMAT))
        } else {
            write!(
                f,
                "{} - {}",
                self.from.format(DATE_FORMAT),
                self.to.format(DATE_FORMAT)
            )
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, RangeError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RangeError::Missing);
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| RangeError::BadFormat(value.to_string()))
}
