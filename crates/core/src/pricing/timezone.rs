//! Business timezone boundary.
//!
//! Instants are stored and compared in UTC. User-entered effective dates are
//! naive wall-clock values in a fixed-offset business timezone (UTC+7 by
//! default, no daylight saving). Conversion happens only here.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use thiserror::Error;

/// Default business offset from UTC, in hours.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 7;

/// Accepted local input formats.
const LOCAL_INPUT_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Local display format.
const LOCAL_OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Errors raised at the timezone boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimezoneError {
    /// Offset outside +/-23 hours.
    #[error("Invalid UTC offset: {0} hours")]
    InvalidOffset(i32),

    /// Text is not a `YYYY-MM-DDTHH:mm` timestamp.
    #[error("Malformed local timestamp '{0}', expected YYYY-MM-DDTHH:mm")]
    Malformed(String),

    /// The timestamp cannot be represented as a UTC instant.
    #[error("Local timestamp {0} is out of range")]
    OutOfRange(NaiveDateTime),
}

/// Fixed-offset timezone used for all user-facing dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessTimezone {
    offset: FixedOffset,
}

impl Default for BusinessTimezone {
    fn default() -> Self {
        Self::from_offset_hours(DEFAULT_UTC_OFFSET_HOURS).unwrap_or(Self { offset: Utc.fix() })
    }
}

impl BusinessTimezone {
    /// Creates a timezone `hours` east of UTC.
    pub fn from_offset_hours(hours: i32) -> Result<Self, TimezoneError> {
        hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .map(|offset| Self { offset })
            .ok_or(TimezoneError::InvalidOffset(hours))
    }

    /// The UTC offset.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Parses `YYYY-MM-DDTHH:mm` (optionally `:ss`) business-local text into
    /// a UTC instant.
    pub fn parse_local(&self, text: &str) -> Result<DateTime<Utc>, TimezoneError> {
        let text = text.trim();
        let naive = LOCAL_INPUT_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
            .ok_or_else(|| TimezoneError::Malformed(text.to_string()))?;
        self.from_local(naive)
    }

    /// Converts a business-local wall-clock value into a UTC instant.
    pub fn from_local(&self, local: NaiveDateTime) -> Result<DateTime<Utc>, TimezoneError> {
        local
            .and_local_timezone(self.offset)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or(TimezoneError::OutOfRange(local))
    }

    /// Formats a UTC instant as business-local `YYYY-MM-DDTHH:mm`.
    #[must_use]
    pub fn format_local(&self, instant: DateTime<Utc>) -> String {
        self.to_local(instant).format(LOCAL_OUTPUT_FORMAT).to_string()
    }

    /// Converts a UTC instant to business-local wall-clock time.
    #[must_use]
    pub fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset).naive_local()
    }

    /// The business-local calendar date of `instant`.
    #[must_use]
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.to_local(instant).date()
    }

    /// Midnight of the business day after the one containing `now`.
    pub fn start_of_next_day(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimezoneError> {
        let today = self.local_date(now);
        let tomorrow = today
            .checked_add_days(Days::new(1))
            .ok_or(TimezoneError::OutOfRange(today.and_time(NaiveTime::MIN)))?;
        self.from_local(tomorrow.and_time(NaiveTime::MIN))
    }
}
