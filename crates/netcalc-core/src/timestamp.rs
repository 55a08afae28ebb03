//! Fixed-width wall-clock timestamps.
//!
//! A [`Timestamp`] is a calendar date and clock time with microsecond
//! resolution. Its text form `DD/MM/YYYY HH:MM:SS.UUUUUU` is always exactly
//! [`TS_WIDTH`] bytes, which lets the success response carry two timestamps
//! back to back without a separator.
//!
//! # Invariants
//!
//! - `Timestamp::parse(&t.to_string()) == Ok(t)` for every valid `t`
//! - Years are restricted to four digits so the encoding stays fixed-width

use std::{fmt, time::Duration};

use chrono::{Datelike, Local, Timelike};
use thiserror::Error;

/// Width in bytes of an encoded timestamp.
pub const TS_WIDTH: usize = 26;

/// Separators expected after each numeric field, in order.
const SEPARATORS: [char; 6] = ['/', '/', ' ', ':', ':', '.'];

/// Number of numeric fields in an encoded timestamp.
const FIELD_COUNT: usize = 7;

const MICROS_PER_SECOND: u64 = 1_000_000;

/// Errors from building or parsing a [`Timestamp`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    /// Fewer than seven numeric fields could be recovered.
    #[error("timestamp has {found} of 7 numeric fields")]
    MissingFields {
        /// Number of fields recovered before the input ran out.
        found: usize,
    },

    /// A field contained something other than digits.
    #[error("timestamp field {index} is not numeric")]
    InvalidField {
        /// Zero-based field position (day = 0, microsecond = 6).
        index: usize,
    },

    /// Extra characters after the microsecond field.
    #[error("unexpected trailing data after timestamp: {0:?}")]
    TrailingData(String),

    /// A field is outside its calendar range.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: u32,
    },
}

/// Wall-clock instant with microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    day: u32,
    month: u32,
    year: u32,
    hour: u32,
    minute: u32,
    second: u32,
    micros: u32,
}

impl Timestamp {
    /// Build a timestamp from calendar fields.
    ///
    /// The day is only checked against 1-31; no month-length validation is
    /// done because the value is never converted back to a calendar date.
    pub fn new(
        day: u32,
        month: u32,
        year: u32,
        hour: u32,
        minute: u32,
        second: u32,
        micros: u32,
    ) -> Result<Self, TimestampError> {
        check_range("day", day, 1, 31)?;
        check_range("month", month, 1, 12)?;
        check_range("year", year, 1000, 9999)?;
        check_range("hour", hour, 0, 23)?;
        check_range("minute", minute, 0, 59)?;
        check_range("second", second, 0, 59)?;
        check_range("microsecond", micros, 0, 999_999)?;

        Ok(Self { day, month, year, hour, minute, second, micros })
    }

    /// Current local wall-clock time.
    pub fn now() -> Self {
        let now = Local::now();
        // chrono reports leap seconds as nanosecond >= 1e9
        let micros = (now.nanosecond() / 1_000).min(999_999);
        let year = u32::try_from(now.year()).unwrap_or(1000).clamp(1000, 9999);

        Self {
            day: now.day(),
            month: now.month(),
            year,
            hour: now.hour(),
            minute: now.minute(),
            second: now.second().min(59),
            micros,
        }
    }

    /// Parse the `DD/MM/YYYY HH:MM:SS.UUUUUU` form.
    pub fn parse(input: &str) -> Result<Self, TimestampError> {
        let mut fields = [0u32; FIELD_COUNT];
        let mut rest = input;

        for (index, field) in fields.iter_mut().enumerate() {
            let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            if end == 0 {
                return Err(if rest.is_empty() {
                    TimestampError::MissingFields { found: index }
                } else {
                    TimestampError::InvalidField { index }
                });
            }

            *field = rest[..end].parse().map_err(|_| TimestampError::InvalidField { index })?;
            rest = &rest[end..];

            if let Some(&separator) = SEPARATORS.get(index) {
                rest = match rest.strip_prefix(separator) {
                    Some(remaining) => remaining,
                    None if rest.is_empty() => {
                        return Err(TimestampError::MissingFields { found: index + 1 });
                    },
                    None => return Err(TimestampError::InvalidField { index: index + 1 }),
                };
            }
        }

        if !rest.is_empty() {
            return Err(TimestampError::TrailingData(rest.to_string()));
        }

        let [day, month, year, hour, minute, second, micros] = fields;
        Self::new(day, month, year, hour, minute, second, micros)
    }

    /// Day of month (1-31).
    pub fn day(&self) -> u32 {
        self.day
    }

    /// Month (1-12).
    pub fn month(&self) -> u32 {
        self.month
    }

    /// Four-digit year.
    pub fn year(&self) -> u32 {
        self.year
    }

    /// Hour (0-23).
    pub fn hour(&self) -> u32 {
        self.hour
    }

    /// Minute (0-59).
    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// Second (0-59).
    pub fn second(&self) -> u32 {
        self.second
    }

    /// Microsecond within the second.
    pub fn micros(&self) -> u32 {
        self.micros
    }

    /// Microseconds elapsed since midnight, ignoring the date.
    pub fn micros_since_midnight(&self) -> u64 {
        let seconds =
            (u64::from(self.hour) * 60 + u64::from(self.minute)) * 60 + u64::from(self.second);
        seconds * MICROS_PER_SECOND + u64::from(self.micros)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}/{:02}/{:04} {:02}:{:02}:{:02}.{:06}",
            self.day, self.month, self.year, self.hour, self.minute, self.second, self.micros
        )
    }
}

/// Absolute difference between two clock times of the same day.
///
/// Both timestamps are reduced to microseconds since midnight, so the result
/// is wrong across a day boundary. The server only compares timestamps taken
/// microseconds apart, which keeps that case out of practice.
pub fn diff(a: &Timestamp, b: &Timestamp) -> Duration {
    Duration::from_micros(a.micros_since_midnight().abs_diff(b.micros_since_midnight()))
}

/// Format a duration as `HHh MMm SSs UUUUUUus`.
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    format!(
        "{:02}h {:02}m {:02}s {:06}us",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        duration.subsec_micros()
    )
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), TimestampError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(TimestampError::OutOfRange { field, value })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Timestamp {
        Timestamp::new(7, 3, 2024, 9, 5, 1, 42).unwrap()
    }

    #[test]
    fn display_is_fixed_width() {
        let stamp = sample().to_string();
        assert_eq!(stamp, "07/03/2024 09:05:01.000042");
        assert_eq!(stamp.len(), TS_WIDTH);
    }

    #[test]
    fn parse_roundtrip() {
        let stamp = sample();
        assert_eq!(Timestamp::parse(&stamp.to_string()), Ok(stamp));
    }

    #[test]
    fn parse_rejects_missing_fields() {
        let result = Timestamp::parse("07/03/2024 09:05:01");
        assert_eq!(result, Err(TimestampError::MissingFields { found: 6 }));
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert_eq!(Timestamp::parse(""), Err(TimestampError::MissingFields { found: 0 }));
    }

    #[test]
    fn parse_rejects_letters() {
        let result = Timestamp::parse("07/03/2024 0x:05:01.000042");
        assert!(matches!(result, Err(TimestampError::InvalidField { .. })));
    }

    #[test]
    fn parse_rejects_trailing_data() {
        let result = Timestamp::parse("07/03/2024 09:05:01.000042Z");
        assert_eq!(result, Err(TimestampError::TrailingData("Z".to_string())));
    }

    #[test]
    fn parse_rejects_out_of_range_month() {
        let result = Timestamp::parse("07/13/2024 09:05:01.000042");
        assert_eq!(result, Err(TimestampError::OutOfRange { field: "month", value: 13 }));
    }

    #[test]
    fn now_is_valid() {
        let now = Timestamp::now();
        assert_eq!(Timestamp::parse(&now.to_string()), Ok(now));
    }

    #[test]
    fn diff_of_same_timestamp_is_zero() {
        let stamp = sample();
        assert_eq!(diff(&stamp, &stamp), Duration::ZERO);
    }

    #[test]
    fn diff_ignores_date_and_order() {
        let a = Timestamp::new(1, 1, 2024, 10, 0, 0, 500).unwrap();
        let b = Timestamp::new(2, 2, 2025, 10, 0, 1, 0).unwrap();

        assert_eq!(diff(&a, &b), Duration::from_micros(999_500));
        assert_eq!(diff(&b, &a), Duration::from_micros(999_500));
    }

    #[test]
    fn format_duration_pads_every_field() {
        let duration = Duration::from_micros(3_723_000_250);
        assert_eq!(format_duration(duration), "01h 02m 03s 000250us");
        assert_eq!(format_duration(Duration::ZERO), "00h 00m 00s 000000us");
    }
}
