//! Error types for evlog-core

use thiserror::Error;

/// Errors raised by the core conversions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Tick value outside the range chrono can represent
    #[error("Timestamp out of range: {0} ticks")]
    TimestampOutOfRange(i64),

    /// Calendar instant too far from the epoch to count in ticks
    #[error("Date/time out of tick range: {0}")]
    DateTimeOutOfRange(String),

    /// Year/month pair that does not name a calendar month
    #[error("Invalid calendar month: {year:04}-{month:02}")]
    InvalidMonth { year: i32, month: u32 },

    /// Text not in `yyyyMMdd-HHmmss[-fffffff]` form
    #[error("Unsupported time string format: '{0}'")]
    InvalidTimeString(String),
}
