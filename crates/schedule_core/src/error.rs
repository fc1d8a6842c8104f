//! crates/schedule_core/src/error.rs
//!
//! Errors raised while computing occurrences and assembling a schedule.

use uuid::Uuid;

use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// The viewing date is not a valid `YYYY-MM-DD` calendar date.
    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// A recurrence interval of zero or fewer days reached the calculator.
    #[error("recurrence interval must be a positive number of days, got {0}")]
    InvalidRecurrence(i64),

    /// Stepping a series left the range of representable dates.
    #[error("occurrence lies outside the supported calendar range")]
    OutOfRange,

    /// A time block or class points at a record that does not exist.
    #[error("{kind} {id} referenced by the schedule does not exist")]
    DanglingReference { kind: &'static str, id: Uuid },

    #[error("store error: {0}")]
    Port(#[from] PortError),
}

impl ScheduleError {
    /// True when the failure was caused by the caller's input rather than by
    /// the stored data or the store itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ScheduleError::InvalidDate(_))
    }
}

/// A convenience type alias for `Result<T, ScheduleError>`.
pub type ScheduleResult<T> = Result<T, ScheduleError>;
