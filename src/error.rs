use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::core::schedule::DayType;

/// Rate engine failures.
///
/// Calculation itself is total over valid inputs, so these are input or configuration defects.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateError {
    /// The schedule does not cover the combination, fatal configuration error.
    #[error("schedule `{schedule}` has no rate for {season} ({day_type}) at hour {hour}")]
    ScheduleGap { schedule: String, season: String, day_type: DayType, hour: u32 },

    #[error("schedule `{schedule}` has more than one rate for {season} ({day_type}) at hour {hour}")]
    ScheduleOverlap { schedule: String, season: String, day_type: DayType, hour: u32 },

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("no rate schedule is in effect on {0}")]
    NoSchedule(NaiveDate),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("device `{0}` is not found")]
    MissingDevice(String),
}

impl RateError {
    pub fn empty_window(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self::InvalidSession(format!("session must end after it starts ({start} → {end})"))
    }
}
