use chrono::{Days, NaiveTime, TimeDelta, Timelike};

use crate::{
    core::{period::RatePeriod, schedule::RateSchedule},
    error::RateError,
    ops::Interval,
    quantity::{rate::KilowattHourRate, time::Hours},
};

/// Part of a session that lies entirely within one rate band.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SubInterval {
    pub interval: Interval,
    pub period: RatePeriod,
    pub price: KilowattHourRate,
}

impl SubInterval {
    pub fn hours(&self) -> Hours {
        Hours::from(self.interval.len())
    }
}

/// Partition the window into consecutive rate-band intervals.
///
/// The result covers the window without gaps or overlaps. Every midnight is a cut point, so
/// season and day type are re-derived for each calendar day. An empty window yields nothing.
pub fn split(schedule: &RateSchedule, window: Interval) -> Result<Vec<SubInterval>, RateError> {
    let mut intervals = Vec::new();
    let mut cursor = window.start;
    while cursor < window.end {
        let date = cursor.date();
        let rate = schedule.resolve(date, cursor.hour())?;
        let boundary = if rate.until_hour >= 24 {
            date.checked_add_days(Days::new(1))
                .ok_or_else(|| RateError::InvalidSession(format!("{date} is out of range")))?
                .and_time(NaiveTime::MIN)
        } else {
            date.and_time(NaiveTime::MIN) + TimeDelta::hours(i64::from(rate.until_hour))
        };
        let end = boundary.min(window.end);
        intervals.push(SubInterval {
            interval: Interval::new(cursor, end),
            period: rate.period,
            price: rate.price,
        });
        cursor = end;
    }
    Ok(intervals)
}
