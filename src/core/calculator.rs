use std::collections::BTreeMap;

use derive_more::{Add, AddAssign, Sum};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    core::{
        period::RatePeriod,
        schedule::RateSchedule,
        session::{Device, UsageSession},
        splitter::{SubInterval, split},
    },
    error::RateError,
    quantity::{cost::Cost, energy::KilowattHours, power::Watts},
};

/// Energy and money attributed to one bucket.
#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize, Add, AddAssign, Sum)]
pub struct Usage {
    pub kwh: KilowattHours,
    pub cost: Cost,
}

impl Usage {
    pub fn scaled(self, fraction: f64) -> Self {
        Self { kwh: self.kwh * fraction, cost: self.cost * fraction }
    }
}

/// Per-period usage of a session, serialised as `{ "onPeak": { "kwh": …, "cost": … } }`.
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, derive_more::Deref)]
#[serde(transparent)]
pub struct RateBreakdown(BTreeMap<RatePeriod, Usage>);

impl RateBreakdown {
    pub fn accumulate(&mut self, period: RatePeriod, usage: Usage) {
        *self.0.entry(period).or_default() += usage;
    }

    pub fn total(&self) -> Usage {
        self.0.values().copied().sum()
    }
}

impl FromIterator<(RatePeriod, Usage)> for RateBreakdown {
    fn from_iter<T: IntoIterator<Item = (RatePeriod, Usage)>>(iterator: T) -> Self {
        let mut this = Self::default();
        for (period, usage) in iterator {
            this.accumulate(period, usage);
        }
        this
    }
}

/// Calculated figures stored alongside a session.
#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionCost {
    pub total_kwh: KilowattHours,
    pub calculated_cost: Cost,
    pub rate_breakdown: RateBreakdown,
}

impl SessionCost {
    pub const fn total(&self) -> Usage {
        Usage { kwh: self.total_kwh, cost: self.calculated_cost }
    }
}

/// Price the sub-intervals for a device of the wattage.
///
/// Accumulates in full precision, rounding is left to presentation.
pub fn calculate(wattage: Watts, intervals: &[SubInterval]) -> SessionCost {
    let rate_breakdown: RateBreakdown = intervals
        .iter()
        .map(|interval| {
            let kwh = wattage * interval.hours();
            (interval.period, Usage { kwh, cost: kwh * interval.price })
        })
        .collect();
    let total = rate_breakdown.total();
    SessionCost { total_kwh: total.kwh, calculated_cost: total.cost, rate_breakdown }
}

/// Validate the session, split it by the schedule, and price it for the device.
#[instrument(skip_all, fields(device_id = %device.id, date = %session.date))]
pub fn compute_session_cost(
    device: &Device,
    session: &UsageSession,
    schedule: &RateSchedule,
) -> Result<SessionCost, RateError> {
    if device.id != session.device_id {
        return Err(RateError::MissingDevice(session.device_id.clone()));
    }
    device.validate()?;
    let window = session.window()?;
    let intervals = split(schedule, window)?;
    let cost = calculate(device.wattage, &intervals);
    debug!(n_intervals = intervals.len(), total_kwh = ?cost.total_kwh, cost = ?cost.calculated_cost);
    Ok(cost)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{NaiveDate, NaiveTime};

    use super::*;

    fn device(watts: f64) -> Device {
        Device::builder().id("tv").wattage(Watts(watts)).household_id("home").build()
    }

    fn session(date: (i32, u32, u32), start: (u32, u32), end: (u32, u32)) -> UsageSession {
        UsageSession::builder()
            .device_id("tv")
            .date(NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap())
            .start_time(NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap())
            .end_time(NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap())
            .household_id("home")
            .created_by("alice")
            .build()
    }

    fn assert_consistent(cost: &SessionCost) {
        let total = cost.rate_breakdown.total();
        assert_abs_diff_eq!(total.kwh.0, cost.total_kwh.0, epsilon = 1e-9);
        assert_abs_diff_eq!(total.cost.0, cost.calculated_cost.0, epsilon = 1e-9);
    }

    #[test]
    fn test_on_peak_only() {
        let cost = compute_session_cost(
            &device(150.0),
            &session((2025, 7, 2), (16, 0), (21, 0)),
            &RateSchedule::default(),
        )
        .unwrap();
        assert_consistent(&cost);
        assert_abs_diff_eq!(cost.total_kwh.0, 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(cost.calculated_cost.0, 0.4125, epsilon = 1e-12);
        assert_eq!(cost.rate_breakdown.len(), 1);
        assert!(cost.rate_breakdown.contains_key(&RatePeriod::OnPeak));
    }

    #[test]
    fn test_on_peak_into_off_peak() {
        let cost = compute_session_cost(
            &device(1000.0),
            &session((2025, 7, 2), (20, 0), (22, 0)),
            &RateSchedule::default(),
        )
        .unwrap();
        assert_consistent(&cost);
        let on_peak = cost.rate_breakdown[&RatePeriod::OnPeak];
        let off_peak = cost.rate_breakdown[&RatePeriod::OffPeak];
        assert_abs_diff_eq!(on_peak.kwh.0, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(on_peak.cost.0, 0.55, epsilon = 1e-12);
        assert_abs_diff_eq!(off_peak.kwh.0, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(off_peak.cost.0, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(cost.calculated_cost.0, 0.80, epsilon = 1e-12);
    }

    #[test]
    fn test_midnight_crossing_accumulates_per_period() {
        let cost = compute_session_cost(
            &device(2000.0),
            &session((2025, 7, 2), (23, 0), (1, 0)),
            &RateSchedule::default(),
        )
        .unwrap();
        assert_consistent(&cost);
        assert_eq!(cost.rate_breakdown.len(), 1);
        assert_abs_diff_eq!(cost.rate_breakdown[&RatePeriod::OffPeak].kwh.0, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cost.calculated_cost.0, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sums_hold_for_odd_sessions() {
        let schedule = RateSchedule::default();
        for (date, start, end, watts) in [
            ((2025, 7, 5), (0, 7), (23, 59), 17.3),
            ((2025, 1, 8), (7, 13), (16, 47), 2_250.0),
            ((2025, 9, 30), (15, 1), (9, 2), 333.3),
            ((2025, 3, 15), (22, 30), (22, 29), 1.0),
        ] {
            let cost = compute_session_cost(&device(watts), &session(date, start, end), &schedule)
                .unwrap();
            assert_consistent(&cost);
            assert!(cost.calculated_cost > Cost::ZERO);
        }
    }

    #[test]
    fn test_idempotent() {
        let schedule = RateSchedule::default();
        let session = session((2025, 8, 1), (13, 17), (2, 44));
        let first = compute_session_cost(&device(742.0), &session, &schedule).unwrap();
        let second = compute_session_cost(&device(742.0), &session, &schedule).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_invalid_input() {
        let schedule = RateSchedule::default();
        assert!(matches!(
            compute_session_cost(&device(100.0), &session((2025, 7, 2), (9, 0), (9, 0)), &schedule),
            Err(RateError::InvalidSession(_)),
        ));
        assert!(matches!(
            compute_session_cost(&device(0.0), &session((2025, 7, 2), (9, 0), (10, 0)), &schedule),
            Err(RateError::InvalidSession(_)),
        ));

        let mut other = session((2025, 7, 2), (9, 0), (10, 0));
        other.device_id = "fridge".to_string();
        assert_eq!(
            compute_session_cost(&device(100.0), &other, &schedule),
            Err(RateError::MissingDevice("fridge".to_string())),
        );
    }

    #[test]
    fn test_breakdown_wire_format() {
        let breakdown: RateBreakdown = [
            (RatePeriod::OnPeak, Usage { kwh: KilowattHours::from(1.0), cost: Cost::from(0.55) }),
            (RatePeriod::OffPeak, Usage { kwh: KilowattHours::from(1.0), cost: Cost::from(0.25) }),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_value(&breakdown).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "offPeak": { "kwh": 1.0, "cost": 0.25 },
                "onPeak": { "kwh": 1.0, "cost": 0.55 },
            }),
        );
        let parsed: RateBreakdown = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, breakdown);
    }
}
