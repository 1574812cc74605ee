use std::collections::BTreeMap;

use bon::Builder;
use chrono::{Days, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{error::RateError, ops::Interval, quantity::power::Watts};

#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct Device {
    #[builder(into)]
    pub id: String,

    #[builder(default, into)]
    #[serde(default)]
    pub name: String,

    pub wattage: Watts,

    #[builder(default)]
    #[serde(default)]
    pub is_shared: bool,

    #[builder(into)]
    pub household_id: String,
}

impl Device {
    pub fn validate(&self) -> Result<(), RateError> {
        if self.wattage.is_positive() {
            Ok(())
        } else {
            Err(RateError::InvalidSession(format!(
                "device `{}` must have a positive wattage, got {}",
                self.id, self.wattage,
            )))
        }
    }
}

/// Device usage logged by a household member.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct UsageSession {
    #[builder(into)]
    pub device_id: String,

    /// Day the session starts.
    pub date: NaiveDate,

    pub start_time: NaiveTime,

    /// Wall-clock end. A value before `start_time` means the session crosses midnight.
    pub end_time: NaiveTime,

    /// Explicit end day for sessions longer than a day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,

    #[builder(into)]
    pub household_id: String,

    #[builder(into)]
    pub created_by: String,

    /// Members sharing the cost. Empty means the creator pays in full.
    #[builder(default)]
    #[serde(default)]
    pub assigned_user_ids: Vec<String>,

    /// Optional relative weights per assigned member, overriding the even split.
    #[builder(default)]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shares: BTreeMap<String, f64>,
}

impl UsageSession {
    /// Absolute time window of the session.
    pub fn window(&self) -> Result<Interval, RateError> {
        let start = self.date.and_time(self.start_time);
        let end = match self.end_date {
            Some(end_date) => end_date.and_time(self.end_time),
            None if self.end_time < self.start_time => self
                .date
                .checked_add_days(Days::new(1))
                .ok_or_else(|| {
                    RateError::InvalidSession(format!("{} has no next day", self.date))
                })?
                .and_time(self.end_time),
            None => self.date.and_time(self.end_time),
        };
        let window = Interval::new(start, end);
        if window.is_empty() { Err(RateError::empty_window(start, end)) } else { Ok(window) }
    }

    /// Members the cost is attributed to, with their fractions summing up to one.
    #[must_use]
    pub fn allocation(&self) -> Vec<(&str, f64)> {
        if self.assigned_user_ids.is_empty() {
            return vec![(self.created_by.as_str(), 1.0)];
        }
        let weights: Vec<f64> = self
            .assigned_user_ids
            .iter()
            .map(|user_id| {
                self.shares
                    .get(user_id)
                    .copied()
                    .filter(|weight| weight.is_finite() && *weight >= 0.0)
                    .unwrap_or(if self.shares.is_empty() { 1.0 } else { 0.0 })
            })
            .collect();
        // Scale to the largest weight first so that the sum stays finite.
        let max_weight = weights.iter().copied().fold(0.0, f64::max);
        let weights: Vec<f64> = if max_weight > 0.0 {
            weights.into_iter().map(|weight| weight / max_weight).collect()
        } else {
            weights
        };
        let total_weight: f64 = weights.iter().sum();
        #[expect(clippy::cast_precision_loss)]
        let n_users = self.assigned_user_ids.len() as f64;
        self.assigned_user_ids
            .iter()
            .zip(weights)
            .map(|(user_id, weight)| {
                let fraction =
                    if total_weight > 0.0 { weight / total_weight } else { 1.0 / n_users };
                (user_id.as_str(), fraction)
            })
            .collect()
    }
}

/// Parse a wall-clock time like `21:30` or `21:30:15`.
pub fn parse_clock_time(text: &str) -> Result<NaiveTime, RateError> {
    NaiveTime::parse_from_str(text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
        .map_err(|error| RateError::InvalidSession(format!("malformed clock time `{text}`: {error}")))
}
