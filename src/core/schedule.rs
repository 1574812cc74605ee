use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use chrono::{Datelike, NaiveDate, Weekday};
use enumset::EnumSet;
use serde::{Deserialize, Serialize};

use crate::{
    core::period::RatePeriod,
    error::RateError,
    quantity::{Quantity, rate::KilowattHourRate},
};

#[derive(Debug, Hash, Serialize, Deserialize, enumset::EnumSetType)]
#[enumset(serialize_repr = "list")]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    Weekday,
    Weekend,
}

impl Display for DayType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weekday => write!(f, "weekday"),
            Self::Weekend => write!(f, "weekend"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Season {
    pub name: String,

    /// Calendar months, `1..=12`.
    pub months: Vec<u32>,
}

impl Season {
    fn contains(&self, date: NaiveDate) -> bool {
        self.months.contains(&date.month())
    }
}

/// Single row of a rate schedule: price for an hour range of a season and a set of day types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateBand {
    pub season: String,

    #[serde(default = "EnumSet::all")]
    pub days: EnumSet<DayType>,

    /// Inclusive.
    pub start_hour: u32,

    /// Exclusive, `24` stands for the next midnight.
    pub end_hour: u32,

    pub period: RatePeriod,

    #[serde(rename = "price_per_kwh")]
    pub price: KilowattHourRate,
}

impl RateBand {
    fn matches(&self, season: &str, day_type: DayType, hour: u32) -> bool {
        self.season == season
            && self.days.contains(day_type)
            && (self.start_hour..self.end_hour).contains(&hour)
    }
}

/// Rate resolved for a specific hour.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rate {
    pub period: RatePeriod,
    pub price: KilowattHourRate,

    /// Hour of the same day at which the band ends, `24` for midnight.
    pub until_hour: u32,
}

impl From<&RateBand> for Rate {
    fn from(band: &RateBand) -> Self {
        Self { period: band.period, price: band.price, until_hour: band.end_hour }
    }
}

/// Time-of-use rate table.
///
/// Bands are matched in declaration order. [`RateSchedule::validate`] guarantees that exactly one
/// band matches each season, day type, and hour, so the order only matters for unvalidated input.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateSchedule {
    pub name: String,

    /// First day the schedule is in effect, `None` means «since forever».
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,

    pub seasons: Vec<Season>,

    /// Days priced as weekends.
    #[serde(default)]
    pub holidays: BTreeSet<NaiveDate>,

    pub bands: Vec<RateBand>,
}

impl RateSchedule {
    pub fn day_type(&self, date: NaiveDate) -> DayType {
        if self.holidays.contains(&date) || matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
        {
            DayType::Weekend
        } else {
            DayType::Weekday
        }
    }

    #[must_use]
    pub fn season(&self, date: NaiveDate) -> Option<&Season> {
        self.seasons.iter().find(|season| season.contains(date))
    }

    /// Resolve the rate period and price in effect on the date at the hour.
    pub fn resolve(&self, date: NaiveDate, hour: u32) -> Result<Rate, RateError> {
        let day_type = self.day_type(date);
        let season = self.season(date).ok_or_else(|| RateError::ScheduleGap {
            schedule: self.name.clone(),
            season: format!("month {}", date.month()),
            day_type,
            hour,
        })?;
        self.bands
            .iter()
            .find(|band| band.matches(&season.name, day_type, hour))
            .map(Rate::from)
            .ok_or_else(|| RateError::ScheduleGap {
                schedule: self.name.clone(),
                season: season.name.clone(),
                day_type,
                hour,
            })
    }

    /// Check that the schedule is total and non-overlapping.
    pub fn validate(&self) -> Result<(), RateError> {
        for band in &self.bands {
            if band.start_hour >= band.end_hour || band.end_hour > 24 {
                return Err(RateError::InvalidSchedule(format!(
                    "band `{}` {}..{} has an invalid hour range",
                    band.season, band.start_hour, band.end_hour,
                )));
            }
            if !band.price.0.is_finite() || band.price < KilowattHourRate::ZERO {
                return Err(RateError::InvalidSchedule(format!(
                    "band `{}` {}..{} has an invalid price {}",
                    band.season, band.start_hour, band.end_hour, band.price,
                )));
            }
            if !self.seasons.iter().any(|season| season.name == band.season) {
                return Err(RateError::InvalidSchedule(format!(
                    "band refers to unknown season `{}`",
                    band.season,
                )));
            }
        }

        for month in 1..=12 {
            let n_seasons =
                self.seasons.iter().filter(|season| season.months.contains(&month)).count();
            if n_seasons > 1 {
                return Err(RateError::InvalidSchedule(format!(
                    "month {month} belongs to {n_seasons} seasons",
                )));
            }
            if n_seasons == 0 {
                return Err(RateError::ScheduleGap {
                    schedule: self.name.clone(),
                    season: format!("month {month}"),
                    day_type: DayType::Weekday,
                    hour: 0,
                });
            }
        }

        for season in &self.seasons {
            for day_type in EnumSet::<DayType>::all() {
                for hour in 0..24 {
                    let n_matches = self
                        .bands
                        .iter()
                        .filter(|band| band.matches(&season.name, day_type, hour))
                        .count();
                    match n_matches {
                        1 => {}
                        0 => {
                            return Err(RateError::ScheduleGap {
                                schedule: self.name.clone(),
                                season: season.name.clone(),
                                day_type,
                                hour,
                            });
                        }
                        _ => {
                            return Err(RateError::ScheduleOverlap {
                                schedule: self.name.clone(),
                                season: season.name.clone(),
                                day_type,
                                hour,
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl Default for RateSchedule {
    /// Four-period residential time-of-use plan with on-peak between 16:00 and 21:00.
    fn default() -> Self {
        const SUMMER: &str = "summer";
        const WINTER: &str = "winter";

        let band = |season: &str,
                    days: EnumSet<DayType>,
                    hours: std::ops::Range<u32>,
                    period: RatePeriod,
                    price: f64| RateBand {
            season: season.to_string(),
            days,
            start_hour: hours.start,
            end_hour: hours.end,
            period,
            price: Quantity(price),
        };
        let weekdays = EnumSet::only(DayType::Weekday);
        let weekends = EnumSet::only(DayType::Weekend);
        let all = EnumSet::all();

        Self {
            name: "residential-tou".to_string(),
            effective_from: None,
            seasons: vec![
                Season { name: SUMMER.to_string(), months: vec![6, 7, 8, 9] },
                Season { name: WINTER.to_string(), months: vec![1, 2, 3, 4, 5, 10, 11, 12] },
            ],
            holidays: BTreeSet::new(),
            bands: vec![
                band(SUMMER, weekdays, 0..16, RatePeriod::OffPeak, 0.25),
                band(SUMMER, weekdays, 16..21, RatePeriod::OnPeak, 0.55),
                band(SUMMER, weekdays, 21..24, RatePeriod::OffPeak, 0.25),
                band(SUMMER, weekends, 0..16, RatePeriod::OffPeak, 0.25),
                band(SUMMER, weekends, 16..21, RatePeriod::MidPeak, 0.37),
                band(SUMMER, weekends, 21..24, RatePeriod::OffPeak, 0.25),
                band(WINTER, all, 0..8, RatePeriod::OffPeak, 0.24),
                band(WINTER, all, 8..16, RatePeriod::SuperOffPeak, 0.22),
                band(WINTER, all, 16..21, RatePeriod::MidPeak, 0.50),
                band(WINTER, all, 21..24, RatePeriod::OffPeak, 0.24),
            ],
        }
    }
}
