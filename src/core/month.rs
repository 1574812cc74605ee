use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{Datelike, Months, NaiveDate, ParseError};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::ops::DateRange;

/// Calendar month, the billing unit.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct Month {
    /// Always the first day of the month.
    first_day: NaiveDate,
}

impl Month {
    pub fn of(date: NaiveDate) -> Self {
        Self { first_day: date.with_day(1).unwrap_or(date) }
    }

    #[must_use]
    pub const fn first_day(self) -> NaiveDate {
        self.first_day
    }

    #[must_use]
    pub fn last_day(self) -> NaiveDate {
        self.first_day
            .checked_add_months(Months::new(1))
            .and_then(|date| date.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn dates(self) -> DateRange {
        DateRange::from(self.first_day()..=self.last_day())
    }
}

impl Display for Month {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.first_day.format("%Y-%m"))
    }
}

impl FromStr for Month {
    type Err = ParseError;

    /// Parse `YYYY-MM`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").map(Self::of)
    }
}
