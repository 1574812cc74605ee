use std::{fs, path::Path};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{core::schedule::RateSchedule, error::RateError, prelude::*};

/// Rate schedule versions, ordered by the day they come into effect.
#[must_use]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tariff {
    schedules: Vec<RateSchedule>,
}

impl Default for Tariff {
    fn default() -> Self {
        Self { schedules: vec![RateSchedule::default()] }
    }
}

impl Tariff {
    pub fn try_new(mut schedules: Vec<RateSchedule>) -> Result<Self, RateError> {
        if schedules.is_empty() {
            return Err(RateError::InvalidSchedule("tariff has no schedules".to_string()));
        }
        for schedule in &schedules {
            schedule.validate()?;
        }
        // `None` sorts first, which is exactly «since forever».
        schedules.sort_by_key(|schedule| schedule.effective_from);
        if let Some(pair) = schedules
            .windows(2)
            .find(|pair| pair[0].effective_from == pair[1].effective_from)
        {
            return Err(RateError::InvalidSchedule(format!(
                "schedules `{}` and `{}` come into effect on the same day",
                pair[0].name, pair[1].name,
            )));
        }
        Ok(Self { schedules })
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context("failed to read the tariff")?;
        let this: Self = toml::from_str(&contents).context("failed to parse the tariff")?;
        let this = Self::try_new(this.schedules)?;
        info!(n_schedules = this.schedules.len(), "loaded the tariff");
        Ok(this)
    }

    /// Schedule in effect on the date: the latest one that started on or before it.
    pub fn schedule_on(&self, date: NaiveDate) -> Result<&RateSchedule, RateError> {
        self.schedules
            .iter()
            .rev()
            .find(|schedule| schedule.effective_from.is_none_or(|since| since <= date))
            .ok_or(RateError::NoSchedule(date))
    }

    pub fn schedules(&self) -> &[RateSchedule] {
        &self.schedules
    }
}
