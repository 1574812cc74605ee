use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
    fmt::{Display, Formatter},
    ops::AddAssign,
};

use tracing::{instrument, warn};

use crate::{
    core::{
        calculator::{SessionCost, Usage, compute_session_cost},
        log::EnergyLog,
        month::Month,
        period::RatePeriod,
        session::Device,
        tariff::Tariff,
    },
    error::RateError,
    ops::DateRange,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum GroupBy {
    User,
    Device,
    Month,
    Period,
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum GroupKey {
    User(String),
    Device(String),
    Month(Month),
    Period(RatePeriod),
}

impl Display for GroupKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) | Self::Device(id) => write!(f, "{id}"),
            Self::Month(month) => write!(f, "{month}"),
            Self::Period(period) => write!(f, "{period}"),
        }
    }
}

/// Accumulated figures of a group.
#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Aggregate {
    pub usage: Usage,

    /// Number of logs that contributed to the group.
    pub n_logs: usize,

    /// Whether any contribution was priced on the fly instead of taken from a stored breakdown.
    pub is_estimated: bool,
}

impl AddAssign for Aggregate {
    fn add_assign(&mut self, rhs: Self) {
        self.usage += rhs.usage;
        self.n_logs += rhs.n_logs;
        self.is_estimated |= rhs.is_estimated;
    }
}

impl Aggregate {
    const fn new(usage: Usage, is_estimated: bool) -> Self {
        Self { usage, n_logs: 1, is_estimated }
    }
}

/// Log that could not be priced on the fly.
#[derive(Debug)]
pub struct SkippedLog {
    pub id: u64,
    pub reason: RateError,
}

#[must_use]
#[derive(Debug)]
pub struct AggregationResult {
    pub group_by: GroupBy,
    pub dates: Option<DateRange>,
    pub groups: BTreeMap<GroupKey, Aggregate>,
    pub total: Aggregate,
    pub skipped: Vec<SkippedLog>,
}

/// Roll up the logs by the group key.
///
/// Logs without a stored cost are priced through the same pipeline with the tariff schedule of
/// the session day and marked as estimated. Those which still cannot be priced are skipped.
#[instrument(skip_all, fields(n_logs = logs.len(), group_by = ?group_by))]
pub fn aggregate(
    logs: &[EnergyLog],
    devices: &[Device],
    tariff: &Tariff,
    group_by: GroupBy,
    dates: Option<DateRange>,
) -> AggregationResult {
    let devices: HashMap<&str, &Device> =
        devices.iter().map(|device| (device.id.as_str(), device)).collect();
    let mut groups = BTreeMap::<GroupKey, Aggregate>::new();
    let mut total = Aggregate::default();
    let mut skipped = Vec::new();

    for log in logs {
        if dates.is_some_and(|dates| !dates.contains(log.session.date)) {
            continue;
        }
        let (cost, is_estimated) = match price(log, &devices, tariff) {
            Ok(priced) => priced,
            Err(reason) => {
                warn!(log_id = log.id, %reason, "skipping the log");
                skipped.push(SkippedLog { id: log.id, reason });
                continue;
            }
        };
        total += Aggregate::new(cost.total(), is_estimated);

        let session = &log.session;
        let contributions: Vec<(GroupKey, Usage)> = match group_by {
            GroupBy::User => session
                .allocation()
                .into_iter()
                .map(|(user_id, fraction)| {
                    (GroupKey::User(user_id.to_string()), cost.total().scaled(fraction))
                })
                .collect(),
            GroupBy::Device => vec![(GroupKey::Device(session.device_id.clone()), cost.total())],
            GroupBy::Month => vec![(GroupKey::Month(Month::of(session.date)), cost.total())],
            GroupBy::Period => cost
                .rate_breakdown
                .iter()
                .map(|(period, usage)| (GroupKey::Period(*period), *usage))
                .collect(),
        };
        for (key, usage) in contributions {
            *groups.entry(key).or_default() += Aggregate::new(usage, is_estimated);
        }
    }

    AggregationResult { group_by, dates, groups, total, skipped }
}

/// Stored cost of the log, or the on-the-fly estimate.
fn price<'a>(
    log: &'a EnergyLog,
    devices: &HashMap<&str, &Device>,
    tariff: &Tariff,
) -> Result<(Cow<'a, SessionCost>, bool), RateError> {
    if let Some(cost) = &log.cost {
        return Ok((Cow::Borrowed(cost), false));
    }
    let device = devices
        .get(log.session.device_id.as_str())
        .ok_or_else(|| RateError::MissingDevice(log.session.device_id.clone()))?;
    let schedule = tariff.schedule_on(log.session.date)?;
    Ok((Cow::Owned(compute_session_cost(device, &log.session, schedule)?), true))
}
