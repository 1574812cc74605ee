use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};

use crate::{
    core::{
        aggregation::GroupBy,
        month::Month,
        session::{UsageSession, parse_clock_time},
        tariff::Tariff,
    },
    ledger::Ledger,
    ops::DateRange,
    prelude::*,
    quantity::power::Watts,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[clap(flatten)]
    pub files: FileArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the rate schedule, or the rates through a specific day.
    #[clap(name = "schedule")]
    Schedule(ScheduleArgs),

    /// Price a one-off session without storing it.
    #[clap(name = "cost")]
    Cost(Box<CostArgs>),

    /// Price a device session and store it in the ledger.
    #[clap(name = "log")]
    Log(Box<LogArgs>),

    /// Roll the stored logs up by user, device, month, or rate period.
    #[clap(name = "report")]
    Report(ReportArgs),

    /// Apportion a month of household usage between its members.
    #[clap(name = "split")]
    Split(SplitArgs),

    /// Recalculate every stored cost against the current tariff.
    #[clap(name = "reprice")]
    Reprice,

    /// Register a household device.
    #[clap(name = "device")]
    Device(DeviceArgs),

    /// List the registered devices.
    #[clap(name = "devices")]
    Devices,

    /// List the stored logs.
    #[clap(name = "logs")]
    Logs(DateRangeArgs),

    /// Delete a stored log.
    #[clap(name = "remove")]
    Remove(RemoveArgs),
}

#[derive(Parser)]
pub struct FileArgs {
    /// TOML tariff with one or more schedule versions. The built-in schedule is used by default.
    #[clap(long = "tariff", env = "TARIFF_PATH", global = true)]
    pub tariff_path: Option<PathBuf>,

    /// JSON ledger with the household devices and logs.
    #[clap(long = "ledger", env = "LEDGER_PATH", default_value = "household.json", global = true)]
    pub ledger_path: PathBuf,

    #[clap(long = "household", env = "HOUSEHOLD_ID", default_value = "home", global = true)]
    pub household_id: String,
}

impl FileArgs {
    pub fn tariff(&self) -> Result<Tariff> {
        match &self.tariff_path {
            Some(path) => Tariff::read(path),
            None => Ok(Tariff::default()),
        }
    }

    pub fn ledger(&self) -> Result<Ledger> {
        Ledger::read(&self.ledger_path)
    }
}

#[derive(Parser)]
pub struct ScheduleArgs {
    /// Resolve the rates through this day instead of listing the bands.
    #[clap(long)]
    pub on: Option<NaiveDate>,
}

#[derive(Copy, Clone, Parser)]
pub struct WindowArgs {
    /// Day the session starts.
    #[clap(long)]
    pub date: NaiveDate,

    /// Start clock time, `HH:MM`.
    #[clap(long, value_parser = parse_clock_time)]
    pub start: NaiveTime,

    /// End clock time, `HH:MM`. An earlier time than the start means the next day.
    #[clap(long, value_parser = parse_clock_time)]
    pub end: NaiveTime,

    /// End day for sessions longer than a day.
    #[clap(long)]
    pub end_date: Option<NaiveDate>,
}

impl WindowArgs {
    pub fn session(
        self,
        device_id: impl Into<String>,
        household_id: impl Into<String>,
        created_by: impl Into<String>,
    ) -> UsageSession {
        UsageSession::builder()
            .device_id(device_id)
            .date(self.date)
            .start_time(self.start)
            .end_time(self.end)
            .maybe_end_date(self.end_date)
            .household_id(household_id)
            .created_by(created_by)
            .build()
    }
}

#[derive(Parser)]
pub struct CostArgs {
    /// Device power draw in watts.
    #[clap(long)]
    pub watts: Watts,

    #[clap(flatten)]
    pub window: WindowArgs,

    /// Print the breakdown as JSON.
    #[clap(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct LogArgs {
    #[clap(long = "device")]
    pub device_id: String,

    #[clap(flatten)]
    pub window: WindowArgs,

    /// Member logging the session.
    #[clap(long = "user", env = "USER_ID")]
    pub user_id: String,

    /// Members sharing the cost, the logging member pays in full when omitted.
    #[clap(long = "assign", value_delimiter = ',')]
    pub assigned_user_ids: Vec<String>,

    /// Relative weight of an assigned member, `USER=WEIGHT`. Overrides the even split.
    #[clap(long = "share", value_parser = parse_share)]
    pub shares: Vec<(String, f64)>,
}

impl LogArgs {
    pub fn session(&self, household_id: &str) -> UsageSession {
        let mut session = self.window.session(&self.device_id, household_id, &self.user_id);
        session.assigned_user_ids.clone_from(&self.assigned_user_ids);
        session.shares = self.shares.iter().cloned().collect();
        session
    }
}

fn parse_share(text: &str) -> Result<(String, f64)> {
    let (user_id, weight) = text.split_once('=').context("expected `USER=WEIGHT`")?;
    let weight: f64 = weight.parse().context("malformed weight")?;
    ensure!(weight.is_finite() && weight >= 0.0, "weight must be non-negative");
    Ok((user_id.to_string(), weight))
}

#[derive(Copy, Clone, Parser)]
pub struct DateRangeArgs {
    /// First day to include.
    #[clap(long)]
    pub since: Option<NaiveDate>,

    /// Last day to include.
    #[clap(long)]
    pub until: Option<NaiveDate>,
}

impl DateRangeArgs {
    pub fn dates(self) -> Option<DateRange> {
        (self.since.is_some() || self.until.is_some()).then(|| DateRange {
            min: self.since.unwrap_or(NaiveDate::MIN),
            max: self.until.unwrap_or(NaiveDate::MAX),
        })
    }
}

#[derive(Parser)]
pub struct ReportArgs {
    #[clap(long, value_enum, default_value = "user")]
    pub group_by: GroupBy,

    #[clap(flatten)]
    pub dates: DateRangeArgs,
}

#[derive(Parser)]
pub struct SplitArgs {
    /// Billing month, `YYYY-MM`.
    #[clap(long)]
    pub month: Month,
}

#[derive(Parser)]
pub struct DeviceArgs {
    #[clap(long)]
    pub id: String,

    #[clap(long, default_value = "")]
    pub name: String,

    /// Power draw in watts.
    #[clap(long)]
    pub watts: Watts,

    /// Used by the whole household.
    #[clap(long)]
    pub shared: bool,
}

#[derive(Parser)]
pub struct RemoveArgs {
    /// Log ID.
    #[clap(long)]
    pub id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log() {
        let args = Args::try_parse_from([
            "wattshare",
            "--household",
            "flat",
            "log",
            "--device",
            "ac",
            "--date",
            "2025-07-02",
            "--start",
            "23:00",
            "--end",
            "01:00",
            "--user",
            "alice",
            "--assign",
            "alice,bob",
            "--share",
            "alice=2",
        ])
        .unwrap();
        let Command::Log(log) = args.command else { panic!("expected the log command") };
        let session = log.session(&args.files.household_id);
        assert_eq!(session.household_id, "flat");
        assert_eq!(session.assigned_user_ids, ["alice", "bob"]);
        assert_eq!(session.shares.get("alice"), Some(&2.0));
        assert_eq!(session.window().unwrap().len(), chrono::TimeDelta::hours(2));
    }

    #[test]
    fn test_parse_rejects_bad_clock_time() {
        assert!(
            Args::try_parse_from([
                "wattshare", "cost", "--watts", "100", "--date", "2025-07-02", "--start", "25:00",
                "--end", "01:00",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_date_range() {
        assert!(DateRangeArgs { since: None, until: None }.dates().is_none());
        let until = NaiveDate::from_ymd_opt(2025, 7, 31).unwrap();
        let dates = DateRangeArgs { since: None, until: Some(until) }.dates().unwrap();
        assert!(dates.contains(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()));
        assert!(!dates.contains(NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()));
    }

    #[test]
    fn test_parse_share() {
        assert_eq!(parse_share("bob=0.5").unwrap(), ("bob".to_string(), 0.5));
        assert!(parse_share("bob").is_err());
        assert!(parse_share("bob=-1").is_err());
    }
}
