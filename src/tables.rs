use chrono::{Days, NaiveDate, NaiveTime};
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use itertools::Itertools;

use crate::{
    core::{
        aggregation::AggregationResult,
        bill::BillSplit,
        calculator::{SessionCost, Usage},
        log::EnergyLog,
        schedule::RateSchedule,
        session::Device,
        splitter::split,
    },
    error::RateError,
    ops::Interval,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

fn usage_cells(usage: Usage) -> [Cell; 2] {
    [
        Cell::new(usage.kwh).set_alignment(CellAlignment::Right),
        Cell::new(usage.cost).set_alignment(CellAlignment::Right),
    ]
}

pub fn build_schedule_table(schedule: &RateSchedule) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Season", "Months", "Days", "Start", "End", "Period", "Rate"]);
    for band in &schedule.bands {
        let months = schedule
            .seasons
            .iter()
            .find(|season| season.name == band.season)
            .map(|season| season.months.iter().join(", "))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(&band.season),
            Cell::new(months).add_attribute(Attribute::Dim),
            Cell::new(band.days.iter().join(", ")),
            Cell::new(format!("{:02}:00", band.start_hour)),
            Cell::new(format!("{:02}:00", band.end_hour)).add_attribute(Attribute::Dim),
            Cell::new(band.period).fg(band.period.color()),
            Cell::new(band.price).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

/// Rates in effect through the given day.
pub fn build_day_profile_table(schedule: &RateSchedule, date: NaiveDate) -> Result<Table, RateError> {
    let start = date.and_time(NaiveTime::MIN);
    let end = start
        .checked_add_days(Days::new(1))
        .ok_or_else(|| RateError::InvalidSession(format!("{date} has no next day")))?;
    let day = Interval::new(start, end);
    let mut table = new_table();
    table.set_header(vec!["Start", "End", "Period", "Rate"]);
    for interval in split(schedule, day)? {
        table.add_row(vec![
            Cell::new(interval.interval.start.format("%H:%M")),
            Cell::new(interval.interval.end.format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(interval.period).fg(interval.period.color()),
            Cell::new(interval.price).set_alignment(CellAlignment::Right),
        ]);
    }
    Ok(table)
}

pub fn build_breakdown_table(cost: &SessionCost) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Period", "Energy", "Cost"]);
    for (period, usage) in cost.rate_breakdown.iter() {
        let [energy, subtotal] = usage_cells(*usage);
        table.add_row(vec![Cell::new(period).fg(period.color()), energy, subtotal]);
    }
    let [energy, total] = usage_cells(cost.total());
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        energy.add_attribute(Attribute::Bold),
        total.add_attribute(Attribute::Bold),
    ]);
    table
}

pub fn build_devices_table(devices: &[Device]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["ID", "Name", "Wattage", "Shared"]);
    for device in devices {
        table.add_row(vec![
            Cell::new(&device.id),
            Cell::new(&device.name).add_attribute(Attribute::Dim),
            Cell::new(device.wattage).set_alignment(CellAlignment::Right),
            Cell::new(if device.is_shared { "yes" } else { "" }),
        ]);
    }
    table
}

pub fn build_logs_table<'a>(logs: impl IntoIterator<Item = &'a EnergyLog>) -> Table {
    let mut table = new_table();
    table.set_header(vec!["ID", "Device", "Date", "Start", "End", "Users", "Energy", "Cost"]);
    for log in logs {
        let session = &log.session;
        let users = session.allocation().into_iter().map(|(user_id, _)| user_id).join(", ");
        let (energy, cost) = match &log.cost {
            Some(cost) => {
                let [energy, cost] = usage_cells(cost.total());
                (energy, cost)
            }
            None => (Cell::new("?").fg(Color::DarkYellow), Cell::new("?").fg(Color::DarkYellow)),
        };
        table.add_row(vec![
            Cell::new(log.id).add_attribute(Attribute::Dim),
            Cell::new(&session.device_id),
            Cell::new(session.date.format("%b %d")),
            Cell::new(session.start_time.format("%H:%M")),
            Cell::new(session.end_time.format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(users),
            energy,
            cost,
        ]);
    }
    table
}

/// Groups by descending cost, estimated figures in yellow.
pub fn build_aggregation_table(result: &AggregationResult) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        format!("{:?}", result.group_by),
        "Logs".to_string(),
        "Energy".to_string(),
        "Cost".to_string(),
    ]);
    let groups = result
        .groups
        .iter()
        .sorted_by(|(_, lhs), (_, rhs)| rhs.usage.cost.0.total_cmp(&lhs.usage.cost.0));
    for (key, aggregate) in groups {
        let [energy, cost] = usage_cells(aggregate.usage);
        table.add_row(vec![
            Cell::new(key),
            Cell::new(aggregate.n_logs).set_alignment(CellAlignment::Right),
            energy,
            if aggregate.is_estimated { cost.fg(Color::DarkYellow) } else { cost },
        ]);
    }
    let [energy, cost] = usage_cells(result.total.usage);
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(result.total.n_logs).set_alignment(CellAlignment::Right),
        energy.add_attribute(Attribute::Bold),
        cost.add_attribute(Attribute::Bold),
    ]);
    table
}

pub fn build_bill_split_table(split: &BillSplit) -> Table {
    let mut table = new_table();
    table.set_header(vec!["User", "Energy", "Share", "Cost"]);
    for share in &split.shares {
        let [energy, cost] = usage_cells(share.usage);
        table.add_row(vec![
            Cell::new(&share.user_id),
            energy,
            Cell::new(format!("{:.1}%", share.share * 100.0))
                .set_alignment(CellAlignment::Right)
                .add_attribute(Attribute::Dim),
            if share.is_estimated { cost.fg(Color::DarkYellow) } else { cost.fg(Color::Green) },
        ]);
    }
    let [energy, cost] = usage_cells(split.total.usage);
    table.add_row(vec![
        Cell::new(split.month).add_attribute(Attribute::Bold),
        energy.add_attribute(Attribute::Bold),
        Cell::new(""),
        cost.add_attribute(Attribute::Bold),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_profile_rows() {
        let schedule = RateSchedule::default();
        let weekday = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
        assert_eq!(build_day_profile_table(&schedule, weekday).unwrap().row_count(), 3);
        let winter = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
        assert_eq!(build_day_profile_table(&schedule, winter).unwrap().row_count(), 4);
    }

    #[test]
    fn test_day_profile_on_the_last_day() {
        assert!(build_day_profile_table(&RateSchedule::default(), NaiveDate::MAX).is_err());
    }

    #[test]
    fn test_schedule_rows() {
        let schedule = RateSchedule::default();
        assert_eq!(build_schedule_table(&schedule).row_count(), schedule.bands.len());
    }
}
