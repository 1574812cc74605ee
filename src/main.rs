#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod cli;
mod core;
mod error;
mod ledger;
mod ops;
mod prelude;
mod quantity;
mod tables;

use clap::{Parser, crate_version};

use crate::{
    cli::{Args, Command, CostArgs, FileArgs, LogArgs},
    core::{
        aggregation::aggregate,
        bill::BillSplit,
        calculator::compute_session_cost,
        session::Device,
        tariff::Tariff,
    },
    prelude::*,
    tables::{
        build_aggregation_table,
        build_bill_split_table,
        build_breakdown_table,
        build_day_profile_table,
        build_devices_table,
        build_logs_table,
        build_schedule_table,
    },
};

fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "starting…");

    let Args { files, command } = Args::parse();
    let tariff = files.tariff()?;

    match command {
        Command::Schedule(args) => {
            if let Some(date) = args.on {
                let schedule = tariff.schedule_on(date)?;
                info!(schedule = %schedule.name, %date, "resolving");
                println!("{}", build_day_profile_table(schedule, date)?);
            } else {
                for schedule in tariff.schedules() {
                    info!(name = %schedule.name, effective_from = ?schedule.effective_from, "schedule");
                    println!("{}", build_schedule_table(schedule));
                }
            }
        }
        Command::Cost(args) => {
            cost(&files, &args, &tariff)?;
        }
        Command::Log(args) => {
            log(&files, &args, &tariff)?;
        }
        Command::Report(args) => {
            let ledger = files.ledger()?;
            let result =
                aggregate(&ledger.logs, &ledger.devices, &tariff, args.group_by, args.dates.dates());
            println!("{}", build_aggregation_table(&result));
            if !result.skipped.is_empty() {
                warn!(n_skipped = result.skipped.len(), "some logs could not be priced");
            }
        }
        Command::Split(args) => {
            let ledger = files.ledger()?;
            let split = BillSplit::new(args.month, &ledger.logs, &ledger.devices, &tariff);
            println!("{}", build_bill_split_table(&split));
            if !split.skipped.is_empty() {
                warn!(n_skipped = split.skipped.len(), "some logs could not be priced");
            }
        }
        Command::Reprice => {
            let mut ledger = files.ledger()?;
            let n_repriced = ledger.reprice(&tariff);
            info!(n_repriced, n_logs = ledger.logs.len(), "repriced");
            ledger.write(&files.ledger_path)?;
        }
        Command::Device(args) => {
            let mut ledger = files.ledger()?;
            let device = Device::builder()
                .id(args.id)
                .name(args.name)
                .wattage(args.watts)
                .is_shared(args.shared)
                .household_id(files.household_id.as_str())
                .build();
            ledger.add_device(device)?;
            ledger.write(&files.ledger_path)?;
        }
        Command::Devices => {
            println!("{}", build_devices_table(&files.ledger()?.devices));
        }
        Command::Logs(args) => {
            let ledger = files.ledger()?;
            let dates = args.dates();
            println!(
                "{}",
                build_logs_table(
                    ledger
                        .logs
                        .iter()
                        .filter(|log| dates.is_none_or(|dates| dates.contains(log.session.date)))
                ),
            );
        }
        Command::Remove(args) => {
            let mut ledger = files.ledger()?;
            let log = ledger.remove(args.id).with_context(|| format!("no log #{}", args.id))?;
            info!(log.id, device_id = %log.session.device_id, "removed");
            ledger.write(&files.ledger_path)?;
        }
    }

    info!("done!");
    Ok(())
}

/// Price a session for an unregistered device.
#[instrument(skip_all, fields(watts = %args.watts))]
fn cost(files: &FileArgs, args: &CostArgs, tariff: &Tariff) -> Result {
    let device = Device::builder()
        .id("ad-hoc")
        .wattage(args.watts)
        .household_id(files.household_id.as_str())
        .build();
    let session = args.window.session(&device.id, &files.household_id, &files.household_id);
    let cost = compute_session_cost(&device, &session, tariff.schedule_on(session.date)?)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&cost)?);
    } else {
        println!("{}", build_breakdown_table(&cost));
    }
    Ok(())
}

#[instrument(skip_all, fields(device_id = %args.device_id, user_id = %args.user_id))]
fn log(files: &FileArgs, args: &LogArgs, tariff: &Tariff) -> Result {
    let mut ledger = files.ledger()?;
    let log = ledger.record(args.session(&files.household_id), tariff)?;
    info!(log.id, "logged");
    if let Some(cost) = &log.cost {
        println!("{}", build_breakdown_table(cost));
    }
    ledger.write(&files.ledger_path)?;
    Ok(())
}
