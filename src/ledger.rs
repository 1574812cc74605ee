use std::{fs, io::ErrorKind, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    core::{log::EnergyLog, session::Device, session::UsageSession, tariff::Tariff},
    error::RateError,
    prelude::*,
};

/// Household devices and energy logs stored in a JSON file.
#[must_use]
#[derive(Default, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub devices: Vec<Device>,

    #[serde(default)]
    pub logs: Vec<EnergyLog>,
}

impl Ledger {
    /// Read the ledger, starting an empty one when the file does not exist yet.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn read(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let this: Self =
                    serde_json::from_str(&contents).context("failed to parse the ledger")?;
                info!(n_devices = this.devices.len(), n_logs = this.logs.len(), "loaded the ledger");
                Ok(this)
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                warn!("the ledger does not exist yet, starting a new one");
                Ok(Self::default())
            }
            Err(error) => Err(error).context("failed to read the ledger"),
        }
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn write(&self, path: &Path) -> Result {
        let contents = serde_json::to_string_pretty(self)?;
        let temporary_path = path.with_extension("json.tmp");
        fs::write(&temporary_path, contents).context("failed to write the ledger")?;
        fs::rename(&temporary_path, path).context("failed to replace the ledger")?;
        info!(n_logs = self.logs.len(), "saved the ledger");
        Ok(())
    }

    pub fn add_device(&mut self, device: Device) -> Result<(), RateError> {
        device.validate()?;
        if self.devices.iter().any(|existing| existing.id == device.id) {
            return Err(RateError::InvalidSession(format!("device `{}` already exists", device.id)));
        }
        self.devices.push(device);
        Ok(())
    }

    /// Price the session with the schedule of its day and append it.
    pub fn record(&mut self, session: UsageSession, tariff: &Tariff) -> Result<&EnergyLog, RateError> {
        let device = household_device(&self.devices, &session)?;
        let schedule = tariff.schedule_on(session.date)?;
        let mut log = EnergyLog::builder().id(self.next_id()).session(session).build();
        log.reprice(device, schedule)?;
        self.logs.push(log);
        Ok(&self.logs[self.logs.len() - 1])
    }

    pub fn remove(&mut self, id: u64) -> Option<EnergyLog> {
        let index = self.logs.iter().position(|log| log.id == id)?;
        Some(self.logs.remove(index))
    }

    /// Recalculate every stored cost, returns the number of repriced logs.
    ///
    /// Logs that cannot be priced keep their previous figures.
    #[instrument(skip_all)]
    pub fn reprice(&mut self, tariff: &Tariff) -> usize {
        let mut n_repriced = 0;
        for log in &mut self.logs {
            let result = household_device(&self.devices, &log.session).and_then(|device| {
                log.reprice(device, tariff.schedule_on(log.session.date)?)
            });
            match result {
                Ok(()) => n_repriced += 1,
                Err(error) => warn!(log_id = log.id, %error, "failed to reprice the log"),
            }
        }
        n_repriced
    }

    fn next_id(&self) -> u64 {
        self.logs.iter().map(|log| log.id).max().map_or(1, |id| id + 1)
    }
}

/// Device of the session, as long as it belongs to the session household.
fn household_device<'a>(devices: &'a [Device], session: &UsageSession) -> Result<&'a Device, RateError> {
    devices
        .iter()
        .find(|device| device.id == session.device_id && device.household_id == session.household_id)
        .ok_or_else(|| RateError::MissingDevice(session.device_id.clone()))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::quantity::power::Watts;

    fn ledger() -> Ledger {
        let mut ledger = Ledger::default();
        ledger
            .add_device(
                Device::builder().id("dryer").wattage(Watts(3000.0)).household_id("home").build(),
            )
            .unwrap();
        ledger
    }

    fn session(device_id: &str, household_id: &str) -> UsageSession {
        UsageSession::builder()
            .device_id(device_id)
            .date(NaiveDate::from_ymd_opt(2025, 1, 8).unwrap())
            .start_time(NaiveTime::from_hms_opt(7, 0, 0).unwrap())
            .end_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap())
            .household_id(household_id)
            .created_by("alice")
            .build()
    }

    #[test]
    fn test_record() {
        let mut ledger = ledger();
        let log = ledger.record(session("dryer", "home"), &Tariff::default()).unwrap();
        assert_eq!(log.id, 1);
        // 3 kWh off-peak at $0.24 plus 3 kWh super off-peak at $0.22:
        assert_abs_diff_eq!(log.cost.as_ref().unwrap().calculated_cost.0, 1.38, epsilon = 1e-9);

        let log = ledger.record(session("dryer", "home"), &Tariff::default()).unwrap();
        assert_eq!(log.id, 2);
    }

    #[test]
    fn test_record_rejects_foreign_devices() {
        let mut ledger = ledger();
        assert_eq!(
            ledger.record(session("kettle", "home"), &Tariff::default()).unwrap_err(),
            RateError::MissingDevice("kettle".to_string()),
        );
        assert_eq!(
            ledger.record(session("dryer", "neighbours"), &Tariff::default()).unwrap_err(),
            RateError::MissingDevice("dryer".to_string()),
        );
        assert!(ledger.logs.is_empty());
    }

    #[test]
    fn test_add_device_rejects_duplicates() {
        let mut ledger = ledger();
        let duplicate =
            Device::builder().id("dryer").wattage(Watts(100.0)).household_id("home").build();
        assert!(ledger.add_device(duplicate).is_err());
    }

    #[test]
    fn test_remove() {
        let mut ledger = ledger();
        ledger.record(session("dryer", "home"), &Tariff::default()).unwrap();
        assert!(ledger.remove(2).is_none());
        assert_eq!(ledger.remove(1).unwrap().id, 1);
        assert!(ledger.logs.is_empty());
    }

    #[test]
    fn test_reprice_fills_missing_costs() {
        let mut ledger = ledger();
        ledger.logs.push(EnergyLog::builder().id(10).session(session("dryer", "home")).build());
        ledger.logs.push(EnergyLog::builder().id(11).session(session("ghost", "home")).build());
        assert_eq!(ledger.reprice(&Tariff::default()), 1);
        assert!(ledger.logs[0].cost.is_some());
        assert!(ledger.logs[1].cost.is_none());
    }

    #[test]
    fn test_reprice_skips_foreign_households() {
        let mut ledger = ledger();
        ledger.logs.push(EnergyLog::builder().id(12).session(session("dryer", "neighbours")).build());
        assert_eq!(ledger.reprice(&Tariff::default()), 0);
        assert!(ledger.logs[0].cost.is_none());
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("wattshare-{}-ledger.json", std::process::id()));
        let _ = fs::remove_file(&path);

        let mut ledger = Ledger::read(&path).unwrap();
        assert!(ledger.devices.is_empty());
        assert!(ledger.logs.is_empty());

        ledger
            .add_device(
                Device::builder().id("dryer").wattage(Watts(3000.0)).household_id("home").build(),
            )
            .unwrap();
        ledger.record(session("dryer", "home"), &Tariff::default()).unwrap();
        ledger.write(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let parsed = Ledger::read(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(parsed.devices[0].id, "dryer");
        assert_eq!(parsed.logs[0].id, 1);
        assert_eq!(parsed.logs[0].cost, ledger.logs[0].cost);
    }

    #[test]
    fn test_json_round_trip() {
        let mut ledger = ledger();
        ledger.record(session("dryer", "home"), &Tariff::default()).unwrap();
        let parsed: Ledger = serde_json::from_str(&serde_json::to_string(&ledger).unwrap()).unwrap();
        assert_eq!(parsed.devices.len(), 1);
        assert_eq!(parsed.logs[0].cost, ledger.logs[0].cost);
    }
}
