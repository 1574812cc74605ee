use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        calculator::{SessionCost, compute_session_cost},
        schedule::RateSchedule,
        session::{Device, UsageSession},
    },
    error::RateError,
};

/// Persisted usage session with its calculated cost.
///
/// The cost is optional so that imported or hand-edited logs still aggregate, as estimates.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct EnergyLog {
    pub id: u64,

    #[serde(flatten)]
    pub session: UsageSession,

    #[serde(flatten)]
    pub cost: Option<SessionCost>,
}

impl EnergyLog {
    /// Recalculate the stored cost, the only way a log changes after it is written.
    pub fn reprice(&mut self, device: &Device, schedule: &RateSchedule) -> Result<(), RateError> {
        self.cost = Some(compute_session_cost(device, &self.session, schedule)?);
        Ok(())
    }
}
