use std::fmt::{Display, Formatter};

use comfy_table::Color;
use serde::{Deserialize, Serialize};

/// Named time-of-use pricing tier.
#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "camelCase")]
pub enum RatePeriod {
    SuperOffPeak,
    OffPeak,
    MidPeak,
    OnPeak,
}

impl Display for RatePeriod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SuperOffPeak => write!(f, "Super off-peak"),
            Self::OffPeak => write!(f, "Off-peak"),
            Self::MidPeak => write!(f, "Mid-peak"),
            Self::OnPeak => write!(f, "On-peak"),
        }
    }
}

impl RatePeriod {
    pub const fn color(self) -> Color {
        match self {
            Self::SuperOffPeak => Color::Cyan,
            Self::OffPeak => Color::Green,
            Self::MidPeak => Color::DarkYellow,
            Self::OnPeak => Color::Red,
        }
    }
}
