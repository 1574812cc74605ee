use std::cmp::Reverse;

use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::core::{
    aggregation::{Aggregate, AggregationResult, GroupBy, GroupKey, SkippedLog, aggregate},
    calculator::Usage,
    log::EnergyLog,
    month::Month,
    session::Device,
    tariff::Tariff,
};

#[must_use]
#[derive(Clone, Debug)]
pub struct BillShare {
    pub user_id: String,
    pub usage: Usage,

    /// Fraction of the household cost, `0.0..=1.0`.
    pub share: f64,

    pub is_estimated: bool,
}

/// Household cost of a month apportioned to its members.
#[must_use]
#[derive(Debug)]
pub struct BillSplit {
    pub month: Month,
    pub total: Aggregate,

    /// Largest share first.
    pub shares: Vec<BillShare>,

    pub skipped: Vec<SkippedLog>,
}

impl BillSplit {
    pub fn new(month: Month, logs: &[EnergyLog], devices: &[Device], tariff: &Tariff) -> Self {
        let AggregationResult { groups, total, skipped, .. } =
            aggregate(logs, devices, tariff, GroupBy::User, Some(month.dates()));
        let shares = groups
            .into_iter()
            .filter_map(|(key, aggregate)| match key {
                GroupKey::User(user_id) => Some(BillShare {
                    user_id,
                    usage: aggregate.usage,
                    share: if total.usage.cost.0 > 0.0 {
                        aggregate.usage.cost / total.usage.cost
                    } else {
                        0.0
                    },
                    is_estimated: aggregate.is_estimated,
                }),
                _ => None,
            })
            .sorted_by_key(|share| (Reverse(OrderedFloat(share.usage.cost.0)), share.user_id.clone()))
            .collect();
        Self { month, total, shares, skipped }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::core::aggregation::tests::{devices, logs};

    #[test]
    fn test_july() {
        let july: Month = "2025-07".parse().unwrap();
        let split = BillSplit::new(july, &logs(), &devices(), &Tariff::default());

        assert_abs_diff_eq!(split.total.usage.cost.0, 0.8 + 0.4125 + 0.74, epsilon = 1e-9);
        assert!(!split.total.is_estimated);
        assert_eq!(
            split.shares.iter().map(|share| share.user_id.as_str()).collect::<Vec<_>>(),
            ["carol", "bob", "alice"],
        );
        let shares: f64 = split.shares.iter().map(|share| share.share).sum();
        assert_abs_diff_eq!(shares, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(split.shares[2].usage.cost.0, 0.8 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_august_is_estimated() {
        let august: Month = "2025-08".parse().unwrap();
        let split = BillSplit::new(august, &logs(), &devices(), &Tariff::default());
        assert_eq!(split.shares.len(), 1);
        assert_eq!(split.shares[0].user_id, "alice");
        assert!(split.shares[0].is_estimated);
        assert_abs_diff_eq!(split.shares[0].share, 1.0);
        assert_eq!(split.skipped.len(), 1);
    }

    #[test]
    fn test_empty_month() {
        let split = BillSplit::new("2024-01".parse().unwrap(), &logs(), &devices(), &Tariff::default());
        assert!(split.shares.is_empty());
        assert_eq!(split.total.n_logs, 0);
    }
}
