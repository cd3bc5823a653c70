//! Payout pool arithmetic.

use crate::sales::SalesTotals;
use lotto_types::{
    TicketNumber, LOWEST_WINNING_MAX_PERCENT, LOWEST_WINNING_MIN_PERCENT, PAYOUT_RATE,
    PRESCREEN_PERCENT,
};
use std::collections::BTreeSet;

/// The payout pool of one draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    /// Points available for payouts.
    pub budget: u64,
    /// Quantity units the pool can fund.
    pub capacity: u64,
}

impl Budget {
    /// `budget = floor(total_points * win_percent / 100)`, `capacity = floor(budget / 180)`.
    ///
    /// Non-finite or negative inputs collapse to an empty pool.
    pub fn compute(total_points: f64, win_percent: f64) -> Self {
        let raw = total_points * win_percent / 100.0;
        let budget = if raw.is_finite() && raw > 0.0 {
            raw.floor() as u64
        } else {
            0
        };
        Self::from_points(budget)
    }

    pub fn from_points(budget: u64) -> Self {
        Self {
            budget,
            capacity: budget / PAYOUT_RATE,
        }
    }

    /// Largest liability a single number may carry before it is pre-screened out.
    pub fn prescreen_limit(&self) -> f64 {
        self.budget as f64 * PRESCREEN_PERCENT as f64 / 100.0
    }

    /// Whether a number with this aggregated quantity exceeds the pre-screen limit.
    pub fn exceeds_prescreen(&self, quantity: u64) -> bool {
        // quantity * rate > budget * 80 / 100, kept in integers
        (quantity as u128) * (PAYOUT_RATE as u128) * 100
            > (self.budget as u128) * (PRESCREEN_PERCENT as u128)
    }

    /// Numbers removed from consideration (for selection and filler) before selection starts.
    pub fn prescreen(&self, totals: &SalesTotals) -> BTreeSet<TicketNumber> {
        totals
            .quantities
            .iter()
            .filter(|(_, quantity)| self.exceeds_prescreen(**quantity))
            .map(|(number, _)| *number)
            .collect()
    }

    /// Capacity targeted by the lowest-winning strategy at `percent` of the budget.
    pub fn target_capacity(&self, percent: u64) -> u64 {
        let target = (self.budget as u128 * percent as u128 / 100) as u64 / PAYOUT_RATE;
        target.min(self.capacity)
    }

    pub fn lowest_winning_targets(&self) -> [u64; 2] {
        [
            self.target_capacity(LOWEST_WINNING_MIN_PERCENT),
            self.target_capacity(LOWEST_WINNING_MAX_PERCENT),
        ]
    }
}
