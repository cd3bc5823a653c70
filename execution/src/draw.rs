//! The settlement pipeline for a single draw.
//!
//! [`compute_draw`] is pure: it takes aggregated sales, the configured win percentage,
//! the resolved priority sellers and an RNG, and returns the ordered, validated winning
//! entries. Persistence, locking and timeouts belong to the caller.
//!
//! ## Stages
//! 1. Budget and pre-screen from the sales totals.
//! 2. Winner selection: priority mode when priority sellers exist, otherwise the
//!    strategy picked by the [`StrategyPolicy`].
//! 3. Filler for every prefix without a winner.
//! 4. Interleaving and validation.
//!
//! A slot without any sales skips straight to filler and is tagged
//! [`SelectionStrategy::NoSales`].

use crate::budget::Budget;
use crate::filler::{fill_series, reorder, FillError, DEFAULT_RETRY_LIMIT};
use crate::sales::SalesTotals;
use crate::selector::{select_priority, select_with_strategy, Selection};
use crate::validator::{validate, ValidationError};
use lotto_types::{SelectionStrategy, SellerId, WinningEntry};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;
use tracing::{debug, info};

#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum DrawError {
    #[error(transparent)]
    Fill(#[from] FillError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// How the strategy is chosen when no seller has priority.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StrategyPolicy {
    /// Uniform draw over [`SelectionStrategy::ROTATION`].
    #[default]
    Uniform,
    Fixed(SelectionStrategy),
}

impl StrategyPolicy {
    pub fn choose<R: Rng>(&self, rng: &mut R) -> SelectionStrategy {
        match self {
            StrategyPolicy::Uniform => SelectionStrategy::ROTATION
                .choose(rng)
                .copied()
                .unwrap_or(SelectionStrategy::QuantityDescending),
            StrategyPolicy::Fixed(strategy) => *strategy,
        }
    }
}

impl fmt::Display for StrategyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyPolicy::Uniform => f.write_str("uniform"),
            StrategyPolicy::Fixed(strategy) => write!(f, "{strategy}"),
        }
    }
}

impl FromStr for StrategyPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let strategy = match raw.trim() {
            "uniform" | "random" => return Ok(StrategyPolicy::Uniform),
            other => other.parse::<SelectionStrategy>()?,
        };
        if SelectionStrategy::ROTATION.contains(&strategy) {
            Ok(StrategyPolicy::Fixed(strategy))
        } else {
            Err(format!("{strategy} cannot be used as a fixed strategy"))
        }
    }
}

impl TryFrom<String> for StrategyPolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StrategyPolicy> for String {
    fn from(policy: StrategyPolicy) -> Self {
        policy.to_string()
    }
}

/// Tunables of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawOptions {
    pub policy: StrategyPolicy,
    /// Random filler attempts per prefix before the exhaustive scan.
    pub filler_retry_limit: usize,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            policy: StrategyPolicy::Uniform,
            filler_retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }
}

/// Everything the pipeline reads for one draw.
#[derive(Clone, Copy, Debug)]
pub struct DrawInput<'a> {
    pub totals: &'a SalesTotals,
    /// Most recently configured win percentage (0-100).
    pub win_percent: f64,
    /// Resolved priority sellers, in service order.
    pub priority: &'a [SellerId],
}

/// A computed, validated, not yet persisted result.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawComputation {
    pub winning_numbers: Vec<WinningEntry>,
    pub strategy: SelectionStrategy,
    pub total_points: f64,
    pub budget: Budget,
    pub prescreened: usize,
}

impl DrawComputation {
    /// Sum of payouts owed to purchased winners.
    pub fn total_payout(&self) -> u64 {
        self.winning_numbers
            .iter()
            .fold(0u64, |acc, entry| acc.saturating_add(entry.payout))
    }
}

/// Run the full pipeline.
pub fn compute_draw<R: Rng>(
    input: DrawInput<'_>,
    options: &DrawOptions,
    rng: &mut R,
) -> Result<DrawComputation, DrawError> {
    let totals = input.totals;
    if totals.is_empty() {
        info!(
            skipped = totals.skipped_records,
            "no sales for draw, generating random result"
        );
        let winning_numbers = random_result(options.filler_retry_limit, rng)?;
        return Ok(DrawComputation {
            winning_numbers,
            strategy: SelectionStrategy::NoSales,
            total_points: 0.0,
            budget: Budget::from_points(0),
            prescreened: 0,
        });
    }

    let budget = Budget::compute(totals.total_points, input.win_percent);
    let prescreened = budget.prescreen(totals);
    debug!(
        budget = budget.budget,
        capacity = budget.capacity,
        prescreened = prescreened.len(),
        "budget computed"
    );

    let selection: Selection = if input.priority.is_empty() {
        let strategy = options.policy.choose(rng);
        select_with_strategy(totals, &budget, &prescreened, strategy)
    } else {
        select_priority(totals, &budget, &prescreened, input.priority)
    };
    info!(
        strategy = %selection.strategy,
        winners = selection.winners.len(),
        reserved = selection.reserved,
        capacity = budget.capacity,
        "winners selected"
    );

    let filled = fill_series(
        selection.winners,
        totals,
        &prescreened,
        options.filler_retry_limit,
        rng,
    )?;
    let winning_numbers = reorder(filled, rng);
    validate(&winning_numbers)?;

    Ok(DrawComputation {
        winning_numbers,
        strategy: selection.strategy,
        total_points: totals.total_points,
        budget,
        prescreened: prescreened.len(),
    })
}

/// A valid result made entirely of filler, for slots without sales.
pub fn random_result<R: Rng>(
    retry_limit: usize,
    rng: &mut R,
) -> Result<Vec<WinningEntry>, DrawError> {
    let filled = fill_series(
        Vec::new(),
        &SalesTotals::default(),
        &BTreeSet::new(),
        retry_limit,
        rng,
    )?;
    let ordered = reorder(filled, rng);
    validate(&ordered)?;
    Ok(ordered)
}
