//! Lotto draw settlement logic.
//!
//! This crate turns the tickets sold for one draw slot into the 30 winning numbers of
//! that draw: sales aggregation, the payout budget, winner selection, series filler,
//! ordering and validation. The server crate owns storage, locking and scheduling.
//!
//! ## Determinism requirements
//! - Do not read the wall clock inside settlement.
//! - Draw randomness only from the injected `rand::Rng`.
//! - Iterate ordered collections (`BTreeMap`/`BTreeSet`) wherever order reaches the output.
//!
//! The primary entrypoint is [`compute_draw`].
//!
//! ## Minimal pipeline (example)
//! ```rust,ignore
//! use lotto_execution::{compute_draw, DrawInput, DrawOptions, SalesAggregator};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut aggregator = SalesAggregator::new("02:00 PM".parse()?);
//! aggregator.ingest(&tickets);
//! let totals = aggregator.finish();
//! let draw = compute_draw(
//!     DrawInput { totals: &totals, win_percent: 50.0, priority: &[] },
//!     &DrawOptions::default(),
//!     &mut StdRng::seed_from_u64(7),
//! )?;
//! assert_eq!(draw.winning_numbers.len(), 30);
//! ```

pub mod budget;
pub mod draw;
pub mod filler;
pub mod priority;
pub mod sales;
pub mod selector;
pub mod validator;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use budget::Budget;
pub use draw::{
    compute_draw, random_result, DrawComputation, DrawError, DrawInput, DrawOptions,
    StrategyPolicy,
};
pub use filler::{fill_series, is_interleaved, reorder, FillError, DEFAULT_RETRY_LIMIT};
pub use priority::resolve_priority;
pub use sales::{
    decode_ticket, parse_number_entries, parse_points, parse_slot_times, BatchSummary,
    DecodeError, SalesAggregator, SalesTotals,
};
pub use selector::{seller_ceiling, select_priority, select_with_strategy, Selection};
pub use validator::{validate, ValidationError, Violation};
