//! Structural checks run on every result before it is persisted.

use lotto_types::{Series, TicketNumber, WinningEntry, PAYOUT_RATE, RESULT_LEN, WINNERS_PER_SERIES};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error as ThisError;

/// One broken invariant of a draw result.
#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum Violation {
    #[error("expected 30 entries, found {found}")]
    WrongLength { found: usize },
    #[error("series {series} has {found} entries (expected 10)")]
    SeriesCount { series: Series, found: usize },
    #[error("series {series} is missing prefixes {missing:?}")]
    MissingPrefixes { series: Series, missing: Vec<u8> },
    #[error("prefix {prefix} appears {count} times")]
    RepeatedPrefix { prefix: u8, count: usize },
    #[error("number {number} is outside every series")]
    OutsideSeries { number: TicketNumber },
    #[error("number {number} appears more than once")]
    DuplicateNumber { number: TicketNumber },
    #[error("number {number} pays {payout} for quantity {quantity}")]
    PayoutMismatch {
        number: TicketNumber,
        quantity: u64,
        payout: u64,
    },
}

#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
#[error("result failed validation: {}", summarize(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check a complete result, reporting every violation rather than the first.
pub fn validate(entries: &[WinningEntry]) -> Result<(), ValidationError> {
    let mut violations = Vec::new();
    if entries.len() != RESULT_LEN {
        violations.push(Violation::WrongLength {
            found: entries.len(),
        });
    }

    let mut seen = BTreeSet::new();
    let mut prefix_counts: BTreeMap<u8, usize> = BTreeMap::new();
    let mut series_counts = [0usize; 3];
    for entry in entries {
        if !seen.insert(entry.number) {
            violations.push(Violation::DuplicateNumber {
                number: entry.number,
            });
        }
        if entry.payout != entry.quantity.saturating_mul(PAYOUT_RATE) {
            violations.push(Violation::PayoutMismatch {
                number: entry.number,
                quantity: entry.quantity,
                payout: entry.payout,
            });
        }
        match entry.series() {
            Some(series) => {
                series_counts[series.index()] += 1;
                *prefix_counts.entry(entry.number.prefix()).or_default() += 1;
            }
            None => violations.push(Violation::OutsideSeries {
                number: entry.number,
            }),
        }
    }

    for series in Series::ALL {
        let found = series_counts[series.index()];
        if found != WINNERS_PER_SERIES {
            violations.push(Violation::SeriesCount { series, found });
        }
        let missing: Vec<u8> = series
            .prefixes()
            .filter(|prefix| !prefix_counts.contains_key(prefix))
            .collect();
        if !missing.is_empty() {
            violations.push(Violation::MissingPrefixes { series, missing });
        }
    }
    for (prefix, count) in prefix_counts {
        if count > 1 {
            violations.push(Violation::RepeatedPrefix { prefix, count });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}
