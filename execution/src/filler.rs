//! Completing a result to ten winners per series and ordering it for display.

use crate::sales::SalesTotals;
use lotto_types::{Series, TicketNumber, WinningEntry, ALLOW_REPEATS_THRESHOLD};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;
use thiserror::Error as ThisError;
use tracing::debug;

/// Random suffix attempts per prefix before the exhaustive scan.
pub const DEFAULT_RETRY_LIMIT: usize = 200;

#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum FillError {
    #[error("no acceptable filler suffix left for prefix {prefix}")]
    PrefixExhausted { prefix: u8 },
    #[error("winner {number} does not belong to any series")]
    OutsideSeries { number: TicketNumber },
}

struct FillContext<'a> {
    totals: &'a SalesTotals,
    prescreened: &'a BTreeSet<TicketNumber>,
    used: BTreeSet<TicketNumber>,
}

impl FillContext<'_> {
    fn acceptable(&self, candidate: TicketNumber, allow_repeats: bool) -> bool {
        if self.used.contains(&candidate) || self.prescreened.contains(&candidate) {
            return false;
        }
        allow_repeats || !self.totals.was_purchased(&candidate)
    }
}

/// Add a filler entry for every prefix of every series that has no winner yet.
///
/// Purchased numbers are never used as filler unless the series sold more than
/// [`ALLOW_REPEATS_THRESHOLD`] units; pre-screened numbers never are. The returned
/// entries are in no particular order.
pub fn fill_series<R: Rng>(
    winners: Vec<WinningEntry>,
    totals: &SalesTotals,
    prescreened: &BTreeSet<TicketNumber>,
    retry_limit: usize,
    rng: &mut R,
) -> Result<Vec<WinningEntry>, FillError> {
    if let Some(stray) = winners.iter().find(|entry| entry.series().is_none()) {
        return Err(FillError::OutsideSeries {
            number: stray.number,
        });
    }

    let mut ctx = FillContext {
        totals,
        prescreened,
        used: winners.iter().map(|entry| entry.number).collect(),
    };
    let covered: BTreeSet<u8> = winners.iter().map(|entry| entry.number.prefix()).collect();
    let mut result = winners;

    for series in Series::ALL {
        let allow_repeats = totals.series_volume(series) > ALLOW_REPEATS_THRESHOLD;
        let mut missing: Vec<u8> = series
            .prefixes()
            .filter(|prefix| !covered.contains(prefix))
            .collect();
        missing.shuffle(rng);

        for prefix in missing {
            let number = pick_suffix(&ctx, prefix, allow_repeats, retry_limit, rng)
                .ok_or(FillError::PrefixExhausted { prefix })?;
            debug!(%series, %number, allow_repeats, "filler chosen");
            ctx.used.insert(number);
            result.push(WinningEntry::filler(number));
        }
    }
    Ok(result)
}

fn pick_suffix<R: Rng>(
    ctx: &FillContext<'_>,
    prefix: u8,
    allow_repeats: bool,
    retry_limit: usize,
    rng: &mut R,
) -> Option<TicketNumber> {
    for _ in 0..retry_limit {
        let candidate = TicketNumber::from_parts(prefix, rng.gen_range(0..100))?;
        if ctx.acceptable(candidate, allow_repeats) {
            return Some(candidate);
        }
    }
    (0..100u8)
        .filter_map(|suffix| TicketNumber::from_parts(prefix, suffix))
        .find(|candidate| ctx.acceptable(*candidate, allow_repeats))
}

/// Interleave the series so no two consecutive entries share one.
///
/// Entries are sorted by number within their series and dealt round-robin starting
/// from a random series; a repair pass fixes any adjacency the deal leaves behind when
/// the series are unbalanced.
pub fn reorder<R: Rng>(entries: Vec<WinningEntry>, rng: &mut R) -> Vec<WinningEntry> {
    let mut buckets: [Vec<WinningEntry>; 3] = Default::default();
    let mut strays = Vec::new();
    for entry in entries {
        match entry.series() {
            Some(series) => buckets[series.index()].push(entry),
            None => strays.push(entry),
        }
    }
    for bucket in &mut buckets {
        bucket.sort_by_key(|entry| entry.number);
    }

    let start = rng.gen_range(0..buckets.len());
    let rounds = buckets.iter().map(Vec::len).max().unwrap_or(0);
    let mut ordered = Vec::with_capacity(buckets.iter().map(Vec::len).sum::<usize>() + strays.len());
    for round in 0..rounds {
        for offset in 0..buckets.len() {
            if let Some(entry) = buckets[(start + offset) % buckets.len()].get(round) {
                ordered.push(*entry);
            }
        }
    }
    ordered.extend(strays);
    repair_adjacency(&mut ordered);
    ordered
}

fn repair_adjacency(entries: &mut [WinningEntry]) {
    for i in 1..entries.len() {
        let previous = entries[i - 1].series();
        if entries[i].series() != previous {
            continue;
        }
        if let Some(offset) = entries[i + 1..]
            .iter()
            .position(|entry| entry.series() != previous)
        {
            entries.swap(i, i + 1 + offset);
        }
    }
}

/// True when no two consecutive entries share a series.
pub fn is_interleaved(entries: &[WinningEntry]) -> bool {
    entries
        .windows(2)
        .all(|pair| pair[0].series() != pair[1].series())
}
