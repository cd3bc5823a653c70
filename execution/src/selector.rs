//! Budget-constrained winner selection.
//!
//! Every strategy walks candidates in its own order and feeds them through the same
//! eligibility gate ([`Selector::try_take`]):
//!
//! - the number was not already chosen and its prefix has not produced a winner;
//! - the number belongs to a series and was not pre-screened;
//! - its aggregated quantity is positive and fits in the remaining capacity.
//!
//! Accepting a number reserves its aggregated quantity (the liability across every
//! seller that bought it). Selection stops when capacity runs out or every prefix
//! has a winner; returning fewer than 30 winners is normal.
//!
//! ## Seller ceilings
//!
//! Per-entry strategies also bound the entry's own quantity by a ceiling derived from
//! the seller's total purchased quantity: `floor(total * k / 180)`, with `k = 2`
//! (relaxed) or `k = 1` (strict).

use crate::budget::Budget;
use crate::sales::SalesTotals;
use lotto_types::{
    PurchaseRecord, SelectionStrategy, SellerId, TicketNumber, WinningEntry, PAYOUT_RATE,
    RESULT_LEN, SELLER_CEILING_RELAXED, SELLER_CEILING_STRICT,
};
use std::collections::BTreeSet;
use tracing::debug;

/// Winners chosen from real purchases, before filler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub strategy: SelectionStrategy,
    pub winners: Vec<WinningEntry>,
    /// Quantity units reserved by the winners.
    pub reserved: u64,
}

fn records_of(
    totals: &SalesTotals,
    seller: SellerId,
) -> impl Iterator<Item = &PurchaseRecord> {
    totals
        .records
        .iter()
        .filter(move |record| record.seller_id == seller)
}

/// Per-entry quantity ceiling for a seller.
pub fn seller_ceiling(seller_total: u64, multiplier: u64) -> u64 {
    seller_total.saturating_mul(multiplier) / PAYOUT_RATE
}

struct Selector<'a> {
    totals: &'a SalesTotals,
    prescreened: &'a BTreeSet<TicketNumber>,
    remaining: u64,
    chosen: BTreeSet<TicketNumber>,
    blocked_prefixes: BTreeSet<u8>,
    winners: Vec<WinningEntry>,
}

impl<'a> Selector<'a> {
    fn new(
        totals: &'a SalesTotals,
        prescreened: &'a BTreeSet<TicketNumber>,
        capacity: u64,
    ) -> Self {
        Self {
            totals,
            prescreened,
            remaining: capacity,
            chosen: BTreeSet::new(),
            blocked_prefixes: BTreeSet::new(),
            winners: Vec::new(),
        }
    }

    fn done(&self) -> bool {
        self.remaining == 0 || self.winners.len() >= RESULT_LEN
    }

    /// Aggregated quantity of `number` if it may be accepted now.
    fn eligible(&self, number: TicketNumber) -> Option<u64> {
        if self.chosen.contains(&number)
            || self.blocked_prefixes.contains(&number.prefix())
            || number.series().is_none()
            || self.prescreened.contains(&number)
        {
            return None;
        }
        let quantity = self.totals.quantity_of(&number);
        (quantity > 0 && quantity <= self.remaining).then_some(quantity)
    }

    fn try_take(&mut self, number: TicketNumber) -> bool {
        let Some(quantity) = self.eligible(number) else {
            return false;
        };
        self.remaining -= quantity;
        self.chosen.insert(number);
        self.blocked_prefixes.insert(number.prefix());
        self.winners.push(WinningEntry::purchased(number, quantity));
        debug!(%number, quantity, remaining = self.remaining, "winner accepted");
        true
    }

    /// Walk `records` entry by entry, bounding each entry by its seller's ceiling.
    fn take_entries<'r>(
        &mut self,
        records: impl IntoIterator<Item = &'r PurchaseRecord>,
        multiplier: u64,
    ) {
        for record in records {
            let ceiling = seller_ceiling(self.totals.seller_quantity(record.seller_id), multiplier);
            for entry in &record.number_entries {
                if self.done() {
                    return;
                }
                if entry.quantity > ceiling {
                    continue;
                }
                self.try_take(entry.number);
            }
        }
    }

    fn finish(self, strategy: SelectionStrategy) -> Selection {
        let reserved = self
            .winners
            .iter()
            .fold(0u64, |acc, entry| acc.saturating_add(entry.quantity));
        Selection {
            strategy,
            winners: self.winners,
            reserved,
        }
    }
}

/// Priority mode: priority sellers first (relaxed ceiling), then every other record in
/// stored order (strict ceiling).
pub fn select_priority(
    totals: &SalesTotals,
    budget: &Budget,
    prescreened: &BTreeSet<TicketNumber>,
    priority: &[SellerId],
) -> Selection {
    let mut selector = Selector::new(totals, prescreened, budget.capacity);
    for seller in priority {
        selector.take_entries(records_of(totals, *seller), SELLER_CEILING_RELAXED);
    }
    let priority_set: BTreeSet<SellerId> = priority.iter().copied().collect();
    selector.take_entries(
        totals
            .records
            .iter()
            .filter(|record| !priority_set.contains(&record.seller_id)),
        SELLER_CEILING_STRICT,
    );
    selector.finish(SelectionStrategy::Priority)
}

/// Run one of the rotation strategies.
pub fn select_with_strategy(
    totals: &SalesTotals,
    budget: &Budget,
    prescreened: &BTreeSet<TicketNumber>,
    strategy: SelectionStrategy,
) -> Selection {
    match strategy {
        SelectionStrategy::QuantityDescending => quantity_descending(totals, budget, prescreened),
        SelectionStrategy::HighestPurchaser => by_purchaser(totals, budget, prescreened, true),
        SelectionStrategy::LowestPurchaser => by_purchaser(totals, budget, prescreened, false),
        SelectionStrategy::LowestWinning => lowest_winning(totals, budget, prescreened),
        SelectionStrategy::Priority | SelectionStrategy::NoSales => Selection {
            strategy,
            winners: Vec::new(),
            reserved: 0,
        },
    }
}

fn quantity_descending(
    totals: &SalesTotals,
    budget: &Budget,
    prescreened: &BTreeSet<TicketNumber>,
) -> Selection {
    let mut candidates: Vec<(TicketNumber, u64)> =
        totals.quantities.iter().map(|(n, q)| (*n, *q)).collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut selector = Selector::new(totals, prescreened, budget.capacity);
    for (number, quantity) in candidates {
        if selector.done() {
            break;
        }
        let ceiling = totals.sellers_of(&number).fold(0u64, |acc, seller| {
            acc.saturating_add(seller_ceiling(
                totals.seller_quantity(seller),
                SELLER_CEILING_RELAXED,
            ))
        });
        if quantity > ceiling {
            continue;
        }
        selector.try_take(number);
    }
    selector.finish(SelectionStrategy::QuantityDescending)
}

fn by_purchaser(
    totals: &SalesTotals,
    budget: &Budget,
    prescreened: &BTreeSet<TicketNumber>,
    highest_first: bool,
) -> Selection {
    let mut sellers = totals.sellers_in_stored_order();
    sellers.sort_by(|a, b| {
        let (qa, qb) = (totals.seller_quantity(*a), totals.seller_quantity(*b));
        let by_volume = if highest_first { qb.cmp(&qa) } else { qa.cmp(&qb) };
        by_volume.then(a.cmp(b))
    });
    let (strategy, multiplier) = if highest_first {
        (SelectionStrategy::HighestPurchaser, SELLER_CEILING_RELAXED)
    } else {
        (SelectionStrategy::LowestPurchaser, SELLER_CEILING_STRICT)
    };

    let mut selector = Selector::new(totals, prescreened, budget.capacity);
    for seller in sellers {
        if selector.done() {
            break;
        }
        selector.take_entries(records_of(totals, seller), multiplier);
    }
    selector.finish(strategy)
}

fn lowest_winning(
    totals: &SalesTotals,
    budget: &Budget,
    prescreened: &BTreeSet<TicketNumber>,
) -> Selection {
    let mut candidates: Vec<(TicketNumber, u64)> =
        totals.quantities.iter().map(|(n, q)| (*n, *q)).collect();
    candidates.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

    let [min_target, max_target] = budget.lowest_winning_targets();
    let attempt = |target: u64| {
        let mut selector = Selector::new(totals, prescreened, target);
        for (number, _) in &candidates {
            if selector.done() {
                break;
            }
            selector.try_take(*number);
        }
        selector.finish(SelectionStrategy::LowestWinning)
    };

    let first = attempt(min_target);
    if first.reserved >= min_target {
        return first;
    }
    debug!(
        reserved = first.reserved,
        min_target, max_target, "lowest winning target missed, widening"
    );
    attempt(max_target)
}
