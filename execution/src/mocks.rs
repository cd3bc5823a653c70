//! Builders for tickets, records and sales totals used in tests.

use crate::sales::{SalesAggregator, SalesTotals};
use lotto_types::{
    NumberEntry, PurchaseRecord, SellerId, SlotLabel, StoredTicket, TicketNumber,
};
use std::collections::BTreeSet;

/// Slot every mock record is printed for.
pub const MOCK_SLOT: &str = "02:00 PM";

/// Parses a ticket number literal.
pub fn number(raw: &str) -> TicketNumber {
    raw.parse().expect("valid ticket number")
}

/// Parses a slot label literal.
pub fn slot(raw: &str) -> SlotLabel {
    raw.parse().expect("valid slot label")
}

/// Creates a stored ticket row with raw text columns.
pub fn stored_ticket(
    id: u64,
    seller_id: SellerId,
    draw_times: &str,
    ticket_numbers: &str,
    total_points: &str,
) -> StoredTicket {
    StoredTicket {
        id,
        seller_id,
        draw_times: draw_times.to_string(),
        ticket_numbers: ticket_numbers.to_string(),
        total_points: total_points.to_string(),
        total_quantity: 0,
        created_at: Default::default(),
    }
}

/// Creates a decoded record for [`MOCK_SLOT`].
pub fn record(id: u64, seller_id: SellerId, entries: &[(&str, u64)], total_points: f64) -> PurchaseRecord {
    PurchaseRecord {
        id,
        seller_id,
        slot_times: BTreeSet::from([slot(MOCK_SLOT)]),
        number_entries: entries
            .iter()
            .map(|(raw, quantity)| NumberEntry::new(number(raw), *quantity))
            .collect(),
        total_points,
    }
}

/// Aggregates one single-entry record per `(record id, seller, number, quantity)` row.
///
/// Records carry no points; tests set `total_points` on the result when the budget matters.
pub fn totals_from(rows: &[(u64, SellerId, &str, u64)]) -> SalesTotals {
    let mut aggregator = SalesAggregator::new(slot(MOCK_SLOT));
    for (id, seller, raw, quantity) in rows {
        aggregator.ingest_record(record(*id, *seller, &[(*raw, *quantity)], 0.0));
    }
    aggregator.finish()
}
