use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::number::TicketNumber;
use crate::slot::SlotLabel;

/// Identifier of the seller (shop login) that printed a ticket.
pub type SellerId = u64;

/// One purchased number on a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberEntry {
    pub number: TicketNumber,
    pub quantity: u64,
}

impl NumberEntry {
    pub fn new(number: TicketNumber, quantity: u64) -> Self {
        Self { number, quantity }
    }
}

/// A ticket row exactly as the ticketing subsystem stores it.
///
/// The text columns carry whatever historical encoding the ticket was printed with;
/// decoding happens during sales aggregation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredTicket {
    pub id: u64,
    pub seller_id: SellerId,
    pub draw_times: String,
    pub ticket_numbers: String,
    pub total_points: String,
    pub total_quantity: u64,
    pub created_at: DateTime<Utc>,
}

/// A decoded, immutable ticket purchase.
#[derive(Clone, Debug, PartialEq)]
pub struct PurchaseRecord {
    pub id: u64,
    pub seller_id: SellerId,
    pub slot_times: BTreeSet<SlotLabel>,
    pub number_entries: Vec<NumberEntry>,
    pub total_points: f64,
}

impl PurchaseRecord {
    pub fn covers(&self, slot: &SlotLabel) -> bool {
        self.slot_times.contains(slot)
    }

    /// Total quantity across every entry of the ticket.
    pub fn total_quantity(&self) -> u64 {
        self.number_entries
            .iter()
            .fold(0u64, |acc, entry| acc.saturating_add(entry.quantity))
    }
}
