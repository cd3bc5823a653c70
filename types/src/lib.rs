//! Common types for the lotto draw settlement engine.
//!
//! Everything here is plain data: ticket numbers and their series, draw slots,
//! purchase records, and the persisted [`DrawResult`]. No I/O happens in this crate.

pub mod constants;
pub mod draw;
pub mod number;
pub mod slot;
pub mod ticket;

pub use constants::*;
pub use draw::{
    parse_draw_date, DateParseError, DrawKey, DrawResult, SelectionStrategy, WinningEntry,
    DRAW_DATE_FORMAT,
};
pub use number::{NumberParseError, Series, TicketNumber};
pub use slot::{SlotParseError, SlotLabel};
pub use ticket::{NumberEntry, PurchaseRecord, SellerId, StoredTicket};
