use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

use crate::constants::PAYOUT_RATE;
use crate::number::{Series, TicketNumber};
use crate::slot::SlotLabel;

pub const DRAW_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum DateParseError {
    #[error("draw date is empty")]
    Empty,
    #[error("draw date {raw:?} is not formatted as YYYY-MM-DD")]
    Malformed { raw: String },
}

/// Parse a `YYYY-MM-DD` draw date.
pub fn parse_draw_date(raw: &str) -> Result<NaiveDate, DateParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DateParseError::Empty);
    }
    NaiveDate::parse_from_str(trimmed, DRAW_DATE_FORMAT).map_err(|_| DateParseError::Malformed {
        raw: raw.to_string(),
    })
}

/// Identifies one draw: a business date and a slot on that date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawKey {
    pub draw_date: NaiveDate,
    pub draw_slot: SlotLabel,
}

impl DrawKey {
    pub fn new(draw_date: NaiveDate, draw_slot: SlotLabel) -> Self {
        Self {
            draw_date,
            draw_slot,
        }
    }

    /// Stable 64-bit mix of the key, used to derive per-draw RNG seeds.
    pub fn seed_material(&self) -> u64 {
        let days = self.draw_date.num_days_from_ce() as u64;
        let slot = self.draw_slot.hour() as u64 * 60 + self.draw_slot.minute() as u64;
        days.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ slot.wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
    }
}

impl fmt::Display for DrawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            self.draw_date.format(DRAW_DATE_FORMAT),
            self.draw_slot
        )
    }
}

/// One of the 30 numbers of a draw result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningEntry {
    pub number: TicketNumber,
    pub quantity: u64,
    pub payout: u64,
}

impl WinningEntry {
    /// A purchased number paying out its full quantity.
    pub fn purchased(number: TicketNumber, quantity: u64) -> Self {
        Self {
            number,
            quantity,
            payout: quantity.saturating_mul(PAYOUT_RATE),
        }
    }

    /// A number that completes the result without backing by any purchase.
    pub fn filler(number: TicketNumber) -> Self {
        Self::purchased(number, 0)
    }

    pub fn is_filler(&self) -> bool {
        self.quantity == 0
    }

    pub fn series(&self) -> Option<Series> {
        self.number.series()
    }
}

/// How the purchased winners of a draw were chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Aggregated numbers by descending quantity.
    QuantityDescending,
    /// Sellers by descending purchase volume, entry by entry.
    HighestPurchaser,
    /// Sellers by ascending purchase volume, entry by entry.
    LowestPurchaser,
    /// Lowest-quantity numbers up to 30-40% of the pool.
    LowestWinning,
    /// Priority sellers first, everyone else afterwards.
    Priority,
    /// No tickets were sold for the slot.
    NoSales,
}

impl SelectionStrategy {
    /// Strategies eligible when no seller has priority.
    pub const ROTATION: [SelectionStrategy; 4] = [
        SelectionStrategy::QuantityDescending,
        SelectionStrategy::HighestPurchaser,
        SelectionStrategy::LowestPurchaser,
        SelectionStrategy::LowestWinning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::QuantityDescending => "quantity_descending",
            SelectionStrategy::HighestPurchaser => "highest_purchaser",
            SelectionStrategy::LowestPurchaser => "lowest_purchaser",
            SelectionStrategy::LowestWinning => "lowest_winning",
            SelectionStrategy::Priority => "priority",
            SelectionStrategy::NoSales => "no_sales",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "quantity_descending" => Ok(SelectionStrategy::QuantityDescending),
            "highest_purchaser" => Ok(SelectionStrategy::HighestPurchaser),
            "lowest_purchaser" => Ok(SelectionStrategy::LowestPurchaser),
            "lowest_winning" => Ok(SelectionStrategy::LowestWinning),
            "priority" => Ok(SelectionStrategy::Priority),
            "no_sales" => Ok(SelectionStrategy::NoSales),
            other => Err(format!("unknown selection strategy: {other}")),
        }
    }
}

/// The persisted, immutable outcome of one draw.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawResult {
    pub draw_date: NaiveDate,
    pub draw_slot: SlotLabel,
    pub winning_numbers: Vec<WinningEntry>,
    pub total_points: f64,
    pub strategy: SelectionStrategy,
    pub created_at: DateTime<Utc>,
}

impl DrawResult {
    pub fn key(&self) -> DrawKey {
        DrawKey::new(self.draw_date, self.draw_slot)
    }

    /// Sum of payouts owed to purchased winners.
    pub fn total_payout(&self) -> u64 {
        self.winning_numbers
            .iter()
            .fold(0u64, |acc, entry| acc.saturating_add(entry.payout))
    }

    /// Exact-match lookup used by claim verification.
    pub fn entry_for(&self, number: &TicketNumber) -> Option<&WinningEntry> {
        self.winning_numbers.iter().find(|entry| &entry.number == number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dates() {
        let date = parse_draw_date(" 2025-01-10 ").expect("date");
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 1, 10).expect("ymd"));
        assert_eq!(parse_draw_date(""), Err(DateParseError::Empty));
        assert!(matches!(
            parse_draw_date("10/01/2025"),
            Err(DateParseError::Malformed { .. })
        ));
    }

    #[test]
    fn key_display_and_seed() {
        let slot: SlotLabel = "2:00 PM".parse().expect("slot");
        let date = parse_draw_date("2025-01-10").expect("date");
        let key = DrawKey::new(date, slot);
        assert_eq!(key.to_string(), "2025-01-10@02:00 PM");

        let later: SlotLabel = "2:15 PM".parse().expect("slot");
        assert_ne!(key.seed_material(), DrawKey::new(date, later).seed_material());
    }

    #[test]
    fn entry_payout_follows_rate() {
        let number: TicketNumber = "3012".parse().expect("number");
        let entry = WinningEntry::purchased(number, 3);
        assert_eq!(entry.payout, 3 * PAYOUT_RATE);
        assert!(!entry.is_filler());
        assert!(WinningEntry::filler(number).is_filler());
    }

    #[test]
    fn result_round_trips_through_json() {
        let number: TicketNumber = "5099".parse().expect("number");
        let result = DrawResult {
            draw_date: parse_draw_date("2025-01-10").expect("date"),
            draw_slot: "09:00 AM".parse().expect("slot"),
            winning_numbers: vec![WinningEntry::purchased(number, 2)],
            total_points: 1000.0,
            strategy: SelectionStrategy::Priority,
            created_at: DateTime::<Utc>::from_timestamp(1_736_500_000, 0).expect("ts"),
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["drawSlot"], "09:00 AM");
        assert_eq!(json["drawDate"], "2025-01-10");
        assert_eq!(json["winningNumbers"][0]["number"], "5099");
        assert_eq!(json["strategy"], "priority");
        let back: DrawResult = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, result);
        assert_eq!(back.entry_for(&number).map(|e| e.payout), Some(360));
    }
}
