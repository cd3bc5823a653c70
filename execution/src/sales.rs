//! Sales aggregation.
//!
//! Tickets reach the engine as [`StoredTicket`] rows whose number column carries
//! one of several historical encodings:
//!
//! - a JSON array: `[{"ticketNumber": "10-07", "quantity": 5}, ...]`
//! - comma-separated pairs: `"10-07:5, 30-12:2"`
//! - plain numbers: `"1007"` (quantity 0)
//!
//! [`decode_ticket`] turns a row into a [`PurchaseRecord`] or a [`DecodeError`];
//! [`SalesAggregator`] folds decoded records for one slot into [`SalesTotals`].

use lotto_types::{
    NumberEntry, NumberParseError, PurchaseRecord, SellerId, Series, SlotLabel, SlotParseError,
    StoredTicket, TicketNumber,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error as ThisError;
use tracing::warn;

#[derive(Debug, Clone, ThisError, PartialEq)]
pub enum DecodeError {
    #[error("ticket numbers: {0}")]
    Numbers(#[from] NumberParseError),
    #[error("draw times: {0}")]
    Slots(#[from] SlotParseError),
    #[error("total points {raw:?} is not a non-negative decimal")]
    Points { raw: String },
}

#[derive(Deserialize)]
struct JsonEntry {
    #[serde(rename = "ticketNumber")]
    ticket_number: Option<Value>,
    quantity: Option<Value>,
}

/// Parse every stored encoding of a ticket's numbers, preserving entry order.
pub fn parse_number_entries(raw: &str) -> Result<Vec<NumberEntry>, NumberParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        return parse_json_entries(trimmed);
    }

    let mut entries = Vec::new();
    for part in trimmed.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (number, quantity) = match part.split_once(':') {
            Some((number, quantity)) => (number.trim(), quantity.trim()),
            None => (part, ""),
        };
        entries.push(NumberEntry::new(number.parse()?, parse_quantity_text(quantity)?));
    }
    Ok(entries)
}

fn parse_json_entries(raw: &str) -> Result<Vec<NumberEntry>, NumberParseError> {
    let items: Vec<JsonEntry> =
        serde_json::from_str(raw).map_err(|err| NumberParseError::Malformed {
            reason: err.to_string(),
        })?;
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let number = match item.ticket_number {
                Some(Value::String(text)) => text.parse::<TicketNumber>()?,
                Some(Value::Number(value)) => value.to_string().parse::<TicketNumber>()?,
                _ => {
                    return Err(NumberParseError::Malformed {
                        reason: format!("entry {idx} has no ticketNumber"),
                    })
                }
            };
            let quantity = match item.quantity {
                None | Some(Value::Null) => 0,
                Some(Value::Number(value)) => {
                    value.as_u64().ok_or_else(|| NumberParseError::InvalidQuantity {
                        raw: value.to_string(),
                    })?
                }
                Some(Value::String(text)) => parse_quantity_text(&text)?,
                Some(other) => {
                    return Err(NumberParseError::InvalidQuantity {
                        raw: other.to_string(),
                    })
                }
            };
            Ok(NumberEntry::new(number, quantity))
        })
        .collect()
}

fn parse_quantity_text(raw: &str) -> Result<u64, NumberParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse::<u64>()
        .map_err(|_| NumberParseError::InvalidQuantity {
            raw: raw.to_string(),
        })
}

/// Parse the draw times a ticket was printed for: a JSON array of labels or a single label.
///
/// Unparseable labels inside an array are logged and dropped, so one bad label does not
/// hide the ticket from the slots it names correctly. The array fails only when it has
/// labels and none of them parse.
pub fn parse_slot_times(raw: &str) -> Result<BTreeSet<SlotLabel>, SlotParseError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        let labels: Vec<String> =
            serde_json::from_str(trimmed).map_err(|_| SlotParseError::Malformed {
                raw: raw.to_string(),
            })?;
        let mut slots = BTreeSet::new();
        let mut first_error = None;
        for label in &labels {
            match label.parse::<SlotLabel>() {
                Ok(slot) => {
                    slots.insert(slot);
                }
                Err(err) => {
                    warn!(label = %label, %err, "ignoring unparseable draw time");
                    first_error.get_or_insert(err);
                }
            }
        }
        return match first_error {
            Some(err) if slots.is_empty() => Err(err),
            _ => Ok(slots),
        };
    }
    let slot: SlotLabel = trimmed.parse()?;
    Ok(BTreeSet::from([slot]))
}

/// Parse a stored decimal points column. An empty column counts as zero.
pub fn parse_points(raw: &str) -> Result<f64, DecodeError> {
    let trimmed = raw.trim().trim_matches('"');
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    match trimmed.parse::<f64>() {
        Ok(points) if points.is_finite() && points >= 0.0 => Ok(points),
        _ => Err(DecodeError::Points {
            raw: raw.to_string(),
        }),
    }
}

/// Decode a stored ticket row.
pub fn decode_ticket(ticket: &StoredTicket) -> Result<PurchaseRecord, DecodeError> {
    Ok(PurchaseRecord {
        id: ticket.id,
        seller_id: ticket.seller_id,
        slot_times: parse_slot_times(&ticket.draw_times)?,
        number_entries: parse_number_entries(&ticket.ticket_numbers)?,
        total_points: parse_points(&ticket.total_points)?,
    })
}

/// Aggregated sales for one draw.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SalesTotals {
    /// Aggregated quantity per purchased number.
    pub quantities: BTreeMap<TicketNumber, u64>,
    /// Every number that appeared on a matching ticket, including zero-quantity entries.
    pub purchased: BTreeSet<TicketNumber>,
    pub number_to_sellers: BTreeMap<TicketNumber, BTreeSet<SellerId>>,
    /// Total quantity per seller across the matching tickets.
    pub seller_quantities: BTreeMap<SellerId, u64>,
    /// Matching records in stored order.
    pub records: Vec<PurchaseRecord>,
    pub total_points: f64,
    /// Rows skipped because a column could not be decoded.
    pub skipped_records: usize,
}

impl SalesTotals {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn quantity_of(&self, number: &TicketNumber) -> u64 {
        self.quantities.get(number).copied().unwrap_or(0)
    }

    pub fn was_purchased(&self, number: &TicketNumber) -> bool {
        self.purchased.contains(number)
    }

    pub fn seller_quantity(&self, seller: SellerId) -> u64 {
        self.seller_quantities.get(&seller).copied().unwrap_or(0)
    }

    pub fn sellers_of(&self, number: &TicketNumber) -> impl Iterator<Item = SellerId> + '_ {
        self.number_to_sellers
            .get(number)
            .into_iter()
            .flat_map(|sellers| sellers.iter().copied())
    }

    /// Units purchased across every number of a series.
    pub fn series_volume(&self, series: Series) -> u64 {
        self.quantities
            .iter()
            .filter(|(number, _)| number.series() == Some(series))
            .fold(0u64, |acc, (_, qty)| acc.saturating_add(*qty))
    }

    /// Sellers in order of their first matching record.
    pub fn sellers_in_stored_order(&self) -> Vec<SellerId> {
        let mut seen = BTreeSet::new();
        self.records
            .iter()
            .filter(|record| seen.insert(record.seller_id))
            .map(|record| record.seller_id)
            .collect()
    }
}

/// Outcome of ingesting one batch of stored rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub scanned: usize,
    pub matched: usize,
    pub skipped: usize,
}

/// Folds purchase records for a single slot into [`SalesTotals`].
#[derive(Clone, Debug)]
pub struct SalesAggregator {
    slot: SlotLabel,
    totals: SalesTotals,
}

impl SalesAggregator {
    pub fn new(slot: SlotLabel) -> Self {
        Self {
            slot,
            totals: SalesTotals::default(),
        }
    }

    pub fn slot(&self) -> SlotLabel {
        self.slot
    }

    /// Decode and fold a batch of stored rows. Rows that fail to decode are logged and counted.
    pub fn ingest(&mut self, tickets: &[StoredTicket]) -> BatchSummary {
        let mut summary = BatchSummary {
            scanned: tickets.len(),
            ..BatchSummary::default()
        };
        for ticket in tickets {
            match decode_ticket(ticket) {
                Ok(record) => {
                    if self.ingest_record(record) {
                        summary.matched += 1;
                    }
                }
                Err(err) => {
                    warn!(
                        ticket_id = ticket.id,
                        seller_id = ticket.seller_id,
                        %err,
                        "skipping ticket with undecodable columns"
                    );
                    self.totals.skipped_records += 1;
                    summary.skipped += 1;
                }
            }
        }
        summary
    }

    /// Fold one decoded record. Returns `false` when the record is for another slot.
    pub fn ingest_record(&mut self, record: PurchaseRecord) -> bool {
        if !record.covers(&self.slot) {
            return false;
        }
        let totals = &mut self.totals;
        for entry in &record.number_entries {
            let quantity = totals.quantities.entry(entry.number).or_insert(0);
            *quantity = quantity.saturating_add(entry.quantity);
            totals.purchased.insert(entry.number);
            totals
                .number_to_sellers
                .entry(entry.number)
                .or_default()
                .insert(record.seller_id);
        }
        let seller_total = totals.seller_quantities.entry(record.seller_id).or_insert(0);
        *seller_total = seller_total.saturating_add(record.total_quantity());
        totals.total_points += record.total_points;
        totals.records.push(record);
        true
    }

    pub fn finish(self) -> SalesTotals {
        self.totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{number, slot, stored_ticket};

    #[test]
    fn parses_json_array_encoding() {
        let raw = r#"[{"ticketNumber":"10-07","quantity":5},{"ticketNumber":3012,"quantity":"2"},{"ticketNumber":"5099"}]"#;
        let entries = parse_number_entries(raw).expect("json entries");
        assert_eq!(
            entries,
            vec![
                NumberEntry::new(number("1007"), 5),
                NumberEntry::new(number("3012"), 2),
                NumberEntry::new(number("5099"), 0),
            ]
        );
    }

    #[test]
    fn parses_pair_and_plain_encodings() {
        let entries = parse_number_entries("10-07:5, 30-12:2,,5099").expect("pairs");
        assert_eq!(
            entries,
            vec![
                NumberEntry::new(number("1007"), 5),
                NumberEntry::new(number("3012"), 2),
                NumberEntry::new(number("5099"), 0),
            ]
        );
        assert_eq!(
            parse_number_entries("1234").expect("plain"),
            vec![NumberEntry::new(number("1234"), 0)]
        );
        assert!(parse_number_entries("   ").expect("empty").is_empty());
    }

    #[test]
    fn reports_malformed_encodings() {
        assert!(matches!(
            parse_number_entries(r#"[{"quantity":1}]"#),
            Err(NumberParseError::Malformed { .. })
        ));
        assert!(matches!(
            parse_number_entries("[not json]"),
            Err(NumberParseError::Malformed { .. })
        ));
        assert!(matches!(
            parse_number_entries("1007:-2"),
            Err(NumberParseError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            parse_number_entries(r#"[{"ticketNumber":"1007","quantity":1.5}]"#),
            Err(NumberParseError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            parse_number_entries("10x7:1"),
            Err(NumberParseError::InvalidCharacter { .. })
        ));
    }

    #[test]
    fn parses_slot_lists() {
        let slots = parse_slot_times(r#"["2:00 PM","02:15 PM"]"#).expect("slots");
        assert!(slots.contains(&slot("02:00 PM")));
        assert!(slots.contains(&slot("02:15 PM")));
        assert_eq!(parse_slot_times("2PM").expect("single").len(), 1);
        assert!(parse_slot_times("[oops").is_err());
        assert!(parse_slot_times(r#"["08:45 AM","25:00"]"#).is_err());
        assert!(parse_slot_times("[]").expect("empty").is_empty());
    }

    #[test]
    fn one_bad_draw_time_keeps_the_valid_ones() {
        let slots = parse_slot_times(r#"["02:00 PM","08:45 AM"]"#).expect("slots");
        assert_eq!(slots, BTreeSet::from([slot("02:00 PM")]));

        let mut aggregator = SalesAggregator::new(slot("02:00 PM"));
        let summary = aggregator.ingest(&[stored_ticket(
            1,
            7,
            r#"["02:00 PM","08:45 AM"]"#,
            "1007:5",
            "100",
        )]);
        assert_eq!(
            summary,
            BatchSummary {
                scanned: 1,
                matched: 1,
                skipped: 0
            }
        );
        let totals = aggregator.finish();
        assert_eq!(totals.quantity_of(&number("1007")), 5);
        assert_eq!(totals.total_points, 100.0);
        assert_eq!(totals.skipped_records, 0);
    }

    #[test]
    fn parses_points() {
        assert_eq!(parse_points("12.50").expect("decimal"), 12.5);
        assert_eq!(parse_points("").expect("empty"), 0.0);
        assert!(parse_points("-1").is_err());
        assert!(parse_points("abc").is_err());
    }

    #[test]
    fn aggregates_only_the_requested_slot() {
        let mut aggregator = SalesAggregator::new(slot("02:00 PM"));
        let batch = vec![
            stored_ticket(1, 7, r#"["2:00 PM"]"#, "10-07:5,3012:1", "100"),
            stored_ticket(2, 8, r#"["02:00 PM","2:15 PM"]"#, r#"[{"ticketNumber":"1007","quantity":3}]"#, "60.5"),
            stored_ticket(3, 9, r#"["2:15 PM"]"#, "5001:9", "90"),
            stored_ticket(4, 9, r#"["2:00 PM"]"#, "10?7:1", "10"),
        ];
        let summary = aggregator.ingest(&batch);
        assert_eq!(
            summary,
            BatchSummary {
                scanned: 4,
                matched: 2,
                skipped: 1
            }
        );

        let totals = aggregator.finish();
        assert_eq!(totals.quantity_of(&number("1007")), 8);
        assert_eq!(totals.quantity_of(&number("3012")), 1);
        assert!(!totals.was_purchased(&number("5001")));
        assert_eq!(totals.total_points, 160.5);
        assert_eq!(totals.skipped_records, 1);
        assert_eq!(totals.seller_quantity(7), 6);
        assert_eq!(totals.seller_quantity(8), 3);
        assert_eq!(totals.sellers_of(&number("1007")).collect::<Vec<_>>(), vec![7, 8]);
        assert_eq!(totals.series_volume(Series::Ten), 8);
        assert_eq!(totals.sellers_in_stored_order(), vec![7, 8]);
    }
}
