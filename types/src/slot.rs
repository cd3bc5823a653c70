//! Draw slot labels.
//!
//! A business day has one draw every 15 minutes from 09:00 AM to 11:45 PM local
//! time. Slots are stored by the ticketing side as free-form text ("2:00 PM",
//! "02:00 PM", "2PM", "02.00pm"); every encoding normalizes to the same
//! [`SlotLabel`], rendered as `HH:MM AM/PM`.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

use crate::constants::{FIRST_DRAW_HOUR, LAST_DRAW_HOUR, SLOT_MINUTES};

#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum SlotParseError {
    #[error("draw time is empty")]
    Empty,
    #[error("draw time {raw:?} is not a recognizable time")]
    Malformed { raw: String },
    #[error("{label} is not a draw slot (draws run every 15 minutes, 09:00 AM to 11:45 PM)")]
    NotADrawSlot { label: String },
}

/// A normalized draw slot, e.g. `02:00 PM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotLabel {
    minutes: u16,
}

impl SlotLabel {
    /// The slot starting exactly at `time` (seconds are ignored).
    pub fn from_time(time: NaiveTime) -> Option<Self> {
        Self::from_hm(time.hour(), time.minute())
    }

    fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if !(FIRST_DRAW_HOUR..=LAST_DRAW_HOUR).contains(&hour) || minute % SLOT_MINUTES != 0 || minute >= 60 {
            return None;
        }
        Some(Self {
            minutes: (hour * 60 + minute) as u16,
        })
    }

    pub fn hour(&self) -> u32 {
        self.minutes as u32 / 60
    }

    pub fn minute(&self) -> u32 {
        self.minutes as u32 % 60
    }

    pub fn to_time(&self) -> NaiveTime {
        // Hour and minute are validated on construction.
        NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or(NaiveTime::MIN)
    }

    /// Every slot of the business day in chronological order.
    pub fn all() -> impl Iterator<Item = SlotLabel> {
        (FIRST_DRAW_HOUR..=LAST_DRAW_HOUR).flat_map(|hour| {
            (0..60)
                .step_by(SLOT_MINUTES as usize)
                .filter_map(move |minute| SlotLabel::from_hm(hour, minute))
        })
    }

    /// The first slot strictly after `time`, or `None` once the day's last slot has passed.
    pub fn next_after(time: NaiveTime) -> Option<SlotLabel> {
        Self::all().find(|slot| slot.to_time() > time)
    }
}

impl FromStr for SlotLabel {
    type Err = SlotParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let clean: String = raw
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_ascii_uppercase();
        if clean.is_empty() {
            return Err(SlotParseError::Empty);
        }
        let malformed = || SlotParseError::Malformed {
            raw: raw.to_string(),
        };
        if !clean.is_ascii() {
            return Err(malformed());
        }

        let (clock, meridiem) = if let Some(rest) = clean.strip_suffix("AM") {
            (rest.trim(), Some(false))
        } else if let Some(rest) = clean.strip_suffix("PM") {
            (rest.trim(), Some(true))
        } else {
            (clean.as_str(), None)
        };

        let (hour_text, minute_text) = match clock.find([':', '.']) {
            Some(idx) => (&clock[..idx], &clock[idx + 1..]),
            None if clock.len() > 2 => clock.split_at(clock.len() - 2),
            None => (clock, ""),
        };
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if hour_text.is_empty()
            || hour_text.len() > 2
            || minute_text.len() > 2
            || !all_digits(hour_text)
            || !all_digits(minute_text)
        {
            return Err(malformed());
        }
        let hour: u32 = hour_text.parse().map_err(|_| malformed())?;
        let minute: u32 = if minute_text.is_empty() {
            0
        } else {
            minute_text.parse().map_err(|_| malformed())?
        };
        if minute >= 60 {
            return Err(malformed());
        }

        let hour = match meridiem {
            Some(pm) => {
                if hour == 0 || hour > 12 {
                    return Err(malformed());
                }
                match (hour, pm) {
                    (12, false) => 0,
                    (12, true) => 12,
                    (h, true) => h + 12,
                    (h, false) => h,
                }
            }
            None => {
                if hour > 23 {
                    return Err(malformed());
                }
                hour
            }
        };

        Self::from_hm(hour, minute).ok_or_else(|| SlotParseError::NotADrawSlot {
            label: format_12h(hour, minute),
        })
    }
}

fn format_12h(hour: u32, minute: u32) -> String {
    let meridiem = if hour >= 12 { "PM" } else { "AM" };
    let display_hour = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{display_hour:02}:{minute:02} {meridiem}")
}

impl fmt::Display for SlotLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_12h(self.hour(), self.minute()))
    }
}

impl Serialize for SlotLabel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotLabel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SLOTS_PER_DAY;

    fn slot(raw: &str) -> SlotLabel {
        raw.parse().expect("valid slot")
    }

    #[test]
    fn normalizes_textual_variants() {
        let canonical = slot("02:00 PM");
        for raw in ["2:00 PM", "2:00PM", "2 PM", "2pm", "02.00 pm", " \"2:00 PM\" ", "14:00", "200PM"] {
            assert_eq!(slot(raw), canonical, "variant {raw:?}");
        }
        assert_eq!(canonical.to_string(), "02:00 PM");
    }

    #[test]
    fn handles_noon_and_morning() {
        assert_eq!(slot("12:15 PM").hour(), 12);
        assert_eq!(slot("9:45 am").to_string(), "09:45 AM");
        assert_eq!(slot("11:45 PM").hour(), 23);
    }

    #[test]
    fn rejects_times_that_are_not_slots() {
        assert_eq!("".parse::<SlotLabel>(), Err(SlotParseError::Empty));
        assert!(matches!(
            "2:10 PM".parse::<SlotLabel>(),
            Err(SlotParseError::NotADrawSlot { .. })
        ));
        assert!(matches!(
            "8:45 AM".parse::<SlotLabel>(),
            Err(SlotParseError::NotADrawSlot { .. })
        ));
        assert!(matches!(
            "12:00 AM".parse::<SlotLabel>(),
            Err(SlotParseError::NotADrawSlot { .. })
        ));
        assert!(matches!(
            "13:00 PM".parse::<SlotLabel>(),
            Err(SlotParseError::Malformed { .. })
        ));
        assert!(matches!(
            "noon".parse::<SlotLabel>(),
            Err(SlotParseError::Malformed { .. })
        ));
    }

    #[test]
    fn enumerates_the_business_day() {
        let slots: Vec<_> = SlotLabel::all().collect();
        assert_eq!(slots.len(), SLOTS_PER_DAY);
        assert_eq!(slots.first().map(|s| s.to_string()).as_deref(), Some("09:00 AM"));
        assert_eq!(slots.last().map(|s| s.to_string()).as_deref(), Some("11:45 PM"));
        assert!(slots.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn next_slot_after_a_time() {
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).expect("time");
        assert_eq!(SlotLabel::next_after(at(13, 52)), Some(slot("02:00 PM")));
        assert_eq!(SlotLabel::next_after(at(14, 0)), Some(slot("02:15 PM")));
        assert_eq!(SlotLabel::next_after(at(6, 0)), Some(slot("09:00 AM")));
        assert_eq!(SlotLabel::next_after(at(23, 45)), None);
    }
}
