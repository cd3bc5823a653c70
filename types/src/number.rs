use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error as ThisError;

/// Characters dropped from stored ticket numbers before validation ("10-07" -> "1007").
const SEPARATORS: [char; 5] = ['-', ' ', '/', '.', '_'];

#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
pub enum NumberParseError {
    #[error("ticket number is empty")]
    Empty,
    #[error("ticket number {raw:?} contains a non-digit character {found:?}")]
    InvalidCharacter { raw: String, found: char },
    #[error("ticket number {raw:?} has {digits} digits (expected 4)")]
    WrongLength { raw: String, digits: usize },
    #[error("quantity {raw:?} is not a non-negative integer")]
    InvalidQuantity { raw: String },
    #[error("malformed number list: {reason}")]
    Malformed { reason: String },
}

/// A canonical 4-digit ticket number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TicketNumber(u16);

impl TicketNumber {
    /// Build a number from its prefix (first two digits) and suffix (last two digits).
    pub fn from_parts(prefix: u8, suffix: u8) -> Option<Self> {
        if prefix > 99 || suffix > 99 {
            return None;
        }
        Some(Self(prefix as u16 * 100 + suffix as u16))
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// First two digits.
    pub fn prefix(&self) -> u8 {
        (self.0 / 100) as u8
    }

    /// Last two digits.
    pub fn suffix(&self) -> u8 {
        (self.0 % 100) as u8
    }

    /// The series this number belongs to, if any.
    pub fn series(&self) -> Option<Series> {
        Series::from_prefix(self.prefix())
    }
}

impl FromStr for TicketNumber {
    type Err = NumberParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim().trim_matches('"');
        if trimmed.is_empty() {
            return Err(NumberParseError::Empty);
        }
        let mut value: u16 = 0;
        let mut digits = 0usize;
        for ch in trimmed.chars() {
            if SEPARATORS.contains(&ch) {
                continue;
            }
            let Some(digit) = ch.to_digit(10) else {
                return Err(NumberParseError::InvalidCharacter {
                    raw: raw.to_string(),
                    found: ch,
                });
            };
            digits += 1;
            if digits <= 4 {
                value = value * 10 + digit as u16;
            }
        }
        if digits != 4 {
            return Err(NumberParseError::WrongLength {
                raw: raw.to_string(),
                digits,
            });
        }
        Ok(Self(value))
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl Serialize for TicketNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TicketNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// One of the three number families that each need ten winners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Series {
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "30")]
    Thirty,
    #[serde(rename = "50")]
    Fifty,
}

impl Series {
    pub const ALL: [Series; 3] = [Series::Ten, Series::Thirty, Series::Fifty];

    /// First prefix of the series.
    pub fn start(&self) -> u8 {
        match self {
            Series::Ten => 10,
            Series::Thirty => 30,
            Series::Fifty => 50,
        }
    }

    pub fn prefixes(&self) -> RangeInclusive<u8> {
        let start = self.start();
        start..=start + 9
    }

    pub fn from_prefix(prefix: u8) -> Option<Series> {
        match prefix {
            10..=19 => Some(Series::Ten),
            30..=39 => Some(Series::Thirty),
            50..=59 => Some(Series::Fifty),
            _ => None,
        }
    }

    /// Position of the series in [`Series::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Series::Ten => 0,
            Series::Thirty => 1,
            Series::Fifty => 2,
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_separators() {
        let number: TicketNumber = "10-07".parse().expect("parse");
        assert_eq!(number.to_string(), "1007");
        assert_eq!(number.prefix(), 10);
        assert_eq!(number.suffix(), 7);
        assert_eq!(number.series(), Some(Series::Ten));

        let spaced: TicketNumber = " 3 0 9 9 ".parse().expect("parse");
        assert_eq!(spaced.to_string(), "3099");
    }

    #[test]
    fn keeps_leading_zeros() {
        let number: TicketNumber = "0042".parse().expect("parse");
        assert_eq!(number.value(), 42);
        assert_eq!(number.to_string(), "0042");
        assert_eq!(number.series(), None);
    }

    #[test]
    fn rejects_bad_numbers() {
        assert_eq!("".parse::<TicketNumber>(), Err(NumberParseError::Empty));
        assert!(matches!(
            "10a7".parse::<TicketNumber>(),
            Err(NumberParseError::InvalidCharacter { found: 'a', .. })
        ));
        assert!(matches!(
            "107".parse::<TicketNumber>(),
            Err(NumberParseError::WrongLength { digits: 3, .. })
        ));
        assert!(matches!(
            "10071".parse::<TicketNumber>(),
            Err(NumberParseError::WrongLength { digits: 5, .. })
        ));
    }

    #[test]
    fn series_ranges() {
        assert_eq!(Series::from_prefix(19), Some(Series::Ten));
        assert_eq!(Series::from_prefix(20), None);
        assert_eq!(Series::from_prefix(30), Some(Series::Thirty));
        assert_eq!(Series::from_prefix(59), Some(Series::Fifty));
        assert_eq!(Series::from_prefix(60), None);
        assert_eq!(Series::Thirty.prefixes().count(), 10);
        assert_eq!(Series::Fifty.to_string(), "50");
    }

    #[test]
    fn serializes_as_padded_string() {
        let number = TicketNumber::from_parts(10, 7).expect("valid parts");
        let json = serde_json::to_string(&number).expect("serialize");
        assert_eq!(json, "\"1007\"");
        let back: TicketNumber = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, number);
        assert!(TicketNumber::from_parts(100, 0).is_none());
    }
}
