//! Bet records and their textual validation.
//!
//! A [`Bet`] is built once from the five textual fields an agency stores per line
//! (`first_name, last_name, document, birthdate, number`) and never changes afterwards.
//! Every field is validated on construction, so the codec can always encode a `Bet`
//! without hitting a length or format error.
//!
//! # Example
//! ```rust
//! use tombola::{Bet, RawBet};
//!
//! let raw = RawBet::new("Santiago", "Lorca", "30904465", "1999-03-17", "7574");
//! let bet: Bet = raw.try_into().unwrap();
//! assert_eq!(bet.birthdate(), 19990317);
//! ```
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

/// Longest name, in bytes, that fits a one byte length prefix.
pub const NAME_MAX_LENGTH: usize = u8::MAX as usize;

const BIRTHDATE_FORMAT: &str = "%Y-%m-%d";
const BIRTHDATE_LENGTH: usize = "YYYY-MM-DD".len();

/// List of possible errors while validating a bet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BetError {
    #[error("invalid {field} '{value}', must be a numeric value")]
    NotNumeric { field: &'static str, value: String },

    #[error("invalid birthdate '{0}', must have format YYYY-MM-DD")]
    Birthdate(String),

    #[error("{field} is {len} bytes long, at most 255 are allowed")]
    TooLong { field: &'static str, len: usize },
}

/// Unvalidated bet fields, as read from the record source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBet {
    pub first_name: String,
    pub last_name: String,
    pub document: String,
    pub birthdate: String,
    pub number: String,
}

impl RawBet {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        document: impl Into<String>,
        birthdate: impl Into<String>,
        number: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            document: document.into(),
            birthdate: birthdate.into(),
            number: number.into(),
        }
    }
}

/// A single validated bet placed at an agency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    first_name: String,
    last_name: String,
    document: u32,
    birthdate: u32,
    number: u16,
}

impl Bet {
    /// Builds a bet from already typed values.
    ///
    /// `birthdate` is the `YYYYMMDD` decimal form used on the wire.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        document: u32,
        birthdate: u32,
        number: u16,
    ) -> Result<Self, BetError> {
        let first_name = check_name("first_name", first_name.into())?;
        let last_name = check_name("last_name", last_name.into())?;

        Ok(Self {
            first_name,
            last_name,
            document,
            birthdate,
            number,
        })
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn document(&self) -> u32 {
        self.document
    }

    pub fn birthdate(&self) -> u32 {
        self.birthdate
    }

    pub fn number(&self) -> u16 {
        self.number
    }
}

impl TryFrom<RawBet> for Bet {
    type Error = BetError;

    fn try_from(value: RawBet) -> Result<Self, Self::Error> {
        let document = parse_unsigned("document", value.document.trim())?;
        let birthdate = parse_birthdate(value.birthdate.trim())?;
        let number = parse_unsigned("number", value.number.trim())?;

        Bet::new(
            value.first_name.trim(),
            value.last_name.trim(),
            document,
            birthdate,
            number,
        )
    }
}

fn check_name(field: &'static str, name: String) -> Result<String, BetError> {
    if name.len() > NAME_MAX_LENGTH {
        return Err(BetError::TooLong {
            field,
            len: name.len(),
        });
    }
    Ok(name)
}

/// Parses a plain decimal: digits only, no sign.
fn parse_unsigned<T: FromStr>(field: &'static str, s: &str) -> Result<T, BetError> {
    let not_numeric = || BetError::NotNumeric {
        field,
        value: s.to_string(),
    };

    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(not_numeric());
    }
    s.parse().map_err(|_| not_numeric())
}

/// Converts `YYYY-MM-DD` into its `YYYYMMDD` decimal form.
fn parse_birthdate(s: &str) -> Result<u32, BetError> {
    let invalid = || BetError::Birthdate(s.to_string());

    let well_formed = s.len() == BIRTHDATE_LENGTH
        && s.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_formed {
        return Err(invalid());
    }

    let date = NaiveDate::parse_from_str(s, BIRTHDATE_FORMAT).map_err(|_| invalid())?;
    let year = u32::try_from(date.year()).map_err(|_| invalid())?;

    Ok(year * 10_000 + date.month() * 100 + date.day())
}
