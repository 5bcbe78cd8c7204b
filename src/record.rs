//! Ledger record codec
//!
//! Raw line:       `debtor,creditor,amount` (fields may carry surrounding whitespace)
//! Canonical line: trimmed fields, amount in normalized decimal form
//! Key:            `debtor,creditor`
//!
//! Fields are produced by splitting on commas, so no field can contain one and
//! the key serialization is injective. Byte order of keys is the sort order
//! used everywhere, which keeps every run of equal keys contiguous.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

pub const FIELD_SEPARATOR: char = ',';

/// Decimal places in rendered totals
pub const TOTAL_SCALE: u32 = 2;

/// One parsed ledger row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub debtor: String,
    pub creditor: String,
    pub amount: Decimal,
}

/// Why a ledger line was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRecord {
    #[error("a line should have exactly 3 fields, found {0}")]
    FieldCount(usize),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("amount {0:?} is not a valid number")]
    BadAmount(String),
}

/// Parse and validate one raw ledger line
pub fn parse(line: &str) -> Result<Record, InvalidRecord> {
    let mut fields = line.split(FIELD_SEPARATOR).map(str::trim);
    let (Some(debtor), Some(creditor), Some(amount), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(InvalidRecord::FieldCount(line.split(FIELD_SEPARATOR).count()));
    };

    if debtor.is_empty() {
        return Err(InvalidRecord::EmptyField("debtor"));
    }
    if creditor.is_empty() {
        return Err(InvalidRecord::EmptyField("creditor"));
    }
    if amount.is_empty() {
        return Err(InvalidRecord::EmptyField("amount"));
    }

    let amount = parse_amount(amount).ok_or_else(|| InvalidRecord::BadAmount(amount.to_string()))?;

    Ok(Record {
        debtor: debtor.to_string(),
        creditor: creditor.to_string(),
        amount,
    })
}

/// Accepts `12`, `-3.5`, `+4.20`, `.5`, `1e3`, `2.5E-1`.
/// Rejects NaN/Infinity, hex, digit separators and anything out of `Decimal` range.
fn parse_amount(raw: &str) -> Option<Decimal> {
    let body = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    let negative = raw.starts_with('-');

    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };

    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in mantissa.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return None,
        }
    }
    if !seen_digit {
        return None;
    }

    let mut text = String::with_capacity(mantissa.len() + 8);
    if negative {
        text.push('-');
    }
    if mantissa.starts_with('.') {
        text.push('0');
    }
    text.push_str(mantissa);
    if mantissa.ends_with('.') {
        text.push('0');
    }

    match exponent {
        None => Decimal::from_str(&text).ok(),
        Some(exp) => {
            // from_scientific wants a plain integer exponent
            let exp: i64 = exp.parse().ok()?;
            text.push('e');
            text.push_str(&exp.to_string());
            Decimal::from_scientific(&text).ok()
        }
    }
}

/// Serialize the `(debtor, creditor)` key of a record
pub fn serialize_key(record: &Record) -> String {
    let mut key = String::with_capacity(record.debtor.len() + record.creditor.len() + 1);
    key.push_str(&record.debtor);
    key.push(FIELD_SEPARATOR);
    key.push_str(&record.creditor);
    key
}

impl Record {
    pub fn key(&self) -> String {
        serialize_key(self)
    }

    /// Canonical line (no trailing newline)
    pub fn to_line(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.debtor,
            self.creditor,
            self.amount.normalize(),
            sep = FIELD_SEPARATOR
        )
    }

    /// Byte length of the key prefix of `to_line()`
    pub fn key_len(&self) -> usize {
        self.debtor.len() + 1 + self.creditor.len()
    }
}

/// Key of a canonical line: everything before the last separator
pub fn key_of(line: &str) -> Option<&str> {
    line.rsplit_once(FIELD_SEPARATOR).map(|(key, _)| key)
}

/// Split a canonical line into its key and amount
pub fn split_canonical(line: &str) -> Option<(&str, Decimal)> {
    let (key, amount) = line.rsplit_once(FIELD_SEPARATOR)?;
    if !key.contains(FIELD_SEPARATOR) {
        return None;
    }
    let amount = Decimal::from_str(amount).ok()?;
    Some((key, amount))
}

/// Summed total for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRecord {
    pub debtor: String,
    pub creditor: String,
    pub total: Decimal,
}

impl SummaryRecord {
    /// Build from a serialized key; `None` if the key has no separator
    pub fn from_key(key: &str, total: Decimal) -> Option<Self> {
        let (debtor, creditor) = key.split_once(FIELD_SEPARATOR)?;
        Some(Self {
            debtor: debtor.to_string(),
            creditor: creditor.to_string(),
            total,
        })
    }
}

impl fmt::Display for SummaryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.debtor,
            self.creditor,
            format_total(self.total),
            sep = FIELD_SEPARATOR
        )
    }
}

/// Round a total to two decimals, midpoint away from zero.
///
/// `None` when the value has too many integer digits to also carry two
/// decimals within `Decimal`'s 28-digit mantissa.
pub fn round_total(total: Decimal) -> Option<Decimal> {
    let mut rounded = total.round_dp_with_strategy(TOTAL_SCALE, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded.rescale(TOTAL_SCALE);
    (rounded.scale() == TOTAL_SCALE).then_some(rounded)
}

/// Render a total with exactly two decimals. Totals rejected by
/// [`round_total`] fall back to their rounded integer form.
pub fn format_total(total: Decimal) -> String {
    match round_total(total) {
        Some(rounded) => rounded.to_string(),
        None => total
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_string(),
    }
}
