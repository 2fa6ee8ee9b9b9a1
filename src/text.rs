//! Canonicalization of hand-typed text: entity names and numbers that may be
//! written with Bengali digit glyphs.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid number: {0:?}")]
    InvalidNumber(String),
    #[error("Invalid date: {0:?} (expected YYYY-MM-DD or dd/MM/yyyy)")]
    InvalidDate(String),
    #[error("Invalid month: {0:?} (expected YYYY-MM)")]
    InvalidMonth(String),
}

const BENGALI_ZERO: char = '\u{09E6}';

/// Characters that are invisible but break equality of typed names.
fn is_invisible(ch: char) -> bool {
    matches!(
        ch,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}'
    )
}

/// Grouping key for free-text names (entity, ministry, branch).
///
/// NFC-normalizes, drops zero-width characters and BOM, collapses whitespace
/// runs into one space and trims. Every name comparison goes through here.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.nfc() {
        if is_invisible(ch) {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

pub fn same_name(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

/// Maps Bengali digits to ASCII digits, leaving everything else untouched.
pub fn canonical_digits(raw: &str) -> String {
    raw.chars()
        .map(|ch| match ch {
            '\u{09E6}'..='\u{09EF}' => {
                char::from(b'0' + (ch as u32 - BENGALI_ZERO as u32) as u8)
            }
            _ => ch,
        })
        .collect()
}

pub fn to_bengali_digits(raw: &str) -> String {
    raw.chars()
        .map(|ch| match ch {
            '0'..='9' => char::from_u32(BENGALI_ZERO as u32 + (ch as u32 - '0' as u32))
                .unwrap_or(ch),
            _ => ch,
        })
        .collect()
}

/// Parses a possibly localized number ("১,২৫০.৫০", "1250.5", " 3 ").
pub fn parse_localized_decimal(raw: &str) -> Result<Decimal, ParseError> {
    let canonical: String = canonical_digits(raw.trim())
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if canonical.is_empty() {
        return Ok(Decimal::ZERO);
    }
    canonical
        .parse::<Decimal>()
        .map_err(|_| ParseError::InvalidNumber(raw.to_string()))
}

/// True for raw count text that stands for "nothing entered": empty, "0" or "০".
pub fn is_textual_zero(raw: &str) -> bool {
    matches!(raw.trim(), "" | "0" | "\u{09E6}")
}

pub fn parse_localized_count(raw: &str) -> Result<i64, ParseError> {
    let value = parse_localized_decimal(raw)?;
    if !value.fract().is_zero() {
        return Err(ParseError::InvalidNumber(raw.to_string()));
    }
    value
        .to_i64()
        .ok_or_else(|| ParseError::InvalidNumber(raw.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Text(String),
    Number(Decimal),
    Null,
}

/// Serde boundary for amount fields: accepts JSON numbers, ASCII strings and
/// Bengali-digit strings. Unparseable text deserializes to zero.
pub fn de_localized_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(d) => d,
        NumberOrText::Text(s) => match parse_localized_decimal(&s) {
            Ok(d) => d,
            Err(err) => {
                tracing::debug!(%err, "treating unparseable amount as zero");
                Decimal::ZERO
            }
        },
        NumberOrText::Null => Decimal::ZERO,
    };
    Ok(value)
}

/// Serde boundary for whole-number count fields: JSON integers or strings with
/// ASCII or Bengali digits. Unparseable or fractional values deserialize to zero.
pub fn de_localized_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(d) if d.fract().is_zero() => d
            .to_i64()
            .ok_or_else(|| ParseError::InvalidNumber(d.to_string())),
        NumberOrText::Number(d) => Err(ParseError::InvalidNumber(d.to_string())),
        NumberOrText::Text(s) => parse_localized_count(&s),
        NumberOrText::Null => Ok(0),
    };
    Ok(parsed.unwrap_or_else(|err| {
        tracing::debug!(%err, "treating unparseable count as zero");
        0
    }))
}

/// Serde boundary for free-text count fields that may arrive as JSON numbers.
pub fn de_count_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(d) => Some(d.normalize().to_string()),
        NumberOrText::Text(s) => Some(s),
        NumberOrText::Null => None,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn names_differing_in_spacing_and_invisibles_match() {
        let a = "  Dhaka\u{200B}   Zilla\tParishad ";
        let b = "\u{FEFF}Dhaka Zilla Parishad";
        assert_eq!(normalize_name(a), "Dhaka Zilla Parishad");
        assert!(same_name(a, b));
    }

    #[test]
    fn composed_and_decomposed_forms_match() {
        // e + combining acute vs precomposed é
        assert!(same_name("Caf\u{0065}\u{0301}", "Caf\u{00E9}"));
    }

    #[test]
    fn bengali_digits_canonicalize() {
        assert_eq!(canonical_digits("১২৩"), "123");
        assert_eq!(to_bengali_digits("16/03/2024"), "১৬/০৩/২০২৪");
        assert_eq!(
            parse_localized_decimal("১,২৫০.৫০").unwrap(),
            Decimal::from_str("1250.50").unwrap()
        );
        assert_eq!(parse_localized_count("৩").unwrap(), 3);
        assert!(parse_localized_count("abc").is_err());
    }

    #[derive(Debug, Deserialize)]
    struct Counted {
        #[serde(default, deserialize_with = "de_localized_count")]
        count: i64,
    }

    #[test]
    fn counts_decode_from_numbers_and_localized_text() {
        let decode = |v: serde_json::Value| serde_json::from_value::<Counted>(v).unwrap().count;
        assert_eq!(decode(serde_json::json!({"count": 7})), 7);
        assert_eq!(decode(serde_json::json!({"count": "৫"})), 5);
        assert_eq!(decode(serde_json::json!({"count": " 12 "})), 12);
        assert_eq!(decode(serde_json::json!({"count": null})), 0);
        assert_eq!(decode(serde_json::json!({"count": "many"})), 0);
        assert_eq!(decode(serde_json::json!({})), 0);
    }

    #[test]
    fn textual_zero_sentinels() {
        assert!(is_textual_zero(""));
        assert!(is_textual_zero(" 0 "));
        assert!(is_textual_zero("০"));
        assert!(!is_textual_zero("00"));
        assert!(!is_textual_zero("3"));
    }
}
