//! PostgreSQL text-format decoding into typed values.
//!
//! The server sends every field as text (simple query protocol). The target
//! tag decides how that text is read.

// The Error type is intentionally large to provide rich error context.
#![allow(clippy::result_large_err)]

use dataobjects_core::{Decimal, Error, Result, TaintedText, TypeTag, Value};

use super::temporal::{parse_date, parse_time_of_day, parse_timestamp};

/// Decode one field. A wire NULL is `Value::Null` whatever the tag.
pub fn decode_field(raw: Option<&[u8]>, tag: TypeTag) -> Result<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(bytes) => decode(bytes, tag),
    }
}

/// Decode non-null field text as `tag`.
pub fn decode(raw: &[u8], tag: TypeTag) -> Result<Value> {
    match tag {
        TypeTag::Null => Ok(Value::Null),
        TypeTag::Text => Ok(Value::Text(TaintedText::new(raw))),
        TypeTag::ByteArray => Ok(Value::ByteArray(unescape_bytea(raw)?)),
        TypeTag::Boolean => Ok(Value::Boolean(raw.first() == Some(&b't'))),
        TypeTag::Integer => decode_integer(as_text(raw, tag)?),
        TypeTag::Float => decode_float(as_text(raw, tag)?),
        TypeTag::Decimal => decode_decimal(as_text(raw, tag)?),
        TypeTag::Date => Ok(Value::Date(parse_date(as_text(raw, tag)?))),
        TypeTag::Timestamp => Ok(Value::Timestamp(parse_timestamp(as_text(raw, tag)?)?)),
        TypeTag::Time => Ok(Value::Time(parse_time_of_day(as_text(raw, tag)?)?)),
    }
}

fn as_text(raw: &[u8], tag: TypeTag) -> Result<&str> {
    std::str::from_utf8(raw)
        .map_err(|_| Error::decode("invalid UTF-8", String::from_utf8_lossy(raw), Some(tag)))
}

/// Base-10 signed integer of any size.
fn decode_integer(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::decode("invalid integer", text, Some(TypeTag::Integer)));
    }

    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(Value::Integer(v));
    }

    // Out of i64 range: keep canonical digits
    let digits = digits.trim_start_matches('0');
    let canonical = if negative {
        format!("-{digits}")
    } else {
        digits.to_string()
    };
    Ok(Value::BigInteger(canonical))
}

/// Locale-independent float; accepts `NaN`, `Infinity` and `-Infinity`.
fn decode_float(text: &str) -> Result<Value> {
    text.trim()
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| Error::decode("invalid float", text, Some(TypeTag::Float)))
}

/// Full-precision decimal. Money output (`$1,234.50`) is normalized first.
fn decode_decimal(text: &str) -> Result<Value> {
    let normalized: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    Decimal::parse(&normalized)
        .map(Value::Decimal)
        .map_err(|_| Error::decode("invalid decimal", text, Some(TypeTag::Decimal)))
}

/// Undo the server's bytea text encoding.
///
/// Handles both the hex format (`\x0a0b`) and the legacy escape format
/// (`\\` for a backslash, `\ooo` octal for other bytes).
pub fn unescape_bytea(raw: &[u8]) -> Result<Vec<u8>> {
    if let Some(hex) = raw.strip_prefix(b"\\x") {
        return decode_hex(hex).ok_or_else(|| {
            Error::decode(
                "invalid bytea hex",
                String::from_utf8_lossy(raw),
                Some(TypeTag::ByteArray),
            )
        });
    }

    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        if b != b'\\' {
            bytes.push(b);
            i += 1;
            continue;
        }
        match raw.get(i + 1..i + 4) {
            Some(&[d0, d1, d2])
                if (b'0'..=b'3').contains(&d0) && is_octal(d1) && is_octal(d2) =>
            {
                bytes.push(((d0 - b'0') << 6) | ((d1 - b'0') << 3) | (d2 - b'0'));
                i += 4;
            }
            _ if raw.get(i + 1) == Some(&b'\\') => {
                bytes.push(b'\\');
                i += 2;
            }
            _ => {
                // Lone backslash
                bytes.push(b'\\');
                i += 1;
            }
        }
    }
    Ok(bytes)
}

fn is_octal(b: u8) -> bool {
    (b'0'..=b'7').contains(&b)
}

fn decode_hex(hex: &[u8]) -> Option<Vec<u8>> {
    // The server never emits whitespace, but PQunescapeBytea tolerates it.
    let digits: Vec<u8> = hex
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks_exact(2)
        .map(|pair| Some((hex_val(pair[0])? << 4) | hex_val(pair[1])?))
        .collect()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
