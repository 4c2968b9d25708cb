//! Typed values decoded from result fields.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::{DecodeError, Error};
use crate::temporal::{Date, TimeOfDay, Timestamp};
use crate::type_tag::TypeTag;

/// A typed value produced by decoding one result field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Signed integer that fits in 64 bits
    Integer(i64),

    /// Base-10 integer too large for i64, kept as canonical digits
    BigInteger(String),

    /// 64-bit floating point
    Float(f64),

    /// Arbitrary precision decimal
    Decimal(Decimal),

    /// Boolean value
    Boolean(bool),

    /// Calendar date
    Date(Date),

    /// Zoned timestamp
    Timestamp(Timestamp),

    /// Local time with no offset
    Time(TimeOfDay),

    /// Binary data
    ByteArray(Vec<u8>),

    /// Text from the wire, flagged as untrusted
    Text(TaintedText),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::BigInteger(_) => "BIGINTEGER",
            Value::Float(_) => "FLOAT",
            Value::Decimal(_) => "DECIMAL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Date(_) => "DATE",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Time(_) => "TIME",
            Value::ByteArray(_) => "BYTEA",
            Value::Text(_) => "TEXT",
        }
    }

    /// The tag this value was decoded as.
    pub const fn tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Integer(_) | Value::BigInteger(_) => TypeTag::Integer,
            Value::Float(_) => TypeTag::Float,
            Value::Decimal(_) => TypeTag::Decimal,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Date(_) => TypeTag::Date,
            Value::Timestamp(_) => TypeTag::Timestamp,
            Value::Time(_) => TypeTag::Time,
            Value::ByteArray(_) => TypeTag::ByteArray,
            Value::Text(_) => TypeTag::Text,
        }
    }

    /// Try to convert this value to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            Value::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Try to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Boolean(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Try to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            Value::BigInteger(s) => s.parse().ok(),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    ///
    /// Text that is not valid UTF-8 yields `None`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(t) => t.to_str(),
            Value::Decimal(d) => Some(d.as_str()),
            Value::BigInteger(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::ByteArray(b) => Some(b),
            Value::Text(t) => Some(t.as_bytes()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::BigInteger(v) => f.write_str(v),
            Value::Float(v) => {
                if v.is_nan() {
                    f.write_str("NaN")
                } else if v.is_infinite() {
                    f.write_str(if *v > 0.0 { "Infinity" } else { "-Infinity" })
                } else {
                    write!(f, "{v}")
                }
            }
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Boolean(v) => f.write_str(if *v { "t" } else { "f" }),
            Value::Date(d) => write!(f, "{d}"),
            Value::Timestamp(t) => write!(f, "{t}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::ByteArray(b) => {
                f.write_str("\\x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Text(t) => f.write_str(&t.to_string_lossy()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::ByteArray(v)
    }
}

impl From<Date> for Value {
    fn from(v: Date) -> Self {
        Value::Date(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

const DECIMAL_PATTERN: &str = r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$";

fn decimal_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| match Regex::new(DECIMAL_PATTERN) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "decimal pattern failed to compile");
            None
        }
    })
    .as_ref()
}

/// Arbitrary-precision decimal, kept as its validated text.
///
/// No arithmetic is offered; the text is preserved exactly as the server
/// rendered it so that no precision is lost.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal(String);

impl Decimal {
    /// Validate and wrap decimal text.
    ///
    /// `NaN` and the signed infinities are accepted and kept as `NaN`,
    /// `Infinity` and `-Infinity`.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("nan") {
            return Ok(Decimal("NaN".to_string()));
        }
        let (negative, magnitude) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        if magnitude.eq_ignore_ascii_case("infinity") || magnitude.eq_ignore_ascii_case("inf") {
            let canonical = if negative { "-Infinity" } else { "Infinity" };
            return Ok(Decimal(canonical.to_string()));
        }
        if decimal_regex().is_some_and(|re| re.is_match(text)) {
            Ok(Decimal(text.to_string()))
        } else {
            Err(DecodeError {
                message: "invalid decimal".to_string(),
                text: text.to_string(),
                tag: Some(TypeTag::Decimal),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_nan(&self) -> bool {
        self.0 == "NaN"
    }

    /// Lossy conversion to a binary float.
    pub fn to_f64(&self) -> Option<f64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::parse(s).map_err(Error::Decode)
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Text received from the server.
///
/// The bytes are passed through unchanged and always flagged as tainted,
/// for callers that track untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaintedText(Vec<u8>);

impl TaintedText {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The text as UTF-8, if it is valid UTF-8.
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn to_string_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub const fn is_tainted(&self) -> bool {
        true
    }
}

impl Serialize for TaintedText {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_validation() {
        for ok in ["1", "-1.50", "+0.000001", ".5", "12.", "1e10", "3.14E-2", "NaN"] {
            assert!(Decimal::parse(ok).is_ok(), "{ok}");
        }
        for bad in ["", "abc", "1.2.3", "--1", "1e", "$5"] {
            assert!(Decimal::parse(bad).is_err(), "{bad}");
        }
        let d: Decimal = "123456789012345678901234567890.000001".parse().unwrap();
        assert_eq!(d.to_string(), "123456789012345678901234567890.000001");
    }

    #[test]
    fn decimal_infinities() {
        for (text, canonical) in [
            ("Infinity", "Infinity"),
            ("+Infinity", "Infinity"),
            ("-Infinity", "-Infinity"),
            ("-infinity", "-Infinity"),
        ] {
            assert_eq!(Decimal::parse(text).unwrap().as_str(), canonical);
        }
        assert_eq!(Decimal::parse("-Infinity").unwrap().to_f64(), Some(f64::NEG_INFINITY));
        assert!(Decimal::parse("--Infinity").is_err());
        assert!(Decimal::parse("Infinityx").is_err());
    }

    #[test]
    fn accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Integer(42).as_i64(), Some(42));
        assert_eq!(Value::Integer(42).as_f64(), Some(42.0));
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::BigInteger("99999999999999999999".into()).tag(), TypeTag::Integer);
        let text = Value::Text(TaintedText::new("hello"));
        assert_eq!(text.as_str(), Some("hello"));
        assert_eq!(text.as_bytes(), Some(&b"hello"[..]));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn tainted_text_is_always_tainted() {
        let t = TaintedText::new(vec![0xff, b'a']);
        assert!(t.is_tainted());
        assert!(t.to_str().is_none());
        assert_eq!(t.to_string_lossy(), "\u{fffd}a");
    }

    #[test]
    fn display_renders_canonical_text() {
        assert_eq!(Value::Integer(-7).to_string(), "-7");
        assert_eq!(Value::Float(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::ByteArray(vec![0xde, 0xad]).to_string(), "\\xdead");
        assert_eq!(Value::Boolean(false).to_string(), "f");
    }

    #[test]
    fn serializes_to_json() {
        let json = serde_json::to_string(&Value::Decimal(Decimal::parse("1.10").unwrap())).unwrap();
        assert_eq!(json, r#"{"Decimal":"1.10"}"#);
        let json = serde_json::to_string(&Value::Text(TaintedText::new("x"))).unwrap();
        assert_eq!(json, r#"{"Text":"x"}"#);
        let json = serde_json::to_string(&Value::Null).unwrap();
        assert_eq!(json, r#""Null""#);
    }
}
