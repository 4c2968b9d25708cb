//! PostgreSQL type mapping and value decoding.
//!
//! This module provides:
//! - OID constants for PostgreSQL built-in types
//! - `infer_type`, the fixed OID to `TypeTag` table
//! - Text-format decoding of field values, including the temporal parser
//!
//! # Example
//!
//! ```rust,ignore
//! use dataobjects_postgres::types::{decode_field, infer_type, oid};
//!
//! let tag = infer_type(oid::INT4);
//! let value = decode_field(Some(b"42"), tag)?;
//! assert_eq!(value, Value::Integer(42));
//! ```

pub mod decode;
pub mod oid;
pub mod temporal;

use dataobjects_core::TypeTag;

pub use decode::{decode, decode_field, unescape_bytea};
pub use temporal::{host_utc_offset_seconds, parse_date, parse_time_of_day, parse_timestamp};

/// Map a server column type to the tag its values decode as.
///
/// Total over all OIDs: anything not listed decodes as text.
pub const fn infer_type(type_oid: u32) -> TypeTag {
    match type_oid {
        oid::BIT | oid::VARBIT | oid::INT2 | oid::INT4 | oid::INT8 => TypeTag::Integer,
        oid::FLOAT4 | oid::FLOAT8 => TypeTag::Float,
        oid::NUMERIC | oid::MONEY => TypeTag::Decimal,
        oid::BOOL => TypeTag::Boolean,
        oid::TIMESTAMP | oid::TIMESTAMPTZ => TypeTag::Timestamp,
        oid::DATE => TypeTag::Date,
        oid::BYTEA => TypeTag::ByteArray,
        _ => TypeTag::Text,
    }
}
