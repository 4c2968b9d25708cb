//! Core types for DataObjects Rust.
//!
//! This crate provides the backend-agnostic vocabulary shared by drivers:
//!
//! - `Error` taxonomy (connection, query, decode, argument, reader)
//! - `Value` typed field values, with `Decimal` and `TaintedText`
//! - `TypeTag` target type tags and `FieldTypeDecl` declarations
//! - Calendar values (`Date`, `Timestamp`, `TimeOfDay`, `DayFraction`)
//! - `Row` with shared `ColumnInfo`
//! - `QueryLogger` timing hook

pub mod error;
pub mod logger;
pub mod row;
pub mod temporal;
pub mod type_tag;
pub mod value;

pub use error::{
    ArgumentError, ArgumentErrorKind, ConfigError, ConnectionError, ConnectionErrorKind,
    DecodeError, Error, ProtocolError, QueryError, QueryErrorKind, ReaderError, ReaderErrorKind,
    Result,
};
pub use logger::{NoopLogger, QueryLogger, TracingLogger};
pub use row::{ColumnInfo, Row};
pub use temporal::{Date, DayFraction, TimeOfDay, Timestamp};
pub use type_tag::{FieldTypeDecl, TypeTag, resolve_field_types};
pub use value::{Decimal, TaintedText, Value};
