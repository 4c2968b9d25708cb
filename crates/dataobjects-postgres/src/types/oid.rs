//! Object IDs of the built-in server types a result field may carry.

// Numeric
pub const INT8: u32 = 20;
pub const INT2: u32 = 21;
pub const INT4: u32 = 23;
pub const FLOAT4: u32 = 700;
pub const FLOAT8: u32 = 701;
pub const MONEY: u32 = 790;
pub const NUMERIC: u32 = 1700;
pub const BIT: u32 = 1560;
pub const VARBIT: u32 = 1562;

// Character and binary
pub const BOOL: u32 = 16;
pub const BYTEA: u32 = 17;
pub const TEXT: u32 = 25;
pub const BPCHAR: u32 = 1042;
pub const VARCHAR: u32 = 1043;
pub const JSON: u32 = 114;
pub const JSONB: u32 = 3802;
pub const UUID: u32 = 2950;

// Calendar
pub const DATE: u32 = 1082;
pub const TIME: u32 = 1083;
pub const TIMESTAMP: u32 = 1114;
pub const TIMESTAMPTZ: u32 = 1184;
pub const INTERVAL: u32 = 1186;
pub const TIMETZ: u32 = 1266;

/// Server-side name of a type, `"unknown"` for anything not listed above.
#[must_use]
pub const fn type_name(type_oid: u32) -> &'static str {
    match type_oid {
        INT8 => "int8",
        INT2 => "int2",
        INT4 => "int4",
        FLOAT4 => "float4",
        FLOAT8 => "float8",
        MONEY => "money",
        NUMERIC => "numeric",
        BIT => "bit",
        VARBIT => "varbit",
        BOOL => "bool",
        BYTEA => "bytea",
        TEXT => "text",
        BPCHAR => "bpchar",
        VARCHAR => "varchar",
        JSON => "json",
        JSONB => "jsonb",
        UUID => "uuid",
        DATE => "date",
        TIME => "time",
        TIMESTAMP => "timestamp",
        TIMESTAMPTZ => "timestamptz",
        INTERVAL => "interval",
        TIMETZ => "timetz",
        _ => "unknown",
    }
}
