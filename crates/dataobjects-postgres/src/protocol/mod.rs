//! PostgreSQL wire protocol (version 3), simple query subset.

pub mod messages;
pub mod reader;
pub mod writer;

pub use messages::{
    BackendMessage, ErrorFields, FieldDescription, FrontendMessage, TransactionStatus,
};
pub use reader::MessageReader;
pub use writer::MessageWriter;

/// Protocol version 3.0.
pub const PROTOCOL_VERSION: i32 = 196_608;
