//! PostgreSQL driver core for DataObjects Rust.
//!
//! `dataobjects-postgres` opens sessions with a PostgreSQL server, runs
//! already-interpolated SQL through the simple query protocol and decodes
//! result fields into typed `Value`s.
//!
//! It provides:
//!
//! - Message framing and parsing (protocol version 3)
//! - Authentication (cleartext, MD5, SCRAM-SHA-256)
//! - Session setup (search_path, quoting settings, client encoding)
//! - Encoding-aware literal quoting for strings and bytea
//! - Blocking and non-blocking command execution
//! - A forward-only `ResultReader` with per-field type inference or
//!   caller-declared field types
//!
//! # Example
//!
//! ```rust,ignore
//! use dataobjects_postgres::{CommandOutcome, Connection, ConnectionOptions};
//!
//! let options = ConnectionOptions::new("localhost", "postgres", "mydb").port(5432);
//! let mut conn = Connection::open(options)?;
//!
//! let name = conn.quote_string("O'Reilly")?;
//! let sql = format!("SELECT id, created_at FROM authors WHERE name = {}", String::from_utf8_lossy(&name));
//! let mut reader = conn.create_command(sql).execute_reader()?;
//! while reader.advance()? {
//!     println!("{:?}", reader.values()?);
//! }
//! ```

pub mod auth;
pub mod command;
pub mod config;
pub mod connection;
pub mod escape;
pub(crate) mod executor;
pub mod protocol;
pub mod reader;
pub mod types;

pub use command::{Command, CommandOutcome, ExecResult};
pub use config::{ConnectionOptions, ExecutionStrategy};
pub use connection::{Connection, ConnectionState, TransactionStatusState};
pub use escape::ClientEncoding;
pub use reader::{FieldDescriptor, ResultReader};
