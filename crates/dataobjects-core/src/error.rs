//! Error types for DataObjects operations.

use std::fmt;

use crate::type_tag::TypeTag;

/// The primary error type for all DataObjects operations.
#[derive(Debug)]
pub enum Error {
    /// Handshake or session-setup failure; the connection is unusable
    Connection(ConnectionError),
    /// Statement execution failure (after the single resubmission attempt)
    Query(QueryError),
    /// Malformed field text for its declared type
    Decode(DecodeError),
    /// Invalid caller-supplied field type declarations
    Argument(ArgumentError),
    /// Misuse of a result reader (closed, not positioned)
    Reader(ReaderError),
    /// Protocol errors (wire-level)
    Protocol(ProtocolError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection refused
    Refused,
    /// Authentication failed
    Authentication,
    /// Connection lost during operation
    Disconnected,
    /// Connection was already disposed
    Closed,
    /// Client encoding could not be applied
    Encoding,
    /// A fatal session-setup statement failed
    SessionSetup,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<usize>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Permission denied
    Permission,
    /// Deadlock detected
    Deadlock,
    /// Serialization failure (retry may succeed)
    Serialization,
    /// Statement timeout
    Timeout,
    /// Cancelled
    Cancelled,
    /// The statement could not be delivered to the server
    Transport,
    /// Statement produced a result of the wrong shape for the call
    UnexpectedResult,
    /// Other database error
    Database,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub message: String,
    pub text: String,
    pub tag: Option<TypeTag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentError {
    pub kind: ArgumentErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentErrorKind {
    /// A declared field type did not resolve to a known tag
    InvalidFieldType { given: String },
    /// Declared field types and the server's field count disagree
    FieldCountMismatch { expected: usize, actual: usize },
    /// Input could not be escaped for the connection's encoding
    InvalidInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderError {
    pub kind: ReaderErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderErrorKind {
    /// The reader was closed and its result released
    Closed,
    /// No row is loaded (before the first advance or after exhaustion)
    NoCurrentRow,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    pub raw_data: Option<Vec<u8>>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(c) => !matches!(c.kind, ConnectionErrorKind::Closed),
            Error::Protocol(_) | Error::Io(_) => true,
            Error::Query(q) => q.kind == QueryErrorKind::Transport,
            _ => false,
        }
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// Is this a decode failure for a single field value?
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode(_))
    }

    /// Build a decode error for `text` that could not be read as `tag`.
    pub fn decode(message: impl Into<String>, text: impl Into<String>, tag: Option<TypeTag>) -> Self {
        Error::Decode(DecodeError {
            message: message.into(),
            text: text.into(),
            tag,
        })
    }

    /// Build the error raised when a reader is used after close.
    pub fn reader_closed() -> Self {
        Error::Reader(ReaderError {
            kind: ReaderErrorKind::Closed,
        })
    }
}

impl QueryError {
    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505")
    }

    /// Is this a foreign key violation?
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23503")
    }
}

impl ArgumentError {
    /// A declared type did not resolve to a known tag.
    pub fn invalid_field_type(given: impl Into<String>) -> Self {
        let given = given.into();
        Self {
            message: format!("Invalid type given: {given}"),
            kind: ArgumentErrorKind::InvalidFieldType { given },
        }
    }

    /// Declared type count differs from the server's field count.
    pub fn field_count_mismatch(expected: usize, actual: usize) -> Self {
        Self {
            kind: ArgumentErrorKind::FieldCountMismatch { expected, actual },
            message: format!(
                "Field-count mismatch. Expected {expected} fields, but the query yielded {actual}"
            ),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)?;
                } else {
                    write!(f, "Query error: {}", e.message)?;
                }
                if let Some(sql) = &e.sql {
                    write!(f, " Query: {}", sql)?;
                }
                Ok(())
            }
            Error::Decode(e) => write!(f, "Decode error: {}", e),
            Error::Argument(e) => write!(f, "Argument error: {}", e.message),
            Error::Reader(e) => write!(f, "Reader error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Protocol(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "{} as {}: {:?}", self.message, tag, self.text),
            None => write!(f, "{}: {:?}", self.message, self.text),
        }
    }
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ReaderErrorKind::Closed => write!(f, "reader is closed"),
            ReaderErrorKind::NoCurrentRow => write!(f, "reader not positioned on a row"),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DecodeError {}

impl std::error::Error for ArgumentError {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Decode(err)
    }
}

impl From<ArgumentError> for Error {
    fn from(err: ArgumentError) -> Self {
        Error::Argument(err)
    }
}

impl From<ReaderError> for Error {
    fn from(err: ReaderError) -> Self {
        Error::Reader(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for DataObjects operations.
pub type Result<T> = std::result::Result<T, Error>;
