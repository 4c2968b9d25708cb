//! PostgreSQL connection.
//!
//! Establishes the session (TCP, startup, authentication), applies the
//! session setup statements and owns the socket that commands run over.
//!
//! ```rust,ignore
//! use dataobjects_postgres::{Connection, ConnectionOptions};
//!
//! let options = ConnectionOptions::new("localhost", "postgres", "app").password("secret");
//! let mut conn = Connection::open(options)?;
//! let literal = conn.quote_string("O'Reilly")?;
//! conn.dispose();
//! ```

// The Error type is intentionally large to provide rich error context.
#![allow(clippy::result_large_err)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;

use dataobjects_core::{
    ConnectionError, ConnectionErrorKind, Error, NoopLogger, ProtocolError, QueryError,
    QueryErrorKind, QueryLogger, Result,
};

use crate::auth::{ScramClient, md5_password};
use crate::command::Command;
use crate::config::ConnectionOptions;
use crate::escape::{self, ClientEncoding};
use crate::executor::{self, RawResult, Resubmit};
use crate::protocol::{
    BackendMessage, ErrorFields, FrontendMessage, MessageReader, MessageWriter, PROTOCOL_VERSION,
    TransactionStatus,
};

/// Connection state in the protocol state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// TCP connection established, sending startup
    Connecting,
    /// Performing authentication handshake
    Authenticating,
    /// Ready for queries
    Ready(TransactionStatusState),
    /// A query was sent and its results are not fully read
    InQuery,
    /// The transport failed; the next command resets it
    Error,
    /// Disposed
    Closed,
}

/// Transaction status from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatusState {
    /// Not in a transaction block ('I')
    #[default]
    Idle,
    /// In a transaction block ('T')
    InTransaction,
    /// In a failed transaction block ('E')
    InFailed,
}

impl From<TransactionStatus> for TransactionStatusState {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Idle => TransactionStatusState::Idle,
            TransactionStatus::Transaction => TransactionStatusState::InTransaction,
            TransactionStatus::Error => TransactionStatusState::InFailed,
        }
    }
}

/// Session setup statements whose failure is only logged.
const ADVISORY_SETUP: [&str; 3] = [
    "SET backslash_quote = off",
    "SET standard_conforming_strings = on",
    "SET client_min_messages = warning",
];

/// An open session with a PostgreSQL server.
///
/// Every executing call takes `&mut self`, so at most one command is in
/// flight per connection.
pub struct Connection {
    pub(crate) stream: Option<TcpStream>,
    pub(crate) state: ConnectionState,
    /// Backend process ID (for query cancellation)
    process_id: i32,
    /// Secret key (for query cancellation)
    secret_key: i32,
    /// Server parameters from startup and later ParameterStatus messages
    pub(crate) parameters: HashMap<String, String>,
    pub(crate) options: ConnectionOptions,
    pub(crate) reader: MessageReader,
    writer: MessageWriter,
    read_buf: Vec<u8>,
    pub(crate) logger: Arc<dyn QueryLogger>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("process_id", &self.process_id)
            .field("host", &self.options.host)
            .field("port", &self.options.port)
            .field("database", &self.options.database)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open a session without a statement logger.
    pub fn open(options: ConnectionOptions) -> Result<Self> {
        Self::open_with_logger(options, Arc::new(NoopLogger))
    }

    /// Open a session.
    ///
    /// This performs the complete connection handshake and session setup:
    /// 1. TCP connection
    /// 2. Startup message and authentication
    /// 3. Server parameters up to ReadyForQuery
    /// 4. search_path, quoting settings, client encoding
    pub fn open_with_logger(
        options: ConnectionOptions,
        logger: Arc<dyn QueryLogger>,
    ) -> Result<Self> {
        options.validate()?;

        let mut conn = Self {
            stream: None,
            state: ConnectionState::Disconnected,
            process_id: 0,
            secret_key: 0,
            parameters: HashMap::new(),
            options,
            reader: MessageReader::new(),
            writer: MessageWriter::new(),
            read_buf: vec![0u8; 8192],
            logger,
        };

        if let Err(e) = conn.start() {
            conn.release();
            return Err(e);
        }

        tracing::debug!(
            host = %conn.options.host,
            port = conn.options.port,
            database = %conn.options.database,
            server_version = conn.parameter("server_version").unwrap_or("unknown"),
            "connection open"
        );
        Ok(conn)
    }

    /// Bind a SQL string to this connection for execution.
    pub fn create_command(&mut self, text: impl Into<String>) -> Command<'_> {
        Command::new(self, text.into())
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the session has not been disposed.
    ///
    /// A connection whose transport was lost stays open: the next command
    /// reconnects it.
    pub fn is_open(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    /// Get the backend process ID (for query cancellation).
    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    /// Get the secret key (for query cancellation).
    pub fn secret_key(&self) -> i32 {
        self.secret_key
    }

    /// Get a server parameter value.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(|s| s.as_str())
    }

    /// The options this connection was opened with.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// The server version string (`server_version` parameter).
    pub fn server_version(&self) -> Option<&str> {
        self.parameter("server_version")
    }

    /// The negotiated client encoding, lower-cased; `None` once disposed.
    pub fn character_set(&self) -> Option<String> {
        if !self.is_open() {
            return None;
        }
        self.parameter("client_encoding")
            .map(|e| e.to_ascii_lowercase())
    }

    /// Whether backslashes in ordinary string literals are literal.
    pub fn standard_conforming_strings(&self) -> bool {
        self.parameter("standard_conforming_strings") == Some("on")
    }

    /// Quote text as a string literal for this session.
    pub fn quote_string(&self, input: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let encoding = ClientEncoding::from_name(self.parameter("client_encoding").unwrap_or("UTF8"));
        escape::quote_string(input.as_ref(), encoding, self.standard_conforming_strings())
    }

    /// Quote binary data as a bytea literal for this session.
    pub fn quote_byte_array(&self, input: impl AsRef<[u8]>) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let version = self
            .server_version()
            .and_then(escape::parse_server_version)
            .unwrap_or(0);
        Ok(escape::quote_byte_array(
            input.as_ref(),
            version,
            self.standard_conforming_strings(),
        ))
    }

    /// Close the session. Returns whether anything was closed.
    pub fn dispose(&mut self) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        if matches!(
            self.state,
            ConnectionState::Ready(_) | ConnectionState::InQuery
        ) {
            // Best effort; the socket is dropped either way
            let _ = self.send_message(&FrontendMessage::Terminate);
        }
        self.release();
        tracing::debug!(process_id = self.process_id, "connection disposed");
        true
    }

    /// Drop the transport and every buffered byte.
    fn release(&mut self) {
        self.stream = None;
        self.reader.clear();
        self.state = ConnectionState::Closed;
    }

    /// Reconnect with the same options and re-apply the session setup.
    ///
    /// On failure the connection is left in `Error` without a transport,
    /// keeping the last known server parameters, so a later command can
    /// try again.
    pub(crate) fn reset(&mut self) -> Result<()> {
        tracing::debug!(process_id = self.process_id, "resetting connection");
        self.stream = None;
        self.reader.clear();
        self.state = ConnectionState::Disconnected;
        let previous = std::mem::take(&mut self.parameters);

        let outcome = self.start();
        if outcome.is_err() {
            self.stream = None;
            self.reader.clear();
            self.parameters = previous;
            self.state = ConnectionState::Error;
        }
        outcome
    }

    /// Fails only once the connection has been disposed.
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(closed_error());
        }
        Ok(())
    }

    pub(crate) fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(closed_error)
    }

    // ==================== Startup ====================

    fn start(&mut self) -> Result<()> {
        self.establish()?;
        self.apply_session_setup()
    }

    fn establish(&mut self) -> Result<()> {
        let stream = connect_tcp(&self.options)?;
        stream.set_nodelay(true).ok();
        stream.set_read_timeout(Some(self.options.connect_timeout)).ok();
        stream.set_write_timeout(Some(self.options.connect_timeout)).ok();
        self.stream = Some(stream);
        self.state = ConnectionState::Connecting;

        self.send_startup()?;
        self.state = ConnectionState::Authenticating;
        self.handle_auth()?;
        self.read_startup_messages()?;

        // No client-side query timeout once the session is up
        let stream = self.stream_mut()?;
        stream.set_read_timeout(None).ok();
        stream.set_write_timeout(None).ok();
        Ok(())
    }

    fn send_startup(&mut self) -> Result<()> {
        let params = self.options.startup_params();
        let msg = FrontendMessage::Startup {
            version: PROTOCOL_VERSION,
            params,
        };
        self.send_message(&msg)
    }

    fn apply_session_setup(&mut self) -> Result<()> {
        if let Some(path) = self.options.search_path.clone() {
            let sql = format!("set search_path to {path};");
            self.run_setup(&sql).map_err(|e| {
                setup_error(
                    ConnectionErrorKind::SessionSetup,
                    format!("Couldn't set search_path: {path}"),
                    e,
                )
            })?;
        }

        for sql in ADVISORY_SETUP {
            if let Err(e) = self.run_setup(sql) {
                tracing::warn!(statement = sql, error = %e, "session setup statement failed");
            }
        }

        let encoding = self.options.effective_encoding().to_string();
        let valid = encoding
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        let result = if valid {
            self.run_setup(&format!("SET client_encoding TO '{encoding}'"))
        } else {
            Err(Error::Config(dataobjects_core::ConfigError {
                message: format!("invalid encoding name: {encoding}"),
                source: None,
            }))
        };
        result.map_err(|e| {
            setup_error(
                ConnectionErrorKind::Encoding,
                format!("Couldn't set encoding: {encoding}"),
                e,
            )
        })
    }

    fn run_setup(&mut self, sql: &str) -> Result<()> {
        match executor::run(self, sql, Resubmit::Never)? {
            RawResult::Error(fields) => Err(query_error(&fields, sql)),
            _ => Ok(()),
        }
    }

    // ==================== Authentication ====================

    fn require_auth_value(&self, message: &'static str) -> Result<&str> {
        self.options
            .password
            .as_deref()
            .ok_or_else(|| auth_error(message))
    }

    fn handle_auth(&mut self) -> Result<()> {
        loop {
            let msg = self.receive_message()?;

            match msg {
                BackendMessage::AuthenticationOk => {
                    tracing::debug!("authenticated");
                    return Ok(());
                }
                BackendMessage::AuthenticationCleartextPassword => {
                    let auth_value =
                        self.require_auth_value("Authentication value required but not provided")?;
                    self.send_message(&FrontendMessage::PasswordMessage(auth_value.to_string()))?;
                }
                BackendMessage::AuthenticationMD5Password(salt) => {
                    let auth_value =
                        self.require_auth_value("Authentication value required but not provided")?;
                    let hash = md5_password(&self.options.user, auth_value, salt);
                    self.send_message(&FrontendMessage::PasswordMessage(hash))?;
                }
                BackendMessage::AuthenticationSASL(mechanisms) => {
                    if mechanisms.iter().any(|m| m == "SCRAM-SHA-256") {
                        self.scram_auth()?;
                    } else {
                        return Err(auth_error(format!(
                            "Unsupported SASL mechanisms: {:?}",
                            mechanisms
                        )));
                    }
                }
                BackendMessage::ErrorResponse(e) => {
                    self.state = ConnectionState::Error;
                    return Err(error_from_fields(&e));
                }
                other => {
                    return Err(protocol_error(format!(
                        "Unexpected message during auth: {}",
                        other.name()
                    )));
                }
            }
        }
    }

    fn scram_auth(&mut self) -> Result<()> {
        let auth_value =
            self.require_auth_value("Authentication value required for SCRAM-SHA-256")?;

        let mut client = ScramClient::new(&self.options.user, auth_value);

        let client_first = client.client_first();
        self.send_message(&FrontendMessage::SASLInitialResponse {
            mechanism: "SCRAM-SHA-256".to_string(),
            data: client_first,
        })?;

        let server_first_data = match self.receive_message()? {
            BackendMessage::AuthenticationSASLContinue(data) => data,
            BackendMessage::ErrorResponse(e) => {
                self.state = ConnectionState::Error;
                return Err(error_from_fields(&e));
            }
            other => {
                return Err(protocol_error(format!(
                    "Expected SASL continue, got: {}",
                    other.name()
                )));
            }
        };

        let client_final = client.process_server_first(&server_first_data)?;
        self.send_message(&FrontendMessage::SASLResponse(client_final))?;

        let server_final_data = match self.receive_message()? {
            BackendMessage::AuthenticationSASLFinal(data) => data,
            BackendMessage::ErrorResponse(e) => {
                self.state = ConnectionState::Error;
                return Err(error_from_fields(&e));
            }
            other => {
                return Err(protocol_error(format!(
                    "Expected SASL final, got: {}",
                    other.name()
                )));
            }
        };

        client.verify_server_final(&server_final_data)?;

        match self.receive_message()? {
            BackendMessage::AuthenticationOk => Ok(()),
            BackendMessage::ErrorResponse(e) => {
                self.state = ConnectionState::Error;
                Err(error_from_fields(&e))
            }
            other => Err(protocol_error(format!(
                "Expected AuthenticationOk, got: {}",
                other.name()
            ))),
        }
    }

    fn read_startup_messages(&mut self) -> Result<()> {
        loop {
            match self.receive_message()? {
                BackendMessage::BackendKeyData {
                    process_id,
                    secret_key,
                } => {
                    self.process_id = process_id;
                    self.secret_key = secret_key;
                }
                BackendMessage::ParameterStatus { name, value } => {
                    self.parameters.insert(name, value);
                }
                BackendMessage::ReadyForQuery(status) => {
                    self.state = ConnectionState::Ready(status.into());
                    return Ok(());
                }
                BackendMessage::ErrorResponse(e) => {
                    self.state = ConnectionState::Error;
                    return Err(error_from_fields(&e));
                }
                BackendMessage::NoticeResponse(notice) => {
                    tracing::debug!(message = %notice.message, "startup notice");
                }
                other => {
                    return Err(protocol_error(format!(
                        "Unexpected startup message: {}",
                        other.name()
                    )));
                }
            }
        }
    }

    // ==================== Low-Level I/O ====================

    pub(crate) fn send_message(&mut self, msg: &FrontendMessage) -> Result<()> {
        let data = self.writer.write(msg);
        let Some(stream) = self.stream.as_mut() else {
            return Err(closed_error());
        };
        let result = stream.write_all(data).and_then(|()| stream.flush());
        if let Err(e) = result {
            self.state = ConnectionState::Error;
            return Err(Error::Io(e));
        }
        Ok(())
    }

    /// Read the next backend message, blocking for more bytes as needed.
    pub(crate) fn receive_message(&mut self) -> Result<BackendMessage> {
        loop {
            match self.reader.next_message() {
                Ok(Some(msg)) => return Ok(msg),
                Ok(None) => {
                    let Some(stream) = self.stream.as_mut() else {
                        return Err(closed_error());
                    };
                    let n = match stream.read(&mut self.read_buf) {
                        Ok(n) => n,
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            self.state = ConnectionState::Error;
                            let timed_out = matches!(
                                e.kind(),
                                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                            );
                            let message = if timed_out {
                                "Timed out waiting for the server".to_string()
                            } else {
                                format!("Failed to read from server: {}", e)
                            };
                            return Err(Error::Connection(ConnectionError {
                                kind: ConnectionErrorKind::Disconnected,
                                message,
                                source: Some(Box::new(e)),
                            }));
                        }
                    };

                    if n == 0 {
                        self.state = ConnectionState::Error;
                        return Err(disconnected_error());
                    }

                    self.reader.feed(&self.read_buf[..n]);
                }
                Err(e) => {
                    self.state = ConnectionState::Error;
                    return Err(Error::Protocol(e));
                }
            }
        }
    }

    /// Read whatever is available without blocking and buffer it.
    ///
    /// Returns the number of bytes consumed.
    pub(crate) fn consume_input(&mut self) -> Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(closed_error());
        };
        stream.set_nonblocking(true)?;

        let mut total = 0;
        let outcome = loop {
            match stream.read(&mut self.read_buf) {
                Ok(0) => break Err(disconnected_error()),
                Ok(n) => {
                    self.reader.feed(&self.read_buf[..n]);
                    total += n;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break Ok(total),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    break Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Disconnected,
                        message: format!("Failed to read from server: {}", e),
                        source: Some(Box::new(e)),
                    }));
                }
            }
        };

        let restored = stream.set_nonblocking(false);
        if outcome.is_err() {
            self.state = ConnectionState::Error;
        }
        let total = outcome?;
        restored?;
        Ok(total)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ==================== Helper Functions ====================

fn connect_tcp(options: &ConnectionOptions) -> Result<TcpStream> {
    let addr = options.socket_addr();
    let addrs = addr.to_socket_addrs().map_err(|e| {
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Connect,
            message: format!("Could not resolve {}: {}", addr, e),
            source: Some(Box::new(e)),
        })
    })?;

    let mut last_error = None;
    for candidate in addrs {
        match TcpStream::connect_timeout(&candidate, options.connect_timeout) {
            Ok(stream) => {
                tracing::debug!(addr = %candidate, "tcp connected");
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) => {
            let kind = if e.kind() == std::io::ErrorKind::ConnectionRefused {
                ConnectionErrorKind::Refused
            } else {
                ConnectionErrorKind::Connect
            };
            Error::Connection(ConnectionError {
                kind,
                message: format!("Failed to connect to {}: {}", addr, e),
                source: Some(Box::new(e)),
            })
        }
        None => Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Connect,
            message: format!("No addresses found for {}", addr),
            source: None,
        }),
    })
}

fn setup_error(kind: ConnectionErrorKind, message: String, cause: Error) -> Error {
    Error::Connection(ConnectionError {
        kind,
        message,
        source: Some(Box::new(cause)),
    })
}

fn auth_error(msg: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Authentication,
        message: msg.into(),
        source: None,
    })
}

fn closed_error() -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Closed,
        message: "connection is closed".to_string(),
        source: None,
    })
}

fn disconnected_error() -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Disconnected,
        message: "Connection closed by server".to_string(),
        source: None,
    })
}

pub(crate) fn protocol_error(msg: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.into(),
        raw_data: None,
        source: None,
    })
}

/// Query error kind for a SQLSTATE code.
pub(crate) fn classify_sqlstate(code: &str) -> QueryErrorKind {
    match code.get(..2) {
        Some("42") if code == "42501" => QueryErrorKind::Permission,
        Some("42") => QueryErrorKind::Syntax,
        Some("23") => QueryErrorKind::Constraint,
        Some("40") if code == "40001" => QueryErrorKind::Serialization,
        Some("40") => QueryErrorKind::Deadlock,
        Some("57") if code == "57014" => QueryErrorKind::Cancelled,
        Some("57") => QueryErrorKind::Timeout,
        _ => QueryErrorKind::Database,
    }
}

/// Error raised by a statement, carrying its text.
pub(crate) fn query_error(fields: &ErrorFields, sql: &str) -> Error {
    Error::Query(QueryError {
        kind: classify_sqlstate(&fields.code),
        sql: Some(sql.to_string()),
        sqlstate: Some(fields.code.clone()),
        message: fields.message.clone(),
        detail: fields.detail.clone(),
        hint: fields.hint.clone(),
        position: fields.position.and_then(|p| usize::try_from(p).ok()),
        source: None,
    })
}

/// Error raised during the handshake.
fn error_from_fields(fields: &ErrorFields) -> Error {
    let kind = match fields.code.get(..2) {
        Some("08") => ConnectionErrorKind::Connect,
        Some("28") => ConnectionErrorKind::Authentication,
        _ => ConnectionErrorKind::Connect,
    };
    Error::Connection(ConnectionError {
        kind,
        message: fields.message.clone(),
        source: None,
    })
}
