//! End-to-end tests against a scripted in-process PostgreSQL server.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dataobjects_core::{
    ArgumentError, ArgumentErrorKind, ConnectionError, ConnectionErrorKind, Error, QueryErrorKind,
    TypeTag, Value,
};
use dataobjects_postgres::auth::md5_password;
use dataobjects_postgres::types::oid;
use dataobjects_postgres::{
    CommandOutcome, Connection, ConnectionOptions, ConnectionState, ExecutionStrategy,
};

// ==================== Mock server ====================

enum Reply {
    Send(Vec<u8>),
    Hangup,
}

struct MockConfig {
    connections: usize,
    md5_password: Option<&'static str>,
    standard_conforming_strings: &'static str,
    /// Pause before and in the middle of every query reply
    reply_delay: Option<Duration>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            connections: 1,
            md5_password: None,
            standard_conforming_strings: "on",
            reply_delay: None,
        }
    }
}

struct MockServer {
    port: u16,
    handle: JoinHandle<Vec<String>>,
}

impl MockServer {
    fn start<F>(config: MockConfig, handler: F) -> Self
    where
        F: FnMut(&str) -> Reply + Send + 'static,
    {
        Self::start_on(0, config, handler)
    }

    fn start_on<F>(port: u16, config: MockConfig, mut handler: F) -> Self
    where
        F: FnMut(&str) -> Reply + Send + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let mut log = Vec::new();
            for _ in 0..config.connections {
                let Ok((mut stream, _)) = listener.accept() else {
                    break;
                };
                serve(&mut stream, &config, &mut handler, &mut log);
            }
            log
        });
        Self { port, handle }
    }

    /// Every query string received, across all connections.
    fn queries(self) -> Vec<String> {
        self.handle.join().unwrap()
    }
}

fn serve<F>(stream: &mut TcpStream, config: &MockConfig, handler: &mut F, log: &mut Vec<String>)
where
    F: FnMut(&str) -> Reply,
{
    let Some(startup_len) = read_i32(stream) else {
        return;
    };
    let mut startup = vec![0u8; usize::try_from(startup_len - 4).unwrap()];
    if stream.read_exact(&mut startup).is_err() {
        return;
    }
    let user = startup_param(&startup[4..], "user").unwrap_or_default();

    if let Some(password) = config.md5_password {
        let salt = *b"s4lt";
        let mut body = 5_i32.to_be_bytes().to_vec();
        body.extend_from_slice(&salt);
        stream.write_all(&message(b'R', &body)).unwrap();

        let Some((b'p', body)) = read_message(stream) else {
            return;
        };
        let sent = String::from_utf8_lossy(&body[..body.len() - 1]).to_string();
        if sent != md5_password(&user, password, salt) {
            let reply = error_fields("FATAL", "28P01", "password authentication failed");
            stream.write_all(&message(b'E', &reply)).unwrap();
            return;
        }
    }

    let mut reply = message(b'R', &0_i32.to_be_bytes());
    reply.extend(parameter_status("server_version", "16.2 (Mock)"));
    reply.extend(parameter_status("client_encoding", "UTF8"));
    reply.extend(parameter_status(
        "standard_conforming_strings",
        config.standard_conforming_strings,
    ));
    let mut key = 4242_i32.to_be_bytes().to_vec();
    key.extend_from_slice(&99_i32.to_be_bytes());
    reply.extend(message(b'K', &key));
    reply.extend(ready());
    stream.write_all(&reply).unwrap();

    while let Some((kind, body)) = read_message(stream) {
        match kind {
            b'Q' => {
                let query = String::from_utf8_lossy(&body[..body.len() - 1]).to_string();
                log.push(query.clone());
                match handler(&query) {
                    Reply::Send(bytes) => send_reply(stream, &bytes, config.reply_delay),
                    Reply::Hangup => return,
                }
            }
            b'X' => return,
            other => panic!("unexpected frontend message {}", other as char),
        }
    }
}

fn send_reply(stream: &mut TcpStream, bytes: &[u8], delay: Option<Duration>) {
    let Some(delay) = delay else {
        stream.write_all(bytes).unwrap();
        return;
    };
    let (head, tail) = bytes.split_at(bytes.len() / 2);
    thread::sleep(delay);
    stream.write_all(head).unwrap();
    stream.flush().unwrap();
    thread::sleep(delay);
    stream.write_all(tail).unwrap();
}

fn read_i32(stream: &mut TcpStream) -> Option<i32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).ok()?;
    Some(i32::from_be_bytes(buf))
}

fn read_message(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut kind = [0u8; 1];
    stream.read_exact(&mut kind).ok()?;
    let len = read_i32(stream)?;
    let mut body = vec![0u8; usize::try_from(len - 4).ok()?];
    stream.read_exact(&mut body).ok()?;
    Some((kind[0], body))
}

fn startup_param(mut params: &[u8], name: &str) -> Option<String> {
    while let Some(end) = params.iter().position(|b| *b == 0) {
        if end == 0 {
            return None;
        }
        let key = &params[..end];
        params = &params[end + 1..];
        let value_end = params.iter().position(|b| *b == 0)?;
        if key == name.as_bytes() {
            return Some(String::from_utf8_lossy(&params[..value_end]).to_string());
        }
        params = &params[value_end + 1..];
    }
    None
}

// ==================== Backend message builders ====================

fn message(kind: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![kind];
    out.extend_from_slice(&i32::try_from(body.len() + 4).unwrap().to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

fn parameter_status(name: &str, value: &str) -> Vec<u8> {
    let mut body = Vec::new();
    cstr(&mut body, name);
    cstr(&mut body, value);
    message(b'S', &body)
}

fn ready() -> Vec<u8> {
    message(b'Z', b"I")
}

fn command_complete(tag: &str) -> Vec<u8> {
    let mut body = Vec::new();
    cstr(&mut body, tag);
    message(b'C', &body)
}

fn error_fields(severity: &str, code: &str, text: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(b'S');
    cstr(&mut body, severity);
    body.push(b'C');
    cstr(&mut body, code);
    body.push(b'M');
    cstr(&mut body, text);
    body.push(0);
    body
}

/// A non-null field value.
fn text(value: &'static str) -> Option<&'static [u8]> {
    Some(value.as_bytes())
}

/// A statement that completed without rows.
fn ok(tag: &str) -> Reply {
    let mut out = command_complete(tag);
    out.extend(ready());
    Reply::Send(out)
}

/// A statement that failed.
fn fail(code: &str, text: &str) -> Reply {
    let mut out = message(b'E', &error_fields("ERROR", code, text));
    out.extend(ready());
    Reply::Send(out)
}

/// A statement that returned rows.
fn rows(fields: &[(&str, u32)], data: &[&[Option<&[u8]>]], tag: &str) -> Reply {
    let mut desc = i16::try_from(fields.len()).unwrap().to_be_bytes().to_vec();
    for (name, type_oid) in fields {
        cstr(&mut desc, name);
        desc.extend_from_slice(&0_i32.to_be_bytes());
        desc.extend_from_slice(&0_i16.to_be_bytes());
        desc.extend_from_slice(&type_oid.to_be_bytes());
        desc.extend_from_slice(&(-1_i16).to_be_bytes());
        desc.extend_from_slice(&(-1_i32).to_be_bytes());
        desc.extend_from_slice(&0_i16.to_be_bytes());
    }
    let mut out = message(b'T', &desc);

    for row in data {
        let mut body = i16::try_from(row.len()).unwrap().to_be_bytes().to_vec();
        for value in *row {
            match value {
                Some(bytes) => {
                    body.extend_from_slice(&i32::try_from(bytes.len()).unwrap().to_be_bytes());
                    body.extend_from_slice(bytes);
                }
                None => body.extend_from_slice(&(-1_i32).to_be_bytes()),
            }
        }
        out.extend(message(b'D', &body));
    }

    out.extend(command_complete(tag));
    out.extend(ready());
    Reply::Send(out)
}

/// Replies to the statements every session starts with.
fn session_setup(query: &str) -> Option<Reply> {
    if let Some(rest) = query.strip_prefix("SET client_encoding TO '") {
        let encoding = rest.trim_end_matches('\'').to_ascii_uppercase();
        let mut out = parameter_status("client_encoding", &encoding);
        out.extend(command_complete("SET"));
        out.extend(ready());
        return Some(Reply::Send(out));
    }
    if query.starts_with("SET ") || query.starts_with("set search_path") {
        return Some(ok("SET"));
    }
    None
}

fn options(port: u16) -> ConnectionOptions {
    ConnectionOptions::new("127.0.0.1", "tester", "app")
        .port(port)
        .connect_timeout(Duration::from_secs(5))
        .poll_interval(Duration::from_millis(20))
}

// ==================== Tests ====================

#[test]
fn open_applies_session_setup_in_order() {
    let server = MockServer::start(MockConfig::default(), |q| {
        session_setup(q).unwrap_or_else(|| fail("42601", "unexpected"))
    });

    let mut conn = Connection::open(options(server.port).search_path("public, audit")).unwrap();
    assert!(conn.is_open());
    assert!(matches!(conn.state(), ConnectionState::Ready(_)));
    assert_eq!(conn.server_version(), Some("16.2 (Mock)"));
    assert_eq!(conn.process_id(), 4242);
    assert_eq!(conn.character_set().as_deref(), Some("utf8"));
    assert!(conn.standard_conforming_strings());

    assert!(conn.dispose());
    assert!(!conn.dispose());
    assert!(!conn.is_open());
    assert_eq!(conn.character_set(), None);
    assert!(matches!(
        conn.quote_string("x"),
        Err(Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Closed,
            ..
        }))
    ));
    assert!(conn.create_command("SELECT 1").execute().is_err());

    assert_eq!(
        server.queries(),
        [
            "set search_path to public, audit;",
            "SET backslash_quote = off",
            "SET standard_conforming_strings = on",
            "SET client_min_messages = warning",
            "SET client_encoding TO 'utf8'",
        ]
    );
}

#[test]
fn md5_authentication() {
    let config = MockConfig {
        md5_password: Some("hunter2"),
        ..Default::default()
    };
    let server = MockServer::start(config, |q| session_setup(q).unwrap_or_else(|| ok("SELECT 0")));
    let conn = Connection::open(options(server.port).password("hunter2")).unwrap();
    assert!(conn.is_open());
}

#[test]
fn md5_authentication_failure_is_connection_error() {
    let config = MockConfig {
        md5_password: Some("hunter2"),
        ..Default::default()
    };
    let server = MockServer::start(config, |_| ok("SET"));
    let err = Connection::open(options(server.port).password("wrong")).unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Authentication,
            ..
        })
    ));
}

#[test]
fn missing_password_is_authentication_error() {
    let config = MockConfig {
        md5_password: Some("hunter2"),
        ..Default::default()
    };
    let server = MockServer::start(config, |_| ok("SET"));
    let err = Connection::open(options(server.port)).unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Authentication,
            ..
        })
    ));
}

#[test]
fn advisory_setup_failure_is_tolerated() {
    let config = MockConfig {
        standard_conforming_strings: "off",
        ..Default::default()
    };
    let server = MockServer::start(config, |q| {
        if q == "SET standard_conforming_strings = on" {
            return fail("55P02", "cannot change");
        }
        session_setup(q).unwrap_or_else(|| ok("SELECT 0"))
    });

    let conn = Connection::open(options(server.port).encoding("sjis")).unwrap();
    assert_eq!(conn.character_set().as_deref(), Some("sjis"));
    assert!(!conn.standard_conforming_strings());

    // Backslashes are doubled, but not the trail byte of a Shift_JIS character
    let quoted = conn.quote_string([b'a', b'\\', 0x95, 0x5c, b'\'']).unwrap();
    assert_eq!(
        quoted,
        vec![b'\'', b'a', b'\\', b'\\', 0x95, 0x5c, b'\'', b'\'', b'\'']
    );
    assert_eq!(conn.quote_byte_array([0xab_u8]).unwrap(), br"'\\xab'".to_vec());
}

#[test]
fn encoding_failure_is_fatal() {
    let server = MockServer::start(MockConfig::default(), |q| {
        if q.starts_with("SET client_encoding") {
            return fail("22023", "invalid value for parameter \"client_encoding\"");
        }
        ok("SET")
    });
    let err = Connection::open(options(server.port).charset("latin9")).unwrap_err();
    match err {
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Encoding,
            message,
            ..
        }) => assert_eq!(message, "Couldn't set encoding: latin9"),
        other => panic!("expected encoding error, got {other}"),
    }
}

#[test]
fn search_path_failure_is_fatal() {
    let server = MockServer::start(MockConfig::default(), |q| {
        if q.starts_with("set search_path") {
            return fail("3F000", "schema \"nope\" does not exist");
        }
        ok("SET")
    });
    let err = Connection::open(options(server.port).search_path("nope")).unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::SessionSetup,
            ..
        })
    ));
}

fn typed_select(strategy: ExecutionStrategy, reply_delay: Option<Duration>) {
    let config = MockConfig {
        reply_delay,
        ..Default::default()
    };
    let server = MockServer::start(config, |q| {
        if let Some(reply) = session_setup(q) {
            return reply;
        }
        rows(
            &[
                ("id", oid::INT4),
                ("name", oid::TEXT),
                ("price", oid::NUMERIC),
                ("active", oid::BOOL),
                ("born", oid::DATE),
                ("seen", oid::TIMESTAMPTZ),
                ("blob", oid::BYTEA),
                ("missing", oid::VARCHAR),
                ("ratio", oid::FLOAT8),
            ],
            &[&[
                text("42"),
                text("Zoë"),
                text("19.99"),
                text("t"),
                text("1990-05-17"),
                text("2024-03-01 10:15:30.25+05:30"),
                text("\\x0102"),
                None,
                text("0.5"),
            ]],
            "SELECT 1",
        )
    });

    let mut conn = Connection::open(options(server.port).strategy(strategy)).unwrap();
    let mut reader = conn
        .create_command("SELECT * FROM things")
        .execute_reader()
        .unwrap();

    assert_eq!(reader.field_count().unwrap(), 9);
    assert_eq!(reader.rows_affected().unwrap(), 1);
    assert!(reader.advance().unwrap());

    assert_eq!(reader.item(0).unwrap(), &Value::Integer(42));
    assert_eq!(reader.item(1).unwrap().as_str(), Some("Zoë"));
    assert_eq!(reader.item(2).unwrap().as_str(), Some("19.99"));
    assert_eq!(reader.item(3).unwrap(), &Value::Boolean(true));
    assert_eq!(reader.item(4).unwrap().to_string(), "1990-05-17");
    assert_eq!(
        reader.item(5).unwrap().to_string(),
        "2024-03-01 10:15:30.250000+05:30"
    );
    assert_eq!(reader.item(6).unwrap(), &Value::ByteArray(vec![1, 2]));
    assert!(reader.is_null(7).unwrap());
    assert_eq!(reader.item(8).unwrap(), &Value::Float(0.5));

    assert!(!reader.advance().unwrap());
    assert!(!reader.advance().unwrap());
    assert!(reader.close());
    assert!(!reader.close());
}

#[test]
fn select_blocking() {
    typed_select(ExecutionStrategy::Blocking, None);
}

#[test]
fn select_non_blocking() {
    typed_select(ExecutionStrategy::NonBlocking, None);
}

#[test]
fn select_non_blocking_with_slow_server() {
    // Replies arrive in two halves, each after several poll intervals
    typed_select(
        ExecutionStrategy::NonBlocking,
        Some(Duration::from_millis(120)),
    );
}

#[test]
fn insert_returning_exposes_generated_id() {
    let server = MockServer::start(MockConfig::default(), |q| {
        session_setup(q).unwrap_or_else(|| rows(&[("id", oid::INT8)], &[&[text("42")]], "INSERT 0 1"))
    });
    let mut conn = Connection::open(options(server.port)).unwrap();

    let mut cmd = conn.create_command("INSERT INTO t (v) VALUES ('a') RETURNING id");
    match cmd.execute().unwrap() {
        CommandOutcome::Rows { reader } => {
            assert_eq!(reader.generated_id().unwrap(), Some(42));
            assert_eq!(reader.rows_affected().unwrap(), 1);
        }
        other => panic!("expected rows, got {other:?}"),
    }

    let result = cmd.execute_non_query().unwrap();
    assert_eq!(result.rows_affected, 1);
    assert_eq!(result.insert_id, Some(42));
}

#[test]
fn command_ok_is_non_query() {
    let server = MockServer::start(MockConfig::default(), |q| {
        session_setup(q).unwrap_or_else(|| ok("UPDATE 3"))
    });
    let mut conn = Connection::open(options(server.port)).unwrap();

    let outcome = conn
        .create_command("UPDATE t SET v = 1")
        .execute()
        .unwrap();
    assert!(matches!(
        outcome,
        CommandOutcome::NonQuery {
            rows_affected: 3,
            generated_id: None
        }
    ));

    let err = conn
        .create_command("UPDATE t SET v = 2")
        .execute_reader()
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Query(ref q) if q.kind == QueryErrorKind::UnexpectedResult
    ));
}

#[test]
fn server_error_carries_sqlstate_and_sql() {
    let server = MockServer::start(MockConfig::default(), |q| {
        session_setup(q)
            .unwrap_or_else(|| fail("42P01", "relation \"missing\" does not exist"))
    });
    let mut conn = Connection::open(options(server.port)).unwrap();

    let err = conn
        .create_command("SELECT * FROM missing")
        .execute()
        .unwrap_err();
    assert_eq!(err.sqlstate(), Some("42P01"));
    assert_eq!(err.sql(), Some("SELECT * FROM missing"));
    assert!(matches!(err, Error::Query(ref q) if q.kind == QueryErrorKind::Syntax));

    // The session is still usable after a statement error
    assert!(matches!(conn.state(), ConnectionState::Ready(_)));
}

#[test]
fn declared_field_types() {
    let server = MockServer::start(MockConfig::default(), |q| {
        session_setup(q).unwrap_or_else(|| {
            rows(
                &[("a", oid::TEXT), ("b", oid::TEXT), ("c", oid::TEXT)],
                &[&[text("7"), text("2024-01-02"), text("1.25")]],
                "SELECT 1",
            )
        })
    });
    let mut conn = Connection::open(options(server.port)).unwrap();

    let mut cmd = conn.create_command("SELECT a, b, c FROM t");
    cmd.set_field_types(vec![
        dataobjects_core::FieldTypeDecl::from(TypeTag::Integer),
        vec![TypeTag::Date, TypeTag::Decimal].into(),
    ])
    .unwrap();
    let mut reader = cmd.execute_reader().unwrap();
    assert!(reader.advance().unwrap());
    assert_eq!(reader.item(0).unwrap(), &Value::Integer(7));
    assert_eq!(reader.item(1).unwrap().to_string(), "2024-01-02");
    assert_eq!(reader.item(2).unwrap().as_str(), Some("1.25"));

    let err = cmd.set_field_types(["Integer", "Sandwich"]).unwrap_err();
    assert!(matches!(
        err,
        Error::Argument(ArgumentError {
            kind: ArgumentErrorKind::InvalidFieldType { .. },
            ..
        })
    ));
}

#[test]
fn field_count_mismatch() {
    let server = MockServer::start(MockConfig::default(), |q| {
        session_setup(q).unwrap_or_else(|| {
            rows(
                &[("a", oid::INT4), ("b", oid::INT4)],
                &[&[text("1"), text("2")]],
                "SELECT 1",
            )
        })
    });
    let mut conn = Connection::open(options(server.port)).unwrap();

    let mut cmd = conn.create_command("SELECT 1, 2");
    cmd.set_field_types([TypeTag::Integer]).unwrap();
    let err = cmd.execute().unwrap_err();
    assert!(matches!(
        err,
        Error::Argument(ArgumentError {
            kind: ArgumentErrorKind::FieldCountMismatch {
                expected: 1,
                actual: 2
            },
            ..
        })
    ));
}

#[test]
fn logger_sees_every_statement() {
    let server = MockServer::start(MockConfig::default(), |q| {
        session_setup(q).unwrap_or_else(|| ok("DELETE 0"))
    });
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let logger = move |query: &str, _elapsed: Duration| {
        sink.lock().unwrap().push(query.to_string());
    };

    let mut conn = Connection::open_with_logger(options(server.port), Arc::new(logger)).unwrap();
    conn.create_command("DELETE FROM t").execute_non_query().unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    assert_eq!(seen.last().map(String::as_str), Some("DELETE FROM t"));
}

fn reconnect_after_hangup(strategy: ExecutionStrategy) {
    let config = MockConfig {
        connections: 2,
        ..Default::default()
    };
    let mut hung_up = false;
    let server = MockServer::start(config, move |q| {
        if let Some(reply) = session_setup(q) {
            return reply;
        }
        if !hung_up {
            hung_up = true;
            return Reply::Hangup;
        }
        ok("UPDATE 1")
    });

    let mut conn = Connection::open(options(server.port).strategy(strategy)).unwrap();
    let err = conn.create_command("UPDATE t SET v = 1").execute().unwrap_err();
    assert!(err.is_connection_error(), "{err}");
    assert_eq!(err.sql(), Some("UPDATE t SET v = 1"));
    assert!(matches!(&err, Error::Query(q) if q.kind == QueryErrorKind::Transport));
    assert_eq!(conn.state(), ConnectionState::Error);

    // The broken transport is reset once and the statement resent
    let result = conn
        .create_command("UPDATE t SET v = 2")
        .execute_non_query()
        .unwrap();
    assert_eq!(result.rows_affected, 1);
    assert!(conn.dispose());

    let queries = server.queries();
    let setups = queries
        .iter()
        .filter(|q| q.as_str() == "SET client_min_messages = warning")
        .count();
    assert_eq!(setups, 2);
    assert_eq!(queries.last().map(String::as_str), Some("UPDATE t SET v = 2"));
}

#[test]
fn reconnect_after_hangup_blocking() {
    reconnect_after_hangup(ExecutionStrategy::Blocking);
}

#[test]
fn reconnect_after_hangup_non_blocking() {
    reconnect_after_hangup(ExecutionStrategy::NonBlocking);
}

#[test]
fn failed_reset_is_transport_error() {
    let server = MockServer::start(MockConfig::default(), |q| {
        session_setup(q).unwrap_or(Reply::Hangup)
    });

    let mut conn = Connection::open(options(server.port)).unwrap();
    assert!(conn.create_command("SELECT 1").execute().is_err());
    // The listener only accepted one session, so the reset cannot connect
    drop(server.queries());

    // Every later command tries the reset again rather than giving up
    for sql in ["SELECT 2", "SELECT 3"] {
        let err = conn.create_command(sql).execute().unwrap_err();
        match err {
            Error::Query(q) => {
                assert_eq!(q.kind, QueryErrorKind::Transport);
                assert_eq!(q.sql.as_deref(), Some(sql));
            }
            other => panic!("expected transport error, got {other}"),
        }
        assert_eq!(conn.state(), ConnectionState::Error);
    }

    // Not disposed: the last known session parameters are still there
    assert!(conn.is_open());
    assert_eq!(conn.character_set().as_deref(), Some("utf8"));
    assert!(conn.quote_string("x").is_ok());
    assert!(conn.dispose());
    assert!(!conn.dispose());
}

#[cfg(unix)]
#[test]
fn reconnects_once_the_server_is_back() {
    let server = MockServer::start(MockConfig::default(), |q| {
        session_setup(q).unwrap_or(Reply::Hangup)
    });
    let port = server.port;

    let mut conn = Connection::open(options(port)).unwrap();
    assert!(conn.create_command("SELECT 1").execute().is_err());
    drop(server.queries());
    assert!(conn.create_command("SELECT 2").execute().is_err());

    let server = MockServer::start_on(port, MockConfig::default(), |q| {
        session_setup(q).unwrap_or_else(|| rows(&[("n", oid::INT4)], &[&[text("3")]], "SELECT 1"))
    });
    let mut reader = conn.create_command("SELECT 3").execute_reader().unwrap();
    assert!(reader.advance().unwrap());
    assert_eq!(reader.item(0).unwrap(), &Value::Integer(3));
    assert!(matches!(conn.state(), ConnectionState::Ready(_)));
    assert!(conn.dispose());

    assert_eq!(server.queries().last().map(String::as_str), Some("SELECT 3"));
}
