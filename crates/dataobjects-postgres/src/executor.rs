//! Statement submission and result collection.
//!
//! A statement is sent with the simple query protocol and read back up to
//! `ReadyForQuery`, either by blocking on the socket or by a readiness-driven
//! state machine that never blocks longer than the poll interval.

// The Error type is intentionally large to provide rich error context.
#![allow(clippy::result_large_err)]

use std::time::{Duration, Instant};

use dataobjects_core::{
    ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind, Result,
};

use crate::config::ExecutionStrategy;
use crate::connection::{Connection, ConnectionState, protocol_error};
use crate::protocol::{BackendMessage, ErrorFields, FieldDescription, FrontendMessage};

/// Raw field values of one row, `None` for SQL NULL.
pub(crate) type RawRow = Vec<Option<Vec<u8>>>;

/// Whether a failed send may reset the transport and try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resubmit {
    Once,
    Never,
}

/// Server-side outcome of one statement, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawResult {
    Tuples {
        fields: Vec<FieldDescription>,
        rows: Vec<RawRow>,
        command_tag: Option<String>,
    },
    CommandOk {
        command_tag: String,
    },
    Empty,
    Error(ErrorFields),
}

/// Progress of a non-blocking submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollState {
    Sent,
    WaitingForReadable,
    ConsumingInput,
    Done,
}

/// Folds backend messages into results until `ReadyForQuery`.
///
/// With several statements in one query string the first error wins,
/// otherwise the last result is kept.
#[derive(Debug, Default)]
pub(crate) struct ResultCollector {
    fields: Option<Vec<FieldDescription>>,
    rows: Vec<RawRow>,
    last: Option<RawResult>,
    error: Option<ErrorFields>,
    done: bool,
}

impl ResultCollector {
    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn accept(&mut self, msg: BackendMessage) -> Result<()> {
        match msg {
            BackendMessage::RowDescription(desc) => {
                self.fields = Some(desc);
                self.rows.clear();
            }
            BackendMessage::DataRow(values) => {
                let Some(fields) = &self.fields else {
                    return Err(protocol_error("DataRow received before RowDescription"));
                };
                if values.len() != fields.len() {
                    return Err(protocol_error("DataRow field count mismatch"));
                }
                self.rows.push(values);
            }
            BackendMessage::CommandComplete(tag) => {
                self.last = Some(match self.fields.take() {
                    Some(fields) => RawResult::Tuples {
                        fields,
                        rows: std::mem::take(&mut self.rows),
                        command_tag: Some(tag),
                    },
                    None => RawResult::CommandOk { command_tag: tag },
                });
            }
            BackendMessage::EmptyQueryResponse => {
                self.last = Some(RawResult::Empty);
            }
            BackendMessage::ErrorResponse(fields) => {
                // Partial rows of the failed statement are dropped
                self.fields = None;
                self.rows.clear();
                if self.error.is_none() {
                    self.error = Some(fields);
                }
            }
            BackendMessage::ReadyForQuery(_) => {
                self.done = true;
            }
            BackendMessage::CopyInResponse | BackendMessage::CopyOutResponse => {
                return Err(protocol_error("COPY is not supported"));
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> RawResult {
        if let Some(fields) = self.error {
            return RawResult::Error(fields);
        }
        self.last.unwrap_or(RawResult::Empty)
    }
}

/// Run one query string and collect its result.
///
/// The logger is told about every statement that reached the server.
pub(crate) fn run(conn: &mut Connection, sql: &str, resubmit: Resubmit) -> Result<RawResult> {
    conn.ensure_open()?;
    drain_pending(conn);

    let started = Instant::now();
    submit(conn, sql, resubmit)?;
    let outcome = match conn.options.strategy {
        ExecutionStrategy::Blocking => read_blocking(conn),
        ExecutionStrategy::NonBlocking => read_nonblocking(conn),
    };
    conn.logger.log(sql, started.elapsed());
    outcome.map_err(|e| match e {
        Error::Connection(_) | Error::Io(_) => {
            query_transport_error(sql, "Lost connection while reading results", e)
        }
        other => other,
    })
}

/// Discard results left over from an interrupted command.
fn drain_pending(conn: &mut Connection) {
    if conn.state != ConnectionState::InQuery {
        return;
    }
    tracing::warn!("discarding pending results of an interrupted command");

    loop {
        match conn.receive_message() {
            Ok(BackendMessage::ReadyForQuery(status)) => {
                conn.state = ConnectionState::Ready(status.into());
                return;
            }
            Ok(BackendMessage::ParameterStatus { name, value }) => {
                conn.parameters.insert(name, value);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "could not drain pending results");
                conn.state = ConnectionState::Error;
                return;
            }
        }
    }
}

fn submit(conn: &mut Connection, sql: &str, resubmit: Resubmit) -> Result<()> {
    // A lost transport or an earlier failed reset leaves no stream behind
    let first = if conn.state == ConnectionState::Error || conn.stream.is_none() {
        Err(Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Disconnected,
            message: "connection is in a bad state".to_string(),
            source: None,
        }))
    } else {
        send_query(conn, sql)
    };

    let Err(cause) = first else {
        return Ok(());
    };
    if resubmit == Resubmit::Never {
        return Err(transport_error(sql, cause));
    }

    tracing::warn!(error = %cause, "query could not be sent, resetting connection");
    if let Err(e) = conn.reset() {
        return Err(transport_error(sql, e));
    }
    send_query(conn, sql).map_err(|e| transport_error(sql, e))
}

fn send_query(conn: &mut Connection, sql: &str) -> Result<()> {
    conn.send_message(&FrontendMessage::Query(sql.to_string()))?;
    conn.state = ConnectionState::InQuery;
    Ok(())
}

/// Route a message to the connection or the collector.
fn dispatch(conn: &mut Connection, collector: &mut ResultCollector, msg: BackendMessage) -> Result<()> {
    match msg {
        BackendMessage::ParameterStatus { name, value } => {
            tracing::debug!(name = %name, value = %value, "parameter status");
            conn.parameters.insert(name, value);
            Ok(())
        }
        BackendMessage::NoticeResponse(notice) => {
            tracing::debug!(severity = %notice.severity, message = %notice.message, "server notice");
            Ok(())
        }
        BackendMessage::NotificationResponse { channel, .. } => {
            tracing::debug!(channel = %channel, "notification ignored");
            Ok(())
        }
        BackendMessage::ReadyForQuery(status) => {
            conn.state = ConnectionState::Ready(status.into());
            collector.accept(BackendMessage::ReadyForQuery(status))
        }
        other => collector.accept(other).inspect_err(|_| {
            conn.state = ConnectionState::Error;
        }),
    }
}

fn read_blocking(conn: &mut Connection) -> Result<RawResult> {
    let mut collector = ResultCollector::default();
    while !collector.is_done() {
        let msg = conn.receive_message()?;
        dispatch(conn, &mut collector, msg)?;
    }
    Ok(collector.finish())
}

fn read_nonblocking(conn: &mut Connection) -> Result<RawResult> {
    let interval = conn.options.poll_interval;
    let mut collector = ResultCollector::default();
    let mut state = PollState::Sent;

    loop {
        state = match state {
            PollState::Sent => PollState::WaitingForReadable,
            PollState::WaitingForReadable => {
                if wait_readable(conn, interval)? {
                    PollState::ConsumingInput
                } else {
                    PollState::WaitingForReadable
                }
            }
            PollState::ConsumingInput => {
                conn.consume_input()?;
                while !collector.is_done() {
                    let next = conn.reader.next_message().map_err(|e| {
                        conn.state = ConnectionState::Error;
                        Error::Protocol(e)
                    })?;
                    let Some(msg) = next else {
                        break;
                    };
                    dispatch(conn, &mut collector, msg)?;
                }
                if collector.is_done() {
                    PollState::Done
                } else {
                    PollState::WaitingForReadable
                }
            }
            PollState::Done => return Ok(collector.finish()),
        };
        tracing::trace!(?state, "poll state");
    }
}

/// Block until the socket is readable or `interval` passes.
fn wait_readable(conn: &mut Connection, interval: Duration) -> Result<bool> {
    let stream = conn.stream_mut()?;
    stream.set_read_timeout(Some(interval))?;
    let mut probe = [0u8; 1];
    let ready = stream.peek(&mut probe);
    stream.set_read_timeout(None)?;

    match ready {
        // EOF counts as readable; consuming input reports the disconnect
        Ok(_) => Ok(true),
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ) =>
        {
            Ok(false)
        }
        Err(e) => {
            conn.state = ConnectionState::Error;
            Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Disconnected,
                message: format!("Waiting for the server failed: {}", e),
                source: Some(Box::new(e)),
            }))
        }
    }
}

fn transport_error(sql: &str, cause: Error) -> Error {
    query_transport_error(sql, "Could not send query", cause)
}

fn query_transport_error(sql: &str, context: &str, cause: Error) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Transport,
        sql: Some(sql.to_string()),
        sqlstate: None,
        message: format!("{}: {}", context, cause),
        detail: None,
        hint: None,
        position: None,
        source: Some(Box::new(cause)),
    })
}

/// Row count from a command tag such as `INSERT 0 5` or `SELECT 3`.
pub(crate) fn parse_rows_affected(tag: Option<&str>) -> Option<u64> {
    let tag = tag?;
    let mut parts = tag.split_whitespace().collect::<Vec<_>>();
    parts.pop().and_then(|last| last.parse::<u64>().ok())
}

/// First column of the first row, when it reads as an integer.
pub(crate) fn first_integer(rows: &[RawRow]) -> Option<i64> {
    let raw = rows.first()?.first()?.as_deref()?;
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}
