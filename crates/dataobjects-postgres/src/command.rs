//! Commands: a SQL string bound to a connection.
//!
//! The SQL is sent as-is. Callers interpolate and quote values beforehand
//! with `Connection::quote_string` and `Connection::quote_byte_array`.

// The Error type is intentionally large to provide rich error context.
#![allow(clippy::result_large_err)]

use dataobjects_core::{
    Error, FieldTypeDecl, QueryError, QueryErrorKind, Result, TypeTag, resolve_field_types,
};

use crate::connection::{Connection, query_error};
use crate::executor::{self, RawResult, Resubmit, first_integer, parse_rows_affected};
use crate::reader::ResultReader;

/// What a statement produced.
#[derive(Debug)]
pub enum CommandOutcome {
    /// The statement completed without a result set.
    NonQuery {
        rows_affected: u64,
        generated_id: Option<i64>,
    },
    /// The statement returned rows.
    Rows { reader: ResultReader },
}

/// Summary of a statement run for its side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// First column of the first returned row, for `INSERT ... RETURNING id`
    pub insert_id: Option<i64>,
}

/// A SQL string ready to run on its connection.
#[derive(Debug)]
pub struct Command<'c> {
    connection: &'c mut Connection,
    text: String,
    field_types: Option<Vec<TypeTag>>,
}

impl<'c> Command<'c> {
    pub(crate) fn new(connection: &'c mut Connection, text: String) -> Self {
        Self {
            connection,
            text,
            field_types: None,
        }
    }

    /// The SQL this command runs.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Declare the tag of each result field, overriding type inference.
    ///
    /// One level of grouping is flattened, so `[Integer, [Text, Date]]`
    /// declares three fields. Applies to every later execution.
    pub fn set_field_types<I>(&mut self, decls: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<FieldTypeDecl>,
    {
        let tags = resolve_field_types(decls)?;
        self.field_types = Some(tags);
        Ok(())
    }

    /// Run the statement.
    pub fn execute(&mut self) -> Result<CommandOutcome> {
        match self.run()? {
            RawResult::Tuples {
                fields,
                rows,
                command_tag,
            } => {
                let mut reader = ResultReader::new(fields, rows, command_tag.as_deref());
                if let Some(tags) = &self.field_types {
                    if let Err(e) = reader.override_types(tags) {
                        reader.close();
                        return Err(e);
                    }
                }
                Ok(CommandOutcome::Rows { reader })
            }
            RawResult::CommandOk { command_tag } => Ok(CommandOutcome::NonQuery {
                rows_affected: parse_rows_affected(Some(&command_tag)).unwrap_or(0),
                generated_id: None,
            }),
            RawResult::Empty => Err(unexpected_result(&self.text, "empty query")),
            RawResult::Error(fields) => Err(query_error(&fields, &self.text)),
        }
    }

    /// Run the statement for its side effects.
    ///
    /// Rows returned by the statement are not decoded; the first column of
    /// the first row becomes `insert_id` when it is an integer.
    pub fn execute_non_query(&mut self) -> Result<ExecResult> {
        match self.run()? {
            RawResult::Tuples {
                rows, command_tag, ..
            } => Ok(ExecResult {
                rows_affected: parse_rows_affected(command_tag.as_deref())
                    .unwrap_or_else(|| u64::try_from(rows.len()).unwrap_or(u64::MAX)),
                insert_id: first_integer(&rows),
            }),
            RawResult::CommandOk { command_tag } => Ok(ExecResult {
                rows_affected: parse_rows_affected(Some(&command_tag)).unwrap_or(0),
                insert_id: None,
            }),
            RawResult::Empty => Err(unexpected_result(&self.text, "empty query")),
            RawResult::Error(fields) => Err(query_error(&fields, &self.text)),
        }
    }

    /// Run the statement and return its rows.
    pub fn execute_reader(&mut self) -> Result<ResultReader> {
        match self.execute()? {
            CommandOutcome::Rows { reader } => Ok(reader),
            CommandOutcome::NonQuery { .. } => Err(unexpected_result(
                &self.text,
                "statement did not return rows",
            )),
        }
    }

    fn run(&mut self) -> Result<RawResult> {
        executor::run(self.connection, &self.text, Resubmit::Once)
    }
}

fn unexpected_result(sql: &str, message: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::UnexpectedResult,
        sql: Some(sql.to_string()),
        sqlstate: None,
        message: message.to_string(),
        detail: None,
        hint: None,
        position: None,
        source: None,
    })
}
