//! Forward-only cursor over a materialized result.

// The Error type is intentionally large to provide rich error context.
#![allow(clippy::result_large_err)]

use std::sync::Arc;

use dataobjects_core::{
    ArgumentError, ArgumentErrorKind, ColumnInfo, Error, ReaderError, ReaderErrorKind, Result,
    Row, TypeTag, Value,
};

use crate::executor::{RawRow, first_integer, parse_rows_affected};
use crate::protocol::FieldDescription;
use crate::types::{decode_field, infer_type, oid};

/// One result column and the tag its values decode as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub type_oid: u32,
    pub tag: TypeTag,
    pub ordinal: usize,
}

impl FieldDescriptor {
    /// Server-side name of the column type, such as `int4` or `timestamptz`.
    pub fn type_name(&self) -> &'static str {
        oid::type_name(self.type_oid)
    }
}

#[derive(Debug)]
struct ResultSet {
    fields: Vec<FieldDescriptor>,
    columns: Arc<ColumnInfo>,
    rows: Vec<RawRow>,
    rows_affected: u64,
    generated_id: Option<i64>,
}

/// Rows of one statement, decoded one at a time.
///
/// The reader owns its rows and does not borrow the connection that
/// produced them. Once closed every accessor fails with
/// `ReaderErrorKind::Closed`.
#[derive(Debug)]
pub struct ResultReader {
    result: Option<ResultSet>,
    position: usize,
    current: Option<Vec<Value>>,
}

impl ResultReader {
    pub(crate) fn new(
        descriptions: Vec<FieldDescription>,
        rows: Vec<RawRow>,
        command_tag: Option<&str>,
    ) -> Self {
        let fields: Vec<FieldDescriptor> = descriptions
            .into_iter()
            .enumerate()
            .map(|(ordinal, d)| FieldDescriptor {
                tag: infer_type(d.type_oid),
                name: d.name,
                type_oid: d.type_oid,
                ordinal,
            })
            .collect();
        let columns = Arc::new(ColumnInfo::new(
            fields.iter().map(|f| f.name.clone()).collect(),
        ));
        let rows_affected = parse_rows_affected(command_tag)
            .unwrap_or_else(|| u64::try_from(rows.len()).unwrap_or(u64::MAX));
        let generated_id = first_integer(&rows);

        Self {
            result: Some(ResultSet {
                fields,
                columns,
                rows,
                rows_affected,
                generated_id,
            }),
            position: 0,
            current: None,
        }
    }

    /// Replace the inferred tags with caller-declared ones.
    pub(crate) fn override_types(&mut self, tags: &[TypeTag]) -> Result<()> {
        let result = self.result_mut()?;
        if tags.len() != result.fields.len() {
            return Err(Error::Argument(ArgumentError::field_count_mismatch(
                tags.len(),
                result.fields.len(),
            )));
        }
        for (field, tag) in result.fields.iter_mut().zip(tags) {
            field.tag = *tag;
        }
        Ok(())
    }

    fn result(&self) -> Result<&ResultSet> {
        self.result.as_ref().ok_or_else(Error::reader_closed)
    }

    fn result_mut(&mut self) -> Result<&mut ResultSet> {
        self.result.as_mut().ok_or_else(Error::reader_closed)
    }

    /// Move to the next row.
    ///
    /// Returns `Ok(false)` once every row has been visited, and keeps
    /// returning it. A row that fails to decode is skipped over: the
    /// position still moves and the error is returned for that row only.
    pub fn advance(&mut self) -> Result<bool> {
        let result = self.result.as_ref().ok_or_else(Error::reader_closed)?;
        self.current = None;

        let Some(raw) = result.rows.get(self.position) else {
            return Ok(false);
        };
        self.position += 1;

        let values = raw
            .iter()
            .zip(&result.fields)
            .map(|(value, field)| decode_field(value.as_deref(), field.tag))
            .collect::<Result<Vec<_>>>()?;
        self.current = Some(values);
        Ok(true)
    }

    /// Values of the current row.
    pub fn values(&self) -> Result<&[Value]> {
        self.result()?;
        self.current.as_deref().ok_or_else(|| {
            Error::Reader(ReaderError {
                kind: ReaderErrorKind::NoCurrentRow,
            })
        })
    }

    /// One value of the current row.
    pub fn item(&self, index: usize) -> Result<&Value> {
        self.values()?
            .get(index)
            .ok_or_else(|| out_of_range(index))
    }

    pub fn is_null(&self, index: usize) -> Result<bool> {
        self.item(index).map(Value::is_null)
    }

    pub fn fields(&self) -> Result<&[FieldDescriptor]> {
        Ok(&self.result()?.fields)
    }

    pub fn field_names(&self) -> Result<&[String]> {
        Ok(self.result()?.columns.names())
    }

    pub fn field_count(&self) -> Result<usize> {
        Ok(self.result()?.fields.len())
    }

    /// Name of the field at `index`.
    pub fn name(&self, index: usize) -> Result<&str> {
        self.result()?
            .columns
            .name_at(index)
            .ok_or_else(|| out_of_range(index))
    }

    /// Index of the first field called `name`.
    pub fn get_index(&self, name: &str) -> Result<Option<usize>> {
        Ok(self.result()?.columns.index_of(name))
    }

    pub fn row_count(&self) -> Result<usize> {
        Ok(self.result()?.rows.len())
    }

    /// Rows advanced over so far, including ones that failed to decode.
    pub fn position(&self) -> Result<usize> {
        self.result()?;
        Ok(self.position)
    }

    pub fn has_rows(&self) -> Result<bool> {
        Ok(!self.result()?.rows.is_empty())
    }

    /// Row count reported in the command tag.
    pub fn rows_affected(&self) -> Result<u64> {
        Ok(self.result()?.rows_affected)
    }

    /// First column of the first row, when it is an integer
    /// (`INSERT ... RETURNING id`).
    pub fn generated_id(&self) -> Result<Option<i64>> {
        Ok(self.result()?.generated_id)
    }

    pub fn is_closed(&self) -> bool {
        self.result.is_none()
    }

    /// Release the result. Returns whether anything was released.
    pub fn close(&mut self) -> bool {
        self.current = None;
        self.result.take().is_some()
    }
}

impl Iterator for ResultReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let columns = Arc::clone(&self.result.as_ref()?.columns);
        match self.advance() {
            Ok(true) => self
                .current
                .clone()
                .map(|values| Ok(Row::with_columns(columns, values))),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

fn out_of_range(index: usize) -> Error {
    Error::Argument(ArgumentError {
        kind: ArgumentErrorKind::InvalidInput,
        message: format!("field index {index} out of range"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, type_oid: u32) -> FieldDescription {
        FieldDescription {
            name: name.to_string(),
            table_oid: 0,
            column_id: 0,
            type_oid,
            type_size: -1,
            type_modifier: -1,
            format: 0,
        }
    }

    fn raw(values: &[Option<&str>]) -> RawRow {
        values
            .iter()
            .map(|v| v.map(|s| s.as_bytes().to_vec()))
            .collect()
    }

    fn sample() -> ResultReader {
        ResultReader::new(
            vec![
                field("id", oid::INT4),
                field("name", oid::TEXT),
                field("id", oid::FLOAT8),
            ],
            vec![
                raw(&[Some("1"), Some("alpha"), Some("1.5")]),
                raw(&[Some("2"), None, Some("2.5")]),
            ],
            Some("SELECT 2"),
        )
    }

    #[test]
    fn test_advance_until_exhausted() {
        let mut reader = sample();
        assert!(matches!(
            reader.values().unwrap_err(),
            Error::Reader(ReaderError { kind: ReaderErrorKind::NoCurrentRow })
        ));

        assert!(reader.advance().unwrap());
        assert_eq!(reader.item(0).unwrap(), &Value::Integer(1));
        assert_eq!(reader.item(1).unwrap().as_str(), Some("alpha"));
        assert_eq!(reader.item(2).unwrap(), &Value::Float(1.5));

        assert!(reader.advance().unwrap());
        assert!(reader.is_null(1).unwrap());
        assert_eq!(reader.position().unwrap(), 2);

        assert!(!reader.advance().unwrap());
        assert!(!reader.advance().unwrap());
        assert_eq!(reader.position().unwrap(), 2);
        assert!(reader.values().is_err());
    }

    #[test]
    fn test_metadata() {
        let reader = sample();
        assert_eq!(reader.field_count().unwrap(), 3);
        assert_eq!(reader.field_names().unwrap(), ["id", "name", "id"]);
        assert_eq!(reader.name(1).unwrap(), "name");
        assert!(reader.name(9).is_err());
        assert_eq!(reader.get_index("id").unwrap(), Some(0));
        assert_eq!(reader.get_index("missing").unwrap(), None);
        assert_eq!(reader.row_count().unwrap(), 2);
        assert!(reader.has_rows().unwrap());
        assert_eq!(reader.rows_affected().unwrap(), 2);
        assert_eq!(reader.generated_id().unwrap(), Some(1));

        let tags: Vec<TypeTag> = reader.fields().unwrap().iter().map(|f| f.tag).collect();
        assert_eq!(tags, [TypeTag::Integer, TypeTag::Text, TypeTag::Float]);
        assert_eq!(reader.fields().unwrap()[2].ordinal, 2);
        assert_eq!(reader.fields().unwrap()[2].type_name(), "float8");
    }

    #[test]
    fn test_override_types() {
        let mut reader = sample();
        reader
            .override_types(&[TypeTag::Text, TypeTag::Text, TypeTag::Decimal])
            .unwrap();
        reader.advance().unwrap();
        assert_eq!(reader.item(0).unwrap().as_str(), Some("1"));
        assert_eq!(reader.item(2).unwrap().as_str(), Some("1.5"));

        let err = reader.override_types(&[TypeTag::Text]).unwrap_err();
        match err {
            Error::Argument(ArgumentError {
                kind: ArgumentErrorKind::FieldCountMismatch { expected, actual },
                ..
            }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 3);
            }
            other => panic!("expected field count mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_error_still_advances() {
        let mut reader = ResultReader::new(
            vec![field("n", oid::INT8)],
            vec![raw(&[Some("oops")]), raw(&[Some("5")])],
            Some("SELECT 2"),
        );
        assert!(reader.advance().unwrap_err().is_decode());
        assert_eq!(reader.position().unwrap(), 1);
        assert!(reader.values().is_err());
        assert!(reader.advance().unwrap());
        assert_eq!(reader.item(0).unwrap(), &Value::Integer(5));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut reader = sample();
        reader.advance().unwrap();
        assert!(reader.close());
        assert!(!reader.close());
        assert!(reader.is_closed());

        let err = reader.advance().unwrap_err();
        assert!(matches!(
            err,
            Error::Reader(ReaderError { kind: ReaderErrorKind::Closed })
        ));
        assert!(reader.values().is_err());
        assert!(reader.field_count().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_iterator_yields_rows() {
        let rows: Vec<Row> = sample().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get_by_name("id"), Some(&Value::Integer(2)));
        assert_eq!(rows[1].get_by_name("name"), Some(&Value::Null));
    }

    #[test]
    fn test_empty_result() {
        let mut reader = ResultReader::new(vec![field("x", oid::INT4)], vec![], Some("SELECT 0"));
        assert!(!reader.has_rows().unwrap());
        assert_eq!(reader.generated_id().unwrap(), None);
        assert!(!reader.advance().unwrap());
        assert_eq!(reader.position().unwrap(), 0);
    }
}
