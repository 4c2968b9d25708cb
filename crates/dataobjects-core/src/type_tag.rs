//! Target type tags and caller-supplied field type declarations.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ArgumentError;

/// The semantic type a result field is decoded into.
///
/// Every result column maps to exactly one tag, either inferred from the
/// server's column type or declared by the caller before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeTag {
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Time,
    ByteArray,
    Text,
    Null,
}

impl TypeTag {
    /// All tags, in declaration order.
    pub const ALL: [TypeTag; 10] = [
        TypeTag::Integer,
        TypeTag::Float,
        TypeTag::Decimal,
        TypeTag::Boolean,
        TypeTag::Date,
        TypeTag::Timestamp,
        TypeTag::Time,
        TypeTag::ByteArray,
        TypeTag::Text,
        TypeTag::Null,
    ];

    /// Canonical name of the tag.
    pub const fn name(self) -> &'static str {
        match self {
            TypeTag::Integer => "Integer",
            TypeTag::Float => "Float",
            TypeTag::Decimal => "Decimal",
            TypeTag::Boolean => "Boolean",
            TypeTag::Date => "Date",
            TypeTag::Timestamp => "Timestamp",
            TypeTag::Time => "Time",
            TypeTag::ByteArray => "ByteArray",
            TypeTag::Text => "Text",
            TypeTag::Null => "Null",
        }
    }

    /// Is this a temporal tag handled by the temporal parser?
    pub const fn is_temporal(self) -> bool {
        matches!(self, TypeTag::Date | TypeTag::Timestamp | TypeTag::Time)
    }

    /// Is this a numeric tag?
    pub const fn is_numeric(self) -> bool {
        matches!(self, TypeTag::Integer | TypeTag::Float | TypeTag::Decimal)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TypeTag {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = match s.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "fixnum"
            | "bignum" => TypeTag::Integer,
            "float" | "float4" | "float8" | "double" | "real" => TypeTag::Float,
            "decimal" | "bigdecimal" | "numeric" | "money" => TypeTag::Decimal,
            "boolean" | "bool" | "trueclass" => TypeTag::Boolean,
            "date" => TypeTag::Date,
            "timestamp" | "timestamptz" | "datetime" => TypeTag::Timestamp,
            "time" => TypeTag::Time,
            "bytearray" | "bytea" | "binary" | "blob" => TypeTag::ByteArray,
            "text" | "string" | "varchar" | "char" => TypeTag::Text,
            "null" | "nil" | "nilclass" => TypeTag::Null,
            _ => return Err(ArgumentError::invalid_field_type(s)),
        };
        Ok(tag)
    }
}

/// One element of a field type declaration.
///
/// Callers may pass a flat list of tags or a list of lists; groups are
/// flattened one level. A group inside a group is not a valid type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTypeDecl {
    One(TypeTag),
    Named(String),
    Group(Vec<FieldTypeDecl>),
}

impl FieldTypeDecl {
    fn resolve_single(&self) -> Result<TypeTag, ArgumentError> {
        match self {
            FieldTypeDecl::One(tag) => Ok(*tag),
            FieldTypeDecl::Named(name) => name.parse(),
            FieldTypeDecl::Group(inner) => Err(ArgumentError::invalid_field_type(format!(
                "nested group of {} types",
                inner.len()
            ))),
        }
    }
}

impl From<TypeTag> for FieldTypeDecl {
    fn from(tag: TypeTag) -> Self {
        FieldTypeDecl::One(tag)
    }
}

impl From<&str> for FieldTypeDecl {
    fn from(name: &str) -> Self {
        FieldTypeDecl::Named(name.to_string())
    }
}

impl From<String> for FieldTypeDecl {
    fn from(name: String) -> Self {
        FieldTypeDecl::Named(name)
    }
}

impl<T: Into<FieldTypeDecl>> From<Vec<T>> for FieldTypeDecl {
    fn from(items: Vec<T>) -> Self {
        FieldTypeDecl::Group(items.into_iter().map(Into::into).collect())
    }
}

/// Flatten declarations one level and resolve every element to a tag.
pub fn resolve_field_types<I>(decls: I) -> Result<Vec<TypeTag>, ArgumentError>
where
    I: IntoIterator,
    I::Item: Into<FieldTypeDecl>,
{
    let mut tags = Vec::new();
    for decl in decls {
        match decl.into() {
            FieldTypeDecl::Group(inner) => {
                for item in &inner {
                    tags.push(item.resolve_single()?);
                }
            }
            single => tags.push(single.resolve_single()?),
        }
    }
    Ok(tags)
}
