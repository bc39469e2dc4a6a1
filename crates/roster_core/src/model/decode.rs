//! Typed decode helpers for loosely-typed documents.
//!
//! # Responsibility
//! - Turn raw JSON documents into typed records at the core boundary.
//! - Fail fast on malformed identifiers and wrongly-typed fields.
//!
//! # Invariants
//! - Absent optional fields decode to documented defaults.
//! - A present field with the wrong JSON type is an error, never a default.

use crate::model::identifier::{canonicalize, CanonicalId, IdentifierError};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Raw document body as stored.
pub type Document = Map<String, Value>;

/// Document to typed record conversion failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// An identifier-valued field is malformed.
    InvalidIdentifier {
        field: String,
        source: IdentifierError,
    },
    /// A required field is absent or null.
    MissingField(&'static str),
    /// A field is present with an unexpected JSON type.
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier { field, source } => write!(f, "field `{field}`: {source}"),
            Self::MissingField(field) => write!(f, "missing required field `{field}`"),
            Self::WrongType { field, expected } => {
                write!(f, "field `{field}` must be {expected}")
            }
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidIdentifier { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub(crate) fn required_id(doc: &Document, field: &'static str) -> Result<CanonicalId, DecodeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(value) => id_value(field, value),
    }
}

pub(crate) fn optional_id(
    doc: &Document,
    field: &'static str,
) -> Result<Option<CanonicalId>, DecodeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(value) => id_value(field, value).map(Some),
    }
}

/// Decodes an identifier array, keeping stored order and duplicates.
pub(crate) fn id_list(doc: &Document, field: &'static str) -> Result<Vec<CanonicalId>, DecodeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(values)) => values
            .iter()
            .enumerate()
            .map(|(index, value)| {
                canonicalize(value).map_err(|source| DecodeError::InvalidIdentifier {
                    field: format!("{field}[{index}]"),
                    source,
                })
            })
            .collect(),
        Some(_) => Err(DecodeError::WrongType {
            field,
            expected: "an array of identifiers",
        }),
    }
}

/// Decodes a derived identifier array, dropping malformed entries.
///
/// Returns the valid ids in stored order and the number of dropped entries.
pub(crate) fn id_list_lenient(
    doc: &Document,
    field: &'static str,
) -> Result<(Vec<CanonicalId>, usize), DecodeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok((Vec::new(), 0)),
        Some(Value::Array(values)) => {
            let mut ids = Vec::with_capacity(values.len());
            let mut dropped = 0;
            for value in values {
                match canonicalize(value) {
                    Ok(id) => ids.push(id),
                    Err(_) => dropped += 1,
                }
            }
            Ok((ids, dropped))
        }
        Some(_) => Err(DecodeError::WrongType {
            field,
            expected: "an array of identifiers",
        }),
    }
}

pub(crate) fn optional_string(
    doc: &Document,
    field: &'static str,
) -> Result<Option<String>, DecodeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(DecodeError::WrongType {
            field,
            expected: "a string",
        }),
    }
}

pub(crate) fn bool_or(doc: &Document, field: &'static str, default: bool) -> Result<bool, DecodeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(value)) => Ok(*value),
        Some(_) => Err(DecodeError::WrongType {
            field,
            expected: "a boolean",
        }),
    }
}

pub(crate) fn i64_or(doc: &Document, field: &'static str, default: i64) -> Result<i64, DecodeError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(value)) => value.as_i64().ok_or(DecodeError::WrongType {
            field,
            expected: "an integer",
        }),
        Some(_) => Err(DecodeError::WrongType {
            field,
            expected: "an integer",
        }),
    }
}

fn id_value(field: &'static str, value: &Value) -> Result<CanonicalId, DecodeError> {
    canonicalize(value).map_err(|source| DecodeError::InvalidIdentifier {
        field: field.to_string(),
        source,
    })
}
