//! Typed repositories over the document store.
//!
//! # Responsibility
//! - Translate use-case reads/writes into store filters and patches.
//! - Decode raw documents into typed records at this boundary.
//!
//! # Invariants
//! - Bulk reads skip-and-report undecodable records instead of failing.
//! - Point reads and eligibility reads propagate decode failures.
//! - Store failures are always propagated, never mapped to empty results.

use crate::model::decode::{DecodeError, Document};
use crate::model::identifier::{canonicalize, CanonicalId};
use crate::store::{StoreError, ID_FIELD};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod group_repo;
pub mod item_repo;
pub mod member_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for typed persistence operations.
#[derive(Debug)]
pub enum RepoError {
    Store(StoreError),
    Decode {
        collection: String,
        document: String,
        source: DecodeError,
    },
    NotFound {
        collection: String,
        id: CanonicalId,
    },
}

impl RepoError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_transient())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Decode {
                collection,
                document,
                source,
            } => write!(f, "cannot decode `{collection}` document {document}: {source}"),
            Self::NotFound { collection, id } => {
                write!(f, "document `{id}` not found in `{collection}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Decode { source, .. } => Some(source),
            Self::NotFound { .. } => None,
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Collection names used by the repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Collections {
    pub members: String,
    pub groups: String,
    pub items: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            members: "students".to_string(),
            groups: "batches".to_string(),
            items: "assessments".to_string(),
        }
    }
}

/// A stored document that could not be decoded and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub collection: String,
    /// Raw `_id` rendering; may itself be malformed.
    pub document: String,
    /// Canonical `_id` when only other fields failed to decode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CanonicalId>,
    pub reason: String,
}

/// Result of a bulk decode: good records plus what was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T> {
    pub records: Vec<T>,
    pub rejected: Vec<RejectedRecord>,
}

impl<T> Default for Decoded<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

pub(crate) fn decode_all<T>(
    collection: &str,
    docs: Vec<Document>,
    decode: impl Fn(&Document) -> Result<T, DecodeError>,
) -> Decoded<T> {
    let mut out = Decoded::default();
    for doc in docs {
        match decode(&doc) {
            Ok(record) => out.records.push(record),
            Err(err) => out.rejected.push(RejectedRecord {
                collection: collection.to_string(),
                document: raw_id(&doc),
                id: doc.get(ID_FIELD).and_then(|value| canonicalize(value).ok()),
                reason: err.to_string(),
            }),
        }
    }
    out
}

pub(crate) fn decode_one<T>(
    collection: &str,
    doc: &Document,
    decode: impl Fn(&Document) -> Result<T, DecodeError>,
) -> RepoResult<T> {
    decode(doc).map_err(|source| RepoError::Decode {
        collection: collection.to_string(),
        document: raw_id(doc),
        source,
    })
}

fn raw_id(doc: &Document) -> String {
    doc.get(ID_FIELD)
        .map_or_else(|| "<no _id>".to_string(), |value| value.to_string())
}
