//! Document store contract and SQLite implementation.
//!
//! # Responsibility
//! - Define the generic `find/find_one/update_one/count/insert_one` surface the
//!   core reads from and writes to.
//! - Classify store failures into transient (retryable) and permanent.
//!
//! # Invariants
//! - `update_one` touches at most one document and is atomic for it, including
//!   the read of the body it patches.
//! - No multi-document transactions are exposed.
//! - A store failure is never reported as an empty result.

use crate::db::DbError;
use crate::model::decode::Document;
use crate::model::identifier::{CanonicalId, IdentifierError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod filter;
pub mod sqlite;

pub use filter::{Filter, Patch, ID_FIELD};
pub use sqlite::SqliteDocumentStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-layer error.
#[derive(Debug)]
pub enum StoreError {
    /// Busy, locked, timed out or unreachable store. Retryable by the caller.
    Transient {
        operation: &'static str,
        source: DbError,
    },
    /// Non-retryable database failure.
    Db(DbError),
    /// Inserted document carries a malformed or missing `_id`.
    InvalidIdentifier(IdentifierError),
    /// Another document in the collection already has this `_id`.
    DuplicateKey {
        collection: String,
        key: CanonicalId,
    },
    /// Patch attempts to rewrite `_id` or is empty.
    InvalidPatch(&'static str),
    /// Persisted body is not a JSON object.
    InvalidData(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub(crate) fn classify(operation: &'static str, err: impl Into<DbError>) -> Self {
        let err = err.into();
        if err.is_transient() {
            Self::Transient {
                operation,
                source: err,
            }
        } else {
            Self::Db(err)
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient { operation, source } => {
                write!(f, "transient store failure during {operation}: {source}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidIdentifier(err) => write!(f, "{err}"),
            Self::DuplicateKey { collection, key } => {
                write!(f, "duplicate key `{key}` in collection `{collection}`")
            }
            Self::InvalidPatch(message) => write!(f, "invalid patch: {message}"),
            Self::InvalidData(message) => write!(f, "invalid stored document: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transient { source, .. } => Some(source),
            Self::Db(err) => Some(err),
            Self::InvalidIdentifier(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IdentifierError> for StoreError {
    fn from(value: IdentifierError) -> Self {
        Self::InvalidIdentifier(value)
    }
}

/// Outcome of a single-document update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    /// Whether a document matched the filter.
    pub matched: bool,
    /// Whether the matched document's body actually changed.
    pub modified: bool,
}

/// Generic document store used by the repositories.
pub trait DocumentStore {
    /// Returns every matching document in insertion order.
    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>>;
    /// Returns the first matching document in insertion order.
    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;
    /// Applies `patch` to the first matching document.
    ///
    /// A patch that leaves the body unchanged performs no write.
    fn update_one(&self, collection: &str, filter: &Filter, patch: &Patch)
        -> StoreResult<UpdateOutcome>;
    fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;
    /// Inserts a document that must carry a valid `_id`.
    fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<CanonicalId>;
}
