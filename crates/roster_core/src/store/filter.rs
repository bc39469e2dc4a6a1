//! Document filters and update patches.
//!
//! # Responsibility
//! - Express equality, set-membership and AND predicates over documents.
//! - Give identifier-valued predicates canonical (encoding-blind) semantics.
//!
//! # Invariants
//! - Array-valued fields match when any element matches (`$in`-style).
//! - Identifier predicates never match malformed stored identifiers.
//! - Patches never touch `_id`.

use crate::model::decode::Document;
use crate::model::identifier::{canonicalize, CanonicalId};
use serde_json::Value;
use std::collections::BTreeSet;

/// Field holding a document's primary identifier.
pub const ID_FIELD: &str = "_id";

/// Predicate over one stored document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// JSON equality with `value`.
    Eq { field: String, value: Value },
    /// JSON equality with any of `values`.
    In { field: String, values: Vec<Value> },
    /// Canonical identifier equality.
    IdEq { field: String, id: CanonicalId },
    /// Canonical identifier membership in `ids`.
    IdIn {
        field: String,
        ids: BTreeSet<CanonicalId>,
    },
    /// All inner filters match. Empty `And` matches everything.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    pub fn id_eq(field: impl Into<String>, id: CanonicalId) -> Self {
        Self::IdEq {
            field: field.into(),
            id,
        }
    }

    pub fn id_in(field: impl Into<String>, ids: BTreeSet<CanonicalId>) -> Self {
        Self::IdIn {
            field: field.into(),
            ids,
        }
    }

    /// Shorthand for `_id` lookups.
    pub fn by_id(id: CanonicalId) -> Self {
        Self::id_eq(ID_FIELD, id)
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And(filters)
    }

    /// Returns the primary key when this filter is an exact `_id` lookup.
    pub fn primary_key(&self) -> Option<&CanonicalId> {
        match self {
            Self::IdEq { field, id } if field == ID_FIELD => Some(id),
            _ => None,
        }
    }

    /// Evaluates this filter against one document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => {
                any_value(doc, field, |candidate| candidate == value)
            }
            Self::In { field, values } => {
                any_value(doc, field, |candidate| values.contains(candidate))
            }
            Self::IdEq { field, id } => any_value(doc, field, |candidate| {
                canonicalize(candidate).is_ok_and(|candidate| &candidate == id)
            }),
            Self::IdIn { field, ids } => {
                !ids.is_empty()
                    && any_value(doc, field, |candidate| {
                        canonicalize(candidate).is_ok_and(|candidate| ids.contains(&candidate))
                    })
            }
            Self::And(filters) => filters.iter().all(|filter| filter.matches(doc)),
        }
    }
}

/// Field-level `$set` update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    set: Document,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn touches_id(&self) -> bool {
        self.set.contains_key(ID_FIELD)
    }

    /// Applies the patch in place. Returns whether the document changed.
    pub fn apply(&self, doc: &mut Document) -> bool {
        let mut changed = false;
        for (field, value) in &self.set {
            if doc.get(field) != Some(value) {
                doc.insert(field.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}

fn lookup<'doc>(doc: &'doc Document, path: &str) -> Option<&'doc Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn any_value(doc: &Document, field: &str, predicate: impl Fn(&Value) -> bool) -> bool {
    match lookup(doc, field) {
        None => false,
        Some(Value::Array(values)) => values.iter().any(predicate),
        Some(value) => predicate(value),
    }
}
