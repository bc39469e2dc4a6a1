//! Item ("assessment") record and eligibility predicate.
//!
//! # Invariants
//! - `status == None` covers both absent and unrecognized stored values.
//! - `is_active` and `status` are independent predicates; neither implies the
//!   other.

use crate::model::decode::{bool_or, i64_or, id_list, optional_string, required_id, DecodeError, Document};
use crate::model::identifier::CanonicalId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Item lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Draft,
    Active,
    Published,
    Archived,
}

impl ItemStatus {
    /// Statuses that make an active item visible to its groups.
    pub const VISIBLE: [ItemStatus; 2] = [ItemStatus::Active, ItemStatus::Published];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    /// Exact parse of the stored form; `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "published" => Some(Self::Published),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn is_visible(self) -> bool {
        Self::VISIBLE.contains(&self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: CanonicalId,
    pub title: Option<String>,
    pub groups: Vec<CanonicalId>,
    pub is_active: bool,
    pub status: Option<ItemStatus>,
    /// Epoch milliseconds; 0 when the document carries none.
    pub created_at: i64,
}

impl Item {
    /// Decodes an `assessments` document.
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let status = optional_string(doc, "status")?
            .as_deref()
            .and_then(ItemStatus::parse);
        Ok(Self {
            id: required_id(doc, "_id")?,
            title: optional_string(doc, "title")?,
            groups: id_list(doc, "groups")?,
            is_active: bool_or(doc, "is_active", false)?,
            status,
            created_at: i64_or(doc, "created_at", 0)?,
        })
    }

    /// Whether this item is visible to a member of `member_groups`.
    pub fn is_eligible_for(&self, member_groups: &BTreeSet<CanonicalId>) -> bool {
        self.is_active
            && self.status.is_some_and(ItemStatus::is_visible)
            && self.groups.iter().any(|group| member_groups.contains(group))
    }
}
