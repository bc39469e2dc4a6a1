//! Member ("student") record.
//!
//! # Invariants
//! - `group_id` is the authoritative membership pointer.
//! - A blank or null `group_id` means "no group".

use crate::model::decode::{optional_id, optional_string, required_id, DecodeError, Document};
use crate::model::identifier::CanonicalId;
use serde::{Deserialize, Serialize};

/// Role tag of members that belong to groups.
pub const STUDENT_ROLE: &str = "student";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: CanonicalId,
    pub role: String,
    pub group_id: Option<CanonicalId>,
    pub name: Option<String>,
    pub email: Option<String>,
    /// PHC-format digest; never serialized back out.
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
}

impl Member {
    /// Decodes a `students` document.
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        Ok(Self {
            id: required_id(doc, "_id")?,
            role: optional_string(doc, "role")?.unwrap_or_default(),
            group_id: optional_id(doc, "group_id")?,
            name: optional_string(doc, "name")?,
            email: optional_string(doc, "email")?,
            password_hash: optional_string(doc, "password_hash")?,
        })
    }
}
