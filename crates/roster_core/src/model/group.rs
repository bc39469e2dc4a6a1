//! Group ("batch") record.
//!
//! # Invariants
//! - `member_ids` is a derived cache of `Member.group_id`.
//! - Only the reconciler writes `member_ids`.

use crate::model::decode::{id_list_lenient, optional_string, required_id, DecodeError, Document};
use crate::model::identifier::CanonicalId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: CanonicalId,
    pub name: String,
    /// Stored order, duplicates preserved so drift can be detected.
    pub member_ids: Vec<CanonicalId>,
    /// Stored `member_ids` entries that failed canonicalization.
    #[serde(default)]
    pub invalid_member_entries: usize,
}

impl Group {
    /// Decodes a `batches` document.
    ///
    /// Malformed `member_ids` entries are counted rather than rejected: the
    /// cache is rebuilt from members anyway.
    pub fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let (member_ids, invalid_member_entries) = id_list_lenient(doc, "member_ids")?;
        Ok(Self {
            id: required_id(doc, "_id")?,
            name: optional_string(doc, "name")?.unwrap_or_default(),
            member_ids,
            invalid_member_entries,
        })
    }

    pub fn member_set(&self) -> BTreeSet<CanonicalId> {
        self.member_ids.iter().cloned().collect()
    }

    pub fn has_duplicate_members(&self) -> bool {
        self.member_set().len() != self.member_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::Group;
    use serde_json::json;

    #[test]
    fn mixed_member_encodings_decode_to_one_set() {
        let doc = json!({
            "_id": "B2",
            "name": "Batch 2",
            "member_ids": [
                { "$oid": "66fa1b2c3d4e5f6a7b8c9d0e" },
                "66FA1B2C3D4E5F6A7B8C9D0E",
                "S1",
            ],
        });
        let group = Group::from_document(doc.as_object().unwrap()).unwrap();
        assert_eq!(group.member_ids.len(), 3);
        assert_eq!(group.member_set().len(), 2);
        assert!(group.has_duplicate_members());
    }

    #[test]
    fn malformed_cache_entries_are_counted_not_fatal() {
        let doc = json!({ "_id": "B3", "member_ids": ["S1", 12, ""] });
        let group = Group::from_document(doc.as_object().unwrap()).unwrap();
        assert_eq!(group.member_ids.len(), 1);
        assert_eq!(group.invalid_member_entries, 2);
    }

    #[test]
    fn missing_member_ids_is_empty() {
        let doc = json!({ "_id": "B1" });
        let group = Group::from_document(doc.as_object().unwrap()).unwrap();
        assert!(group.member_ids.is_empty());
        assert_eq!(group.name, "");
    }
}
