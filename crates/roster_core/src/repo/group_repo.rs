//! Group repository contract and document-store implementation.
//!
//! # Invariants
//! - `replace_member_ids` writes the set in ascending canonical order.
//! - `replace_member_ids` is a single-document update and a no-op when the
//!   stored array already equals the new one.

use crate::model::decode::Document;
use crate::model::group::Group;
use crate::model::identifier::CanonicalId;
use crate::repo::{decode_all, decode_one, Decoded, RepoError, RepoResult};
use crate::store::{DocumentStore, Filter, Patch, ID_FIELD};
use log::warn;
use serde_json::Value;
use std::collections::BTreeSet;

/// Repository interface for group reads and cache writes.
pub trait GroupRepository {
    fn list_groups(&self) -> RepoResult<Decoded<Group>>;
    fn get_group(&self, id: &CanonicalId) -> RepoResult<Option<Group>>;
    /// Ids of every group whose cached `member_ids` contains `member_id`.
    fn group_ids_containing(&self, member_id: &CanonicalId) -> RepoResult<BTreeSet<CanonicalId>>;
    fn insert_group(&self, id: Option<CanonicalId>, name: &str) -> RepoResult<CanonicalId>;
    /// Overwrites the derived cache. Returns whether a write happened.
    fn replace_member_ids(
        &self,
        group_id: &CanonicalId,
        member_ids: &BTreeSet<CanonicalId>,
    ) -> RepoResult<bool>;
}

/// Group repository backed by any `DocumentStore`.
pub struct StoreGroupRepository<'store, S: DocumentStore + ?Sized> {
    store: &'store S,
    collection: String,
}

impl<'store, S: DocumentStore + ?Sized> StoreGroupRepository<'store, S> {
    pub fn new(store: &'store S, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }
}

impl<S: DocumentStore + ?Sized> GroupRepository for StoreGroupRepository<'_, S> {
    fn list_groups(&self) -> RepoResult<Decoded<Group>> {
        let docs = self.store.find(&self.collection, &Filter::All)?;
        Ok(decode_all(&self.collection, docs, Group::from_document))
    }

    fn get_group(&self, id: &CanonicalId) -> RepoResult<Option<Group>> {
        self.store
            .find_one(&self.collection, &Filter::by_id(id.clone()))?
            .map(|doc| decode_one(&self.collection, &doc, Group::from_document))
            .transpose()
    }

    fn group_ids_containing(&self, member_id: &CanonicalId) -> RepoResult<BTreeSet<CanonicalId>> {
        let docs = self.store.find(
            &self.collection,
            &Filter::id_eq("member_ids", member_id.clone()),
        )?;
        let decoded = decode_all(&self.collection, docs, Group::from_document);
        for rejected in &decoded.rejected {
            warn!(
                "event=group_decode module=repo status=skipped collection={} document={} reason={}",
                rejected.collection, rejected.document, rejected.reason
            );
        }
        Ok(decoded.records.into_iter().map(|group| group.id).collect())
    }

    fn insert_group(&self, id: Option<CanonicalId>, name: &str) -> RepoResult<CanonicalId> {
        let id = id.unwrap_or_else(CanonicalId::generate);
        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_string(), id.to_value());
        doc.insert("name".to_string(), Value::String(name.to_string()));
        doc.insert("member_ids".to_string(), Value::Array(Vec::new()));
        Ok(self.store.insert_one(&self.collection, doc)?)
    }

    fn replace_member_ids(
        &self,
        group_id: &CanonicalId,
        member_ids: &BTreeSet<CanonicalId>,
    ) -> RepoResult<bool> {
        let values: Vec<Value> = member_ids.iter().map(CanonicalId::to_value).collect();
        let outcome = self.store.update_one(
            &self.collection,
            &Filter::by_id(group_id.clone()),
            &Patch::new().set("member_ids", values),
        )?;
        if !outcome.matched {
            return Err(RepoError::NotFound {
                collection: self.collection.clone(),
                id: group_id.clone(),
            });
        }
        Ok(outcome.modified)
    }
}
