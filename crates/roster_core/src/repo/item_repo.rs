//! Item repository contract and document-store implementation.
//!
//! # Invariants
//! - The visibility query composes three predicates with AND: group
//!   intersection, `is_active == true`, `status ∈ {active, published}`.
//! - Visibility results are ordered `created_at DESC, id ASC`.
//! - A matched item that cannot be decoded is skipped and reported; it never
//!   hides the other visible items.

use crate::model::decode::Document;
use crate::model::identifier::CanonicalId;
use crate::model::item::{Item, ItemStatus};
use crate::repo::{decode_all, decode_one, Decoded, RepoError, RepoResult};
use log::warn;
use crate::store::{DocumentStore, Filter, Patch, ID_FIELD};
use serde_json::Value;
use std::collections::BTreeSet;

/// Insert payload for a new item document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub id: Option<CanonicalId>,
    pub title: String,
    pub groups: Vec<CanonicalId>,
    pub is_active: bool,
    pub status: ItemStatus,
    pub created_at: i64,
}

/// Repository interface for item reads and instructor-side writes.
pub trait ItemRepository {
    /// Items visible to any of `group_ids`, in deterministic order.
    fn list_visible_for_groups(&self, group_ids: &BTreeSet<CanonicalId>)
        -> RepoResult<Decoded<Item>>;
    fn get_item(&self, id: &CanonicalId) -> RepoResult<Option<Item>>;
    fn insert_item(&self, item: &NewItem) -> RepoResult<CanonicalId>;
    fn set_status(&self, id: &CanonicalId, status: ItemStatus) -> RepoResult<()>;
    fn set_active(&self, id: &CanonicalId, is_active: bool) -> RepoResult<()>;
}

/// Item repository backed by any `DocumentStore`.
pub struct StoreItemRepository<'store, S: DocumentStore + ?Sized> {
    store: &'store S,
    collection: String,
}

impl<'store, S: DocumentStore + ?Sized> StoreItemRepository<'store, S> {
    pub fn new(store: &'store S, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    fn patch_item(&self, id: &CanonicalId, patch: Patch) -> RepoResult<()> {
        let outcome = self
            .store
            .update_one(&self.collection, &Filter::by_id(id.clone()), &patch)?;
        if !outcome.matched {
            return Err(RepoError::NotFound {
                collection: self.collection.clone(),
                id: id.clone(),
            });
        }
        Ok(())
    }
}

/// Builds the store-side visibility filter.
pub fn visibility_filter(group_ids: &BTreeSet<CanonicalId>) -> Filter {
    let statuses = ItemStatus::VISIBLE
        .iter()
        .map(|status| Value::String(status.as_str().to_string()))
        .collect();
    Filter::and(vec![
        Filter::id_in("groups", group_ids.clone()),
        Filter::eq("is_active", true),
        Filter::in_values("status", statuses),
    ])
}

impl<S: DocumentStore + ?Sized> ItemRepository for StoreItemRepository<'_, S> {
    fn list_visible_for_groups(
        &self,
        group_ids: &BTreeSet<CanonicalId>,
    ) -> RepoResult<Decoded<Item>> {
        if group_ids.is_empty() {
            return Ok(Decoded::default());
        }

        let docs = self
            .store
            .find(&self.collection, &visibility_filter(group_ids))?;
        let mut decoded = decode_all(&self.collection, docs, Item::from_document);
        for rejected in &decoded.rejected {
            warn!(
                "event=item_decode module=repo status=skipped collection={} document={} reason={}",
                rejected.collection, rejected.document, rejected.reason
            );
        }

        // The store filter and `Item::is_eligible_for` must agree.
        decoded.records.retain(|item| item.is_eligible_for(group_ids));
        decoded
            .records
            .sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(decoded)
    }

    fn get_item(&self, id: &CanonicalId) -> RepoResult<Option<Item>> {
        self.store
            .find_one(&self.collection, &Filter::by_id(id.clone()))?
            .map(|doc| decode_one(&self.collection, &doc, Item::from_document))
            .transpose()
    }

    fn insert_item(&self, item: &NewItem) -> RepoResult<CanonicalId> {
        let id = item.id.clone().unwrap_or_else(CanonicalId::generate);
        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_string(), id.to_value());
        doc.insert("title".to_string(), Value::String(item.title.clone()));
        doc.insert(
            "groups".to_string(),
            Value::Array(item.groups.iter().map(CanonicalId::to_value).collect()),
        );
        doc.insert("is_active".to_string(), Value::Bool(item.is_active));
        doc.insert(
            "status".to_string(),
            Value::String(item.status.as_str().to_string()),
        );
        doc.insert("created_at".to_string(), Value::from(item.created_at));
        Ok(self.store.insert_one(&self.collection, doc)?)
    }

    fn set_status(&self, id: &CanonicalId, status: ItemStatus) -> RepoResult<()> {
        self.patch_item(id, Patch::new().set("status", status.as_str()))
    }

    fn set_active(&self, id: &CanonicalId, is_active: bool) -> RepoResult<()> {
        self.patch_item(id, Patch::new().set("is_active", is_active))
    }
}
