//! Member repository contract and document-store implementation.
//!
//! # Invariants
//! - `set_group` is the only write path for the authoritative `group_id`.
//! - Member writes never touch any `batches` document.

use crate::model::decode::Document;
use crate::model::identifier::CanonicalId;
use crate::model::member::Member;
use crate::repo::{decode_all, decode_one, Decoded, RepoError, RepoResult};
use crate::store::{DocumentStore, Filter, Patch, ID_FIELD};
use serde_json::Value;

/// Insert payload for a new member document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMember {
    /// Caller-provided id; a fresh one is generated when `None`.
    pub id: Option<CanonicalId>,
    pub role: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub group_id: Option<CanonicalId>,
    pub password_hash: Option<String>,
}

/// Repository interface for member reads and authoritative writes.
pub trait MemberRepository {
    fn list_by_role(&self, role: &str) -> RepoResult<Decoded<Member>>;
    fn get_member(&self, id: &CanonicalId) -> RepoResult<Option<Member>>;
    fn insert_member(&self, member: &NewMember) -> RepoResult<CanonicalId>;
    fn set_group(&self, id: &CanonicalId, group_id: Option<&CanonicalId>) -> RepoResult<()>;
    fn set_password_hash(&self, id: &CanonicalId, password_hash: &str) -> RepoResult<()>;
}

/// Member repository backed by any `DocumentStore`.
pub struct StoreMemberRepository<'store, S: DocumentStore + ?Sized> {
    store: &'store S,
    collection: String,
}

impl<'store, S: DocumentStore + ?Sized> StoreMemberRepository<'store, S> {
    pub fn new(store: &'store S, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    fn patch_member(&self, id: &CanonicalId, patch: Patch) -> RepoResult<()> {
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

impl<S: DocumentStore + ?Sized> MemberRepository for StoreMemberRepository<'_, S> {
    fn list_by_role(&self, role: &str) -> RepoResult<Decoded<Member>> {
        let docs = self
            .store
            .find(&self.collection, &Filter::eq("role", role))?;
        Ok(decode_all(&self.collection, docs, Member::from_document))
    }

    fn get_member(&self, id: &CanonicalId) -> RepoResult<Option<Member>> {
        self.store
            .find_one(&self.collection, &Filter::by_id(id.clone()))?
            .map(|doc| decode_one(&self.collection, &doc, Member::from_document))
            .transpose()
    }

    fn insert_member(&self, member: &NewMember) -> RepoResult<CanonicalId> {
        let id = member.id.clone().unwrap_or_else(CanonicalId::generate);
        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_string(), id.to_value());
        doc.insert("role".to_string(), Value::String(member.role.clone()));
        doc.insert(
            "group_id".to_string(),
            member
                .group_id
                .as_ref()
                .map_or(Value::Null, CanonicalId::to_value),
        );
        if let Some(name) = &member.name {
            doc.insert("name".to_string(), Value::String(name.clone()));
        }
        if let Some(email) = &member.email {
            doc.insert("email".to_string(), Value::String(email.clone()));
        }
        if let Some(hash) = &member.password_hash {
            doc.insert("password_hash".to_string(), Value::String(hash.clone()));
        }
        Ok(self.store.insert_one(&self.collection, doc)?)
    }

    fn set_group(&self, id: &CanonicalId, group_id: Option<&CanonicalId>) -> RepoResult<()> {
        let value = group_id.map_or(Value::Null, CanonicalId::to_value);
        self.patch_member(id, Patch::new().set("group_id", value))
    }

    fn set_password_hash(&self, id: &CanonicalId, password_hash: &str) -> RepoResult<()> {
        self.patch_member(id, Patch::new().set("password_hash", password_hash))
    }
}
