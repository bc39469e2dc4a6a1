//! Administrative provisioning for groups, members and items.
//!
//! # Responsibility
//! - Create groups, members and items with canonical identifiers.
//! - Move members between groups by rewriting `group_id` only.
//! - Hash, reset and verify member passwords.
//!
//! # Invariants
//! - Reassignment never writes a group document; the membership cache is
//!   repaired by the reconciler.
//! - Plaintext secrets are never stored or logged.

use crate::credentials::{
    hash_secret, is_stored_digest, verify_secret, CredentialError, PasswordDigest,
};
use crate::model::identifier::CanonicalId;
use crate::model::item::ItemStatus;
use crate::model::member::Member;
use crate::repo::group_repo::GroupRepository;
use crate::repo::item_repo::{ItemRepository, NewItem};
use crate::repo::member_repo::{MemberRepository, NewMember};
use crate::repo::RepoError;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum ProvisionError {
    /// Name or other required text is blank.
    InvalidInput(&'static str),
    GroupNotFound(CanonicalId),
    MemberNotFound(CanonicalId),
    Credential(CredentialError),
    Repo(RepoError),
}

impl ProvisionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Repo(err) if err.is_transient())
    }
}

impl Display for ProvisionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(field) => write!(f, "invalid input: `{field}` cannot be empty"),
            Self::GroupNotFound(id) => write!(f, "group not found: {id}"),
            Self::MemberNotFound(id) => write!(f, "member not found: {id}"),
            Self::Credential(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProvisionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Credential(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ProvisionError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<CredentialError> for ProvisionError {
    fn from(value: CredentialError) -> Self {
        Self::Credential(value)
    }
}

/// Input for `create_member`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberRequest {
    pub id: Option<CanonicalId>,
    pub name: String,
    pub email: Option<String>,
    pub group_id: Option<CanonicalId>,
    pub password: Option<String>,
}

pub struct ProvisioningService<M: MemberRepository, G: GroupRepository, I: ItemRepository> {
    members: M,
    groups: G,
    items: I,
    member_role: String,
}

impl<M: MemberRepository, G: GroupRepository, I: ItemRepository> ProvisioningService<M, G, I> {
    pub fn new(members: M, groups: G, items: I, member_role: impl Into<String>) -> Self {
        Self {
            members,
            groups,
            items,
            member_role: member_role.into(),
        }
    }

    pub fn create_group(
        &self,
        id: Option<CanonicalId>,
        name: &str,
    ) -> Result<CanonicalId, ProvisionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProvisionError::InvalidInput("name"));
        }
        Ok(self.groups.insert_group(id, name)?)
    }

    /// Creates a member; the target group, when given, must exist.
    pub fn create_member(&self, request: MemberRequest) -> Result<CanonicalId, ProvisionError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ProvisionError::InvalidInput("name"));
        }
        if let Some(group_id) = &request.group_id {
            self.require_group(group_id)?;
        }
        let password_hash = request
            .password
            .as_deref()
            .map(hash_secret)
            .transpose()?
            .map(PasswordDigest::into_string);

        let id = self.members.insert_member(&NewMember {
            id: request.id,
            role: self.member_role.clone(),
            name: Some(name.to_string()),
            email: request.email,
            group_id: request.group_id,
            password_hash,
        })?;
        info!(
            "event=member_provision module=provisioning status=ok member_id={} action=create",
            id
        );
        Ok(id)
    }

    /// Points `member_id` at `group_id` (or at no group) and returns the
    /// previous pointer.
    pub fn reassign_member(
        &self,
        member_id: &CanonicalId,
        group_id: Option<&CanonicalId>,
    ) -> Result<Option<CanonicalId>, ProvisionError> {
        let member = self.require_member(member_id)?;
        if let Some(group_id) = group_id {
            self.require_group(group_id)?;
        }
        self.members.set_group(member_id, group_id)?;
        info!(
            "event=member_provision module=provisioning status=ok member_id={} action=reassign from={} to={}",
            member_id,
            member.group_id.as_ref().map_or("-", CanonicalId::as_str),
            group_id.map_or("-", CanonicalId::as_str)
        );
        Ok(member.group_id)
    }

    pub fn reset_password(
        &self,
        member_id: &CanonicalId,
        password: &str,
    ) -> Result<(), ProvisionError> {
        self.require_member(member_id)?;
        let digest = hash_secret(password)?;
        self.members.set_password_hash(member_id, digest.as_str())?;
        info!(
            "event=password_rehash module=provisioning status=ok member_id={} action=reset",
            member_id
        );
        Ok(())
    }

    /// `false` for a wrong password or a member without a stored digest.
    pub fn verify_password(
        &self,
        member_id: &CanonicalId,
        password: &str,
    ) -> Result<bool, ProvisionError> {
        let member = self.require_member(member_id)?;
        Ok(member
            .password_hash
            .map(PasswordDigest::from_stored)
            .is_some_and(|digest| verify_secret(password, &digest)))
    }

    /// Replaces stored plaintext passwords with digests; returns how many
    /// members were rewritten. Existing digests of any scheme are left as is.
    pub fn rehash_legacy_passwords(&self) -> Result<usize, ProvisionError> {
        let members = self.members.list_by_role(&self.member_role)?;
        let mut rewritten = 0;
        for member in &members.records {
            let Some(stored) = member.password_hash.as_deref() else {
                continue;
            };
            if stored.is_empty() || is_stored_digest(stored) {
                continue;
            }
            let digest = hash_secret(stored)?;
            self.members.set_password_hash(&member.id, digest.as_str())?;
            rewritten += 1;
        }
        info!(
            "event=password_rehash module=provisioning status=ok action=legacy scanned={} rewritten={}",
            members.records.len(),
            rewritten
        );
        Ok(rewritten)
    }

    /// Creates an item; every referenced group must exist.
    pub fn create_item(&self, item: &NewItem) -> Result<CanonicalId, ProvisionError> {
        if item.title.trim().is_empty() {
            return Err(ProvisionError::InvalidInput("title"));
        }
        for group_id in &item.groups {
            self.require_group(group_id)?;
        }
        Ok(self.items.insert_item(item)?)
    }

    pub fn set_item_status(
        &self,
        item_id: &CanonicalId,
        status: ItemStatus,
    ) -> Result<(), ProvisionError> {
        Ok(self.items.set_status(item_id, status)?)
    }

    pub fn set_item_active(
        &self,
        item_id: &CanonicalId,
        is_active: bool,
    ) -> Result<(), ProvisionError> {
        Ok(self.items.set_active(item_id, is_active)?)
    }

    fn require_member(&self, member_id: &CanonicalId) -> Result<Member, ProvisionError> {
        self.members
            .get_member(member_id)?
            .ok_or_else(|| ProvisionError::MemberNotFound(member_id.clone()))
    }

    fn require_group(&self, group_id: &CanonicalId) -> Result<(), ProvisionError> {
        match self.groups.get_group(group_id)? {
            Some(_) => Ok(()),
            None => Err(ProvisionError::GroupNotFound(group_id.clone())),
        }
    }
}
