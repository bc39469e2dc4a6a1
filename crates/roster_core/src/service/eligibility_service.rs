//! Eligibility use-case: which items a member may see.
//!
//! # Responsibility
//! - Resolve a member's group set from the membership cache.
//! - Fall back to the member's own `group_id` when the cache is empty.
//! - Return visible items for the resolved groups.
//!
//! # Invariants
//! - Results are always recomputed from stored state; nothing is cached here.
//! - The fallback applies only when the cache yields no group at all.
//! - A matched item that cannot be decoded is listed in `skipped`; the
//!   remaining visible items are still returned.

use crate::model::identifier::CanonicalId;
use crate::model::item::Item;
use crate::model::member::Member;
use crate::repo::group_repo::GroupRepository;
use crate::repo::item_repo::ItemRepository;
use crate::repo::{Decoded, RejectedRecord, RepoError};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum EligibilityError {
    Repo(RepoError),
}

impl EligibilityError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Repo(err) => err.is_transient(),
        }
    }
}

impl Display for EligibilityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EligibilityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for EligibilityError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Where a member's group set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipSource {
    /// At least one group lists the member in `member_ids`.
    Cache,
    /// Cache was empty; the member's own `group_id` was used.
    GroupPointer,
    /// Neither side names a group.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub member_id: CanonicalId,
    pub source: MembershipSource,
    pub group_ids: BTreeSet<CanonicalId>,
    /// Newest first, ties by id.
    pub items: Vec<Item>,
    /// Matched items that could not be decoded.
    pub skipped: Vec<RejectedRecord>,
}

pub struct EligibilityResolver<G: GroupRepository, I: ItemRepository> {
    groups: G,
    items: I,
}

impl<G: GroupRepository, I: ItemRepository> EligibilityResolver<G, I> {
    pub fn new(groups: G, items: I) -> Self {
        Self { groups, items }
    }

    /// Canonical group set for `member` and where it came from.
    pub fn member_groups(
        &self,
        member: &Member,
    ) -> Result<(BTreeSet<CanonicalId>, MembershipSource), EligibilityError> {
        let cached = self.groups.group_ids_containing(&member.id)?;
        if !cached.is_empty() {
            return Ok((cached, MembershipSource::Cache));
        }

        match &member.group_id {
            Some(group_id) => {
                info!(
                    "event=eligibility_fallback module=eligibility status=ok member_id={} group_id={}",
                    member.id, group_id
                );
                Ok((BTreeSet::from([group_id.clone()]), MembershipSource::GroupPointer))
            }
            None => Ok((BTreeSet::new(), MembershipSource::None)),
        }
    }

    /// Items visible to `member`, newest first.
    pub fn eligible_items(&self, member: &Member) -> Result<Vec<Item>, EligibilityError> {
        Ok(self.resolve(member)?.items)
    }

    /// Full resolution including the group set used.
    pub fn resolve(&self, member: &Member) -> Result<Eligibility, EligibilityError> {
        let (group_ids, source) = self.member_groups(member)?;
        let visible = if group_ids.is_empty() {
            Decoded::default()
        } else {
            self.items.list_visible_for_groups(&group_ids)?
        };
        debug!(
            "event=eligibility_resolve module=eligibility status=ok member_id={} groups={} items={} skipped={}",
            member.id,
            group_ids.len(),
            visible.records.len(),
            visible.rejected.len()
        );
        Ok(Eligibility {
            member_id: member.id.clone(),
            source,
            group_ids,
            items: visible.records,
            skipped: visible.rejected,
        })
    }
}
