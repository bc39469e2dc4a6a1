//! Membership reconciliation use-case.
//!
//! # Responsibility
//! - Rebuild every group's `member_ids` cache from `Member.group_id`.
//! - Report drift, orphaned memberships and skipped records.
//!
//! # Invariants
//! - New cache values are computed from member data only, never from the
//!   previous cache value.
//! - A run with no drift performs no writes, so back-to-back runs converge.
//! - Writes are per-group single-document updates; a run interrupted after
//!   group k leaves groups 1..k corrected and can be restarted from the top.
//! - Orphaned memberships and undecodable records never abort a run; store
//!   failures always do.

use crate::model::group::Group;
use crate::model::identifier::CanonicalId;
use crate::model::member::Member;
use crate::repo::group_repo::GroupRepository;
use crate::repo::member_repo::MemberRepository;
use crate::repo::{RejectedRecord, RepoError};
use log::{info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

#[derive(Debug)]
pub enum ReconcileError {
    Repo(RepoError),
    GroupNotFound(CanonicalId),
}

impl ReconcileError {
    /// Whether the caller may retry the run with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Repo(err) if err.is_transient())
    }
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::GroupNotFound(id) => write!(f, "group not found: {id}"),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::GroupNotFound(_) => None,
        }
    }
}

impl From<RepoError> for ReconcileError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Per-group outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDrift {
    pub group_id: CanonicalId,
    pub name: String,
    /// Members missing from the stored cache.
    pub added: Vec<CanonicalId>,
    /// Cached ids that no member backs.
    pub removed: Vec<CanonicalId>,
    /// Repeated ids in the stored cache.
    pub duplicate_entries: usize,
    /// Malformed ids in the stored cache.
    pub invalid_entries: usize,
    /// Canonical membership size after the run.
    pub final_size: usize,
    /// Whether this run rewrote the cache.
    pub written: bool,
}

impl GroupDrift {
    pub fn added_count(&self) -> usize {
        self.added.len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    /// Set drift or a non-normalized stored array.
    pub fn needs_write(&self) -> bool {
        !self.added.is_empty()
            || !self.removed.is_empty()
            || self.duplicate_entries > 0
            || self.invalid_entries > 0
    }
}

/// Member whose `group_id` names no existing group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedMembership {
    pub member_id: CanonicalId,
    pub group_id: CanonicalId,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ReconciliationReport {
    /// `true` when produced by `check_drift`; nothing was written.
    pub dry_run: bool,
    pub members_scanned: usize,
    pub groups_scanned: usize,
    /// One entry per group, ascending by group id.
    pub groups: Vec<GroupDrift>,
    pub orphaned: Vec<OrphanedMembership>,
    pub skipped: Vec<RejectedRecord>,
    pub writes: usize,
}

impl ReconciliationReport {
    pub fn orphaned_count(&self) -> usize {
        self.orphaned.len()
    }

    pub fn total_added(&self) -> usize {
        self.groups.iter().map(GroupDrift::added_count).sum()
    }

    pub fn total_removed(&self) -> usize {
        self.groups.iter().map(GroupDrift::removed_count).sum()
    }

    /// No group needed a write.
    pub fn is_clean(&self) -> bool {
        self.groups.iter().all(|group| !group.needs_write())
    }

    pub fn group(&self, id: &CanonicalId) -> Option<&GroupDrift> {
        self.groups.iter().find(|group| &group.group_id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Apply,
    DryRun,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::DryRun => "dry_run",
        }
    }
}

/// Snapshot of the authoritative side, grouped by canonical group id.
struct Expected {
    by_group: BTreeMap<CanonicalId, BTreeSet<CanonicalId>>,
    orphaned: Vec<OrphanedMembership>,
}

/// `unreadable` holds ids of groups that exist but failed to decode; their
/// members are neither assigned nor reported as orphaned.
fn expected_memberships(
    members: &[Member],
    groups: &[Group],
    unreadable: &BTreeSet<CanonicalId>,
) -> Expected {
    let mut by_group: BTreeMap<CanonicalId, BTreeSet<CanonicalId>> = groups
        .iter()
        .map(|group| (group.id.clone(), BTreeSet::new()))
        .collect();
    let mut orphaned = Vec::new();

    for member in members {
        let Some(group_id) = &member.group_id else {
            continue;
        };
        match by_group.get_mut(group_id) {
            Some(set) => {
                set.insert(member.id.clone());
            }
            None if unreadable.contains(group_id) => {}
            None => orphaned.push(OrphanedMembership {
                member_id: member.id.clone(),
                group_id: group_id.clone(),
            }),
        }
    }

    Expected { by_group, orphaned }
}

fn diff_group(group: &Group, expected: &BTreeSet<CanonicalId>) -> GroupDrift {
    let stored = group.member_set();
    GroupDrift {
        group_id: group.id.clone(),
        name: group.name.clone(),
        added: expected.difference(&stored).cloned().collect(),
        removed: stored.difference(expected).cloned().collect(),
        duplicate_entries: group.member_ids.len() - stored.len(),
        invalid_entries: group.invalid_member_entries,
        final_size: expected.len(),
        written: false,
    }
}

/// Rebuilds the group→members cache from the member→group pointer.
pub struct MembershipReconciler<M: MemberRepository, G: GroupRepository> {
    members: M,
    groups: G,
    member_role: String,
}

impl<M: MemberRepository, G: GroupRepository> MembershipReconciler<M, G> {
    pub fn new(members: M, groups: G, member_role: impl Into<String>) -> Self {
        Self {
            members,
            groups,
            member_role: member_role.into(),
        }
    }

    /// Recomputes and persists every group's cache.
    pub fn reconcile_all(&self) -> Result<ReconciliationReport, ReconcileError> {
        self.run(Mode::Apply)
    }

    /// Computes the same report as `reconcile_all` without writing.
    pub fn check_drift(&self) -> Result<ReconciliationReport, ReconcileError> {
        self.run(Mode::DryRun)
    }

    /// Recomputes and persists one group's cache.
    pub fn reconcile_group(&self, group_id: &CanonicalId) -> Result<GroupDrift, ReconcileError> {
        let group = self
            .groups
            .get_group(group_id)?
            .ok_or_else(|| ReconcileError::GroupNotFound(group_id.clone()))?;
        let members = self.members.list_by_role(&self.member_role)?;
        let expected = expected_memberships(
            &members.records,
            std::slice::from_ref(&group),
            &BTreeSet::new(),
        );
        let target = expected.by_group.get(&group.id).cloned().unwrap_or_default();
        self.apply_group(&group, &target, Mode::Apply)
    }

    fn run(&self, mode: Mode) -> Result<ReconciliationReport, ReconcileError> {
        let started_at = Instant::now();
        info!(
            "event=reconcile_run module=reconcile status=start mode={} role={}",
            mode.as_str(),
            self.member_role
        );

        let result = self.run_inner(mode);
        match &result {
            Ok(report) => info!(
                "event=reconcile_run module=reconcile status=ok mode={} duration_ms={} members={} groups={} added={} removed={} orphaned={} skipped={} writes={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                report.members_scanned,
                report.groups_scanned,
                report.total_added(),
                report.total_removed(),
                report.orphaned_count(),
                report.skipped.len(),
                report.writes
            ),
            Err(err) => warn!(
                "event=reconcile_run module=reconcile status=error mode={} duration_ms={} transient={} error={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err.is_transient(),
                err
            ),
        }
        result
    }

    fn run_inner(&self, mode: Mode) -> Result<ReconciliationReport, ReconcileError> {
        let members = self.members.list_by_role(&self.member_role)?;
        let mut groups = self.groups.list_groups()?;
        groups.records.sort_by(|a, b| a.id.cmp(&b.id));

        let unreadable: BTreeSet<CanonicalId> = groups
            .rejected
            .iter()
            .filter_map(|record| record.id.clone())
            .collect();
        let expected = expected_memberships(&members.records, &groups.records, &unreadable);
        for orphan in &expected.orphaned {
            warn!(
                "event=reconcile_orphan module=reconcile status=skipped member_id={} group_id={}",
                orphan.member_id, orphan.group_id
            );
        }

        let mut skipped = members.rejected;
        skipped.extend(groups.rejected);
        for record in &skipped {
            warn!(
                "event=reconcile_skip module=reconcile status=skipped collection={} document={} reason={}",
                record.collection,
                crate::logging::sanitize_message(&record.document, 80),
                crate::logging::sanitize_message(&record.reason, 160)
            );
        }

        let mut report = ReconciliationReport {
            dry_run: mode == Mode::DryRun,
            members_scanned: members.records.len(),
            groups_scanned: groups.records.len(),
            orphaned: expected.orphaned,
            skipped,
            ..ReconciliationReport::default()
        };

        for group in &groups.records {
            let target = expected
                .by_group
                .get(&group.id)
                .cloned()
                .unwrap_or_default();
            let drift = self.apply_group(group, &target, mode)?;
            if drift.written {
                report.writes += 1;
            }
            report.groups.push(drift);
        }

        Ok(report)
    }

    fn apply_group(
        &self,
        group: &Group,
        target: &BTreeSet<CanonicalId>,
        mode: Mode,
    ) -> Result<GroupDrift, ReconcileError> {
        let mut drift = diff_group(group, target);
        if !drift.needs_write() {
            return Ok(drift);
        }

        if mode == Mode::Apply {
            drift.written = self.groups.replace_member_ids(&group.id, target)?;
        }
        info!(
            "event=reconcile_group module=reconcile status=drift mode={} group_id={} added={} removed={} duplicates={} invalid={} final_size={} written={}",
            mode.as_str(),
            drift.group_id,
            drift.added_count(),
            drift.removed_count(),
            drift.duplicate_entries,
            drift.invalid_entries,
            drift.final_size,
            drift.written
        );
        Ok(drift)
    }
}
